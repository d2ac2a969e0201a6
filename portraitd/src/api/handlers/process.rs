//! `POST /process`: turn an uploaded photo and a name into a stored, captioned portrait.

use axum::{
    Json,
    extract::{Multipart, State},
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    AppState,
    api::models::portraits::ProcessResponse,
    db::{
        handlers::{Portraits, Repository},
        models::portraits::{PortraitCreateDBRequest, PortraitDBResponse},
    },
    errors::{Error, Result},
    storage::StoreRequest,
    types::abbrev_uuid,
};

/// Content types accepted for the `file` field.
const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

const MAX_EMAIL_LENGTH: usize = 254;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9 '\-]+$").expect("static regex"));

static FILENAME_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9 \-]").expect("static regex"));

/// An uploaded file, read fully into memory.
struct Upload {
    data: Vec<u8>,
    content_type: Option<String>,
    original_filename: Option<String>,
}

/// Fields of the `/process` form.
#[derive(Default)]
struct ProcessForm {
    file: Option<Upload>,
    name: Option<String>,
    email: Option<String>,
}

#[utoipa::path(
    post,
    path = "/process",
    tag = "portraits",
    summary = "Process photo",
    description = "Detect the face in an uploaded JPEG or PNG, crop it to a 600x600 portrait with the given \
                   name as caption, store it and record its metadata.",
    request_body(
        content_type = "multipart/form-data",
        description = "`file` (JPEG or PNG), `name` (1-50 characters: letters, digits, spaces, hyphens, apostrophes) \
                       and optional `email`"
    ),
    responses(
        (status = 200, description = "Portrait stored", body = ProcessResponse),
        (status = 400, description = "Invalid upload or no face detected", body = crate::errors::ErrorResponse),
        (status = 422, description = "Missing `file` or `name`", body = crate::errors::ErrorResponse),
        (status = 500, description = "Storage or processing failure", body = crate::errors::ErrorResponse)
    )
)]
pub async fn process_photo(State(state): State<AppState>, multipart: Multipart) -> Result<Json<ProcessResponse>> {
    let result = process_upload(&state, multipart).await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.code(),
    };
    metrics::counter!("portraitd_portraits_processed_total", "outcome" => outcome).increment(1);

    result.map(Json)
}

#[instrument(skip_all)]
async fn process_upload(state: &AppState, multipart: Multipart) -> Result<ProcessResponse> {
    let form = read_form(multipart, state.config.limits.max_upload_bytes).await?;

    let file = form.file.ok_or_else(|| Error::MissingField { field: "file".to_string() })?;
    let name = form.name.ok_or_else(|| Error::MissingField { field: "name".to_string() })?;

    validate_content_type(file.content_type.as_deref())?;
    validate_name(&name, state.config.limits.name_max_length)?;
    let email = normalize_email(form.email)?;

    if file.data.is_empty() {
        return Err(Error::validation("Uploaded file is empty."));
    }

    let original_filename = file.original_filename.unwrap_or_else(|| "unknown".to_string());
    info!(original_filename = %original_filename, bytes = file.data.len(), "Processing upload");

    let processed = state
        .pipeline
        .run(file.data, name.clone(), state.config.portrait.require_face)
        .await?;

    let filename = output_filename(&name, chrono::Utc::now().timestamp());
    let rendered = processed.rendered;
    let file_size_bytes = rendered.data.len() as i64;

    let stored = state
        .storage
        .store(StoreRequest {
            data: rendered.data,
            filename: filename.clone(),
            original_filename: original_filename.clone(),
        })
        .await?;

    let request = PortraitCreateDBRequest {
        filename: filename.clone(),
        storage_mode: state.storage.mode(),
        storage_ref: stored.storage_ref.clone(),
        remote_file_id: stored.remote_file_id.clone(),
        download_url: stored.download_url.clone(),
        name_on_photo: name,
        original_filename,
        user_email: email,
        file_size_bytes,
        output_width: rendered.width as i32,
        output_height: rendered.height as i32,
    };

    // A portrait without a record must not outlive the request.
    let record = match record_portrait(state, &request).await {
        Ok(record) => record,
        Err(e) => {
            warn!(filename = %filename, "Recording portrait failed, removing stored file");
            if let Err(cleanup) = state.storage.remove(&stored).await {
                error!(storage_ref = %stored.storage_ref, "Failed to remove unrecorded portrait: {}", cleanup);
            }
            return Err(e);
        }
    };

    info!(id = %abbrev_uuid(&record.id), filename = %filename, mode = %state.storage.mode(), "Portrait stored");

    Ok(ProcessResponse {
        success: true,
        mode: state.storage.mode(),
        storage_ref: stored.storage_ref,
        remote_file_id: stored.remote_file_id,
        download_url: stored.download_url,
        filename,
        metadata_id: record.id,
        message: "Photo saved successfully!".to_string(),
    })
}

async fn record_portrait(state: &AppState, request: &PortraitCreateDBRequest) -> Result<PortraitDBResponse> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Ok(Portraits::new(&mut conn).create(request).await?)
}

/// Read the multipart form, failing as soon as the file grows past `max_file_size`.
async fn read_form(mut multipart: Multipart, max_file_size: usize) -> Result<ProcessForm> {
    let mut form = ProcessForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("Failed to parse multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let content_type = field.content_type().map(str::to_string);
                let original_filename = field.file_name().map(str::to_string);
                let mut data = Vec::new();

                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| Error::validation(format!("Failed to read file chunk: {e}")))?
                {
                    if data.len() + chunk.len() > max_file_size {
                        warn!(max_file_size, "File size limit exceeded, aborting upload");
                        return Err(Error::validation(format!(
                            "File size exceeds {} limit.",
                            format_size_limit(max_file_size)
                        )));
                    }
                    data.extend_from_slice(&chunk);
                }

                form.file = Some(Upload {
                    data,
                    content_type,
                    original_filename,
                });
            }
            "name" => {
                form.name = Some(field.text().await.map_err(|e| Error::validation(format!("Invalid name field: {e}")))?);
            }
            "email" => {
                form.email = Some(field.text().await.map_err(|e| Error::validation(format!("Invalid email field: {e}")))?);
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(form)
}

/// Whole units when exact, one decimal otherwise: `10MB`, `1.5MB`, `4KB`, `512 bytes`.
fn format_size_limit(bytes: usize) -> String {
    const UNITS: [(usize, &str); 2] = [(1024 * 1024, "MB"), (1024, "KB")];

    for (unit, suffix) in UNITS {
        if bytes >= unit {
            return if bytes % unit == 0 {
                format!("{}{suffix}", bytes / unit)
            } else {
                format!("{:.1}{suffix}", bytes as f64 / unit as f64)
            };
        }
    }

    format!("{bytes} bytes")
}

fn validate_content_type(content_type: Option<&str>) -> Result<()> {
    let Some(content_type) = content_type.filter(|ct| ct.starts_with("image/")) else {
        return Err(Error::validation("Invalid file type. Please upload an image."));
    };

    if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
        return Err(Error::validation("Only JPG and PNG formats are supported."));
    }

    Ok(())
}

fn validate_name(name: &str, max_length: usize) -> Result<()> {
    if name.is_empty() || name.chars().count() > max_length {
        return Err(Error::validation(format!(
            "Name is required and must be at most {max_length} characters."
        )));
    }

    if !NAME_PATTERN.is_match(name) {
        return Err(Error::validation("Name contains invalid characters."));
    }

    Ok(())
}

/// Blank emails count as absent.
fn normalize_email(email: Option<String>) -> Result<Option<String>> {
    let Some(email) = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };

    let well_formed = email.len() <= MAX_EMAIL_LENGTH
        && !email.contains(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());

    if !well_formed {
        return Err(Error::validation("Email address is invalid."));
    }

    Ok(Some(email))
}

/// Strip characters outside `[A-Za-z0-9 -]`, turn spaces into underscores and lowercase.
pub fn sanitize_filename(name: &str) -> String {
    FILENAME_UNSAFE.replace_all(name, "").replace(' ', "_").to_lowercase()
}

/// `passport_photo_{sanitized}_{unix_seconds}.jpg`
pub fn output_filename(name: &str, unix_seconds: i64) -> String {
    format!("passport_photo_{}_{}.jpg", sanitize_filename(name), unix_seconds)
}
