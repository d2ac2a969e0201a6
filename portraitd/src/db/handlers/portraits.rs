//! Database repository for portrait records.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        handlers::repository::Repository,
        models::portraits::{PortraitCreateDBRequest, PortraitDBResponse, PortraitFilter},
    },
    types::abbrev_uuid,
};

const PORTRAIT_COLUMNS: &str = "id, filename, storage_mode, storage_ref, remote_file_id, download_url, name_on_photo, \
     original_filename, user_email, file_size_bytes, output_width, output_height, processing_status, created_at";

pub struct Portraits<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Portraits<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Portraits<'c> {
    type CreateRequest = PortraitCreateDBRequest;
    type Response = PortraitDBResponse;
    type Filter = PortraitFilter;

    #[instrument(skip(self, request), fields(filename = %request.filename, mode = %request.storage_mode), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let query = format!(
            r#"
            INSERT INTO portraits (
                filename, storage_mode, storage_ref, remote_file_id, download_url, name_on_photo,
                original_filename, user_email, file_size_bytes, output_width, output_height
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {PORTRAIT_COLUMNS}
            "#
        );

        let portrait = sqlx::query_as::<_, PortraitDBResponse>(&query)
            .bind(&request.filename)
            .bind(request.storage_mode.as_str())
            .bind(&request.storage_ref)
            .bind(&request.remote_file_id)
            .bind(&request.download_url)
            .bind(&request.name_on_photo)
            .bind(&request.original_filename)
            .bind(&request.user_email)
            .bind(request.file_size_bytes)
            .bind(request.output_width)
            .bind(request.output_height)
            .fetch_one(&mut *self.db)
            .await?;

        tracing::debug!(id = %abbrev_uuid(&portrait.id), "Recorded portrait");
        Ok(portrait)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, by_email = filter.user_email.is_some()), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = format!("SELECT {PORTRAIT_COLUMNS} FROM portraits");
        if filter.user_email.is_some() {
            query.push_str(" WHERE user_email = $2");
        }
        query.push_str(" ORDER BY created_at DESC LIMIT $1");

        let mut sql_query = sqlx::query_as::<_, PortraitDBResponse>(&query).bind(filter.limit);
        if let Some(email) = &filter.user_email {
            sql_query = sql_query.bind(email);
        }

        let portraits = sql_query.fetch_all(&mut *self.db).await?;
        Ok(portraits)
    }
}
