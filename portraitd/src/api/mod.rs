//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # Endpoints
//!
//! - `POST /process`: upload a photo and a name, get back a stored, captioned portrait
//! - `GET /photos`: list recorded portraits, newest first
//! - `GET /download/{filename}`: fetch a locally stored portrait as an attachment
//! - `GET /health`: database and storage status
//!
//! All endpoints are documented with `utoipa`; the interactive reference is served at `/docs`.

pub mod handlers;
pub mod models;
