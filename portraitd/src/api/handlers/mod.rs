//! HTTP request handlers for all API endpoints.
//!
//! Handlers validate input, call into the portrait pipeline, storage sink and
//! database repositories, and return JSON (or the raw JPEG for downloads).
//! Failures are returned as [`crate::errors::Error`], which renders the
//! `{success: false, error, code}` body.
//!
//! # Handler Modules
//!
//! - [`process`]: upload validation and the locate/crop/render/store/record flow
//! - [`photos`]: listing recorded portraits
//! - [`download`]: serving locally stored portraits
//! - [`health`]: database and storage status

pub mod download;
pub mod health;
pub mod photos;
pub mod process;
