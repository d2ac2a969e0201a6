//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` (a pooled connection or an open transaction) and
//! implements the [`Repository`] trait:
//!
//! ```ignore
//! use portraitd::db::handlers::{Portraits, Repository};
//!
//! let mut conn = pool.acquire().await?;
//! let recent = Portraits::new(&mut conn).list(&PortraitFilter::new(10)).await?;
//! ```

pub mod portraits;
pub mod repository;

pub use portraits::Portraits;
pub use repository::Repository;
