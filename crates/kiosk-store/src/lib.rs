//! Persistence layer for kioskd
//!
//! Provides:
//! - Student rows and their admin edits
//! - Kiosk access tokens and access policies
//! - The append-only audit record log
//! - The row-locking check-in transaction
//! - Typed list filters and paging shared by every listing

mod filter;
mod sqlite;
mod traits;

pub use filter::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
