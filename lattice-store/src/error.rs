//! Storage error types

use crate::token::ConsistencyToken;
use thiserror::Error;

/// Errors surfaced by tuple storage backends and the write coordinator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has not applied writes up to the requested token within
    /// the wait budget. Callers must treat this as "cannot answer", never
    /// as a denial or a grant.
    #[error("store not caught up to token {token} (head {head})")]
    Unready {
        token: ConsistencyToken,
        head: ConsistencyToken,
    },

    /// The page token did not come from a previous slice of this query.
    #[error("invalid page token {0:?}")]
    InvalidPageToken(String),

    #[error("postgres: {0}")]
    Postgres(#[from] sqlx::Error),
}

impl StoreError {
    /// Stable machine-readable code for logs and API envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unready { .. } => "STORE_UNREADY",
            Self::InvalidPageToken(_) => "STORE_BAD_PAGE_TOKEN",
            Self::Postgres(_) => "STORE_BACKEND",
        }
    }
}
