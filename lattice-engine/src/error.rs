//! Engine error types.
//!
//! Every failure mode carries a stable machine-readable code so callers
//! can branch without matching display strings. Indeterminate paths
//! always surface as errors, never as a granted decision.

use lattice_schema::SchemaError;
use lattice_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A write-path tuple failed validation against the active schema.
    #[error("invalid tuple: {0}")]
    InvalidTuple(String),

    /// A check or expand named a namespace the active schema does not declare.
    #[error("unknown namespace {0:?}")]
    UnknownNamespace(String),

    /// A check or expand named a relation or permission the namespace
    /// does not declare.
    #[error("unknown relation or permission {name:?} in namespace {namespace:?}")]
    UnknownPermission { namespace: String, name: String },

    /// A check subject references names the active schema does not declare.
    #[error("invalid subject: {0}")]
    SubjectInvalid(String),

    /// No schema revision has been published yet.
    #[error("no active schema revision")]
    NoActiveSchema,

    /// Evaluation ran out of hop budget or revisited a userset already
    /// on its path. Cyclic tuple data lands here.
    #[error("evaluation exceeded the depth limit of {limit}")]
    DepthExceeded { limit: usize },

    /// Evaluation outlived its wall-clock budget and was abandoned.
    #[error("evaluation cancelled after {elapsed_ms}ms")]
    Cancelled { elapsed_ms: u64 },

    /// A spawned evaluation branch failed for a non-evaluation reason.
    #[error("internal evaluation failure: {0}")]
    Internal(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Stable error code for logs and wire surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTuple(_) => "ENGINE_INVALID_TUPLE",
            Self::UnknownNamespace(_) => "ENGINE_UNKNOWN_NAMESPACE",
            Self::UnknownPermission { .. } => "ENGINE_UNKNOWN_PERMISSION",
            Self::SubjectInvalid(_) => "ENGINE_SUBJECT_INVALID",
            Self::NoActiveSchema => "ENGINE_NO_SCHEMA",
            Self::DepthExceeded { .. } => "ENGINE_DEPTH_EXCEEDED",
            Self::Cancelled { .. } => "ENGINE_CANCELLED",
            Self::Internal(_) => "ENGINE_INTERNAL",
            Self::Schema(error) => error.code(),
            Self::Store(error) => error.code(),
        }
    }

    /// True when retrying the same request may succeed without any
    /// other change: the snapshot was not applied yet.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Store(StoreError::Unready { .. }))
    }
}

// ============================================================================
// Tests
// ============================================================================
