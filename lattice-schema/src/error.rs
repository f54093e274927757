//! Schema compilation errors

use thiserror::Error;

/// Rejections raised while compiling a schema document. A schema that
/// fails any of these never becomes active.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("duplicate namespace {0:?}")]
    DuplicateNamespace(String),

    #[error("duplicate relation or permission {name:?} in namespace {namespace:?}")]
    DuplicateUserset { namespace: String, name: String },

    #[error("invalid identifier {value:?} for {context}")]
    InvalidIdentifier { value: String, context: String },

    #[error("relation {relation:?} in namespace {namespace:?} allows unknown subject type {subject_type:?}")]
    UnknownSubjectType {
        namespace: String,
        relation: String,
        subject_type: String,
    },

    #[error("{userset:?} in namespace {namespace:?} references unknown relation or permission {reference:?}")]
    UnknownReference {
        namespace: String,
        userset: String,
        reference: String,
    },

    #[error("tupleset {tupleset:?} used by {userset:?} in namespace {namespace:?} is not a stored relation")]
    TuplesetNotRelation {
        namespace: String,
        userset: String,
        tupleset: String,
    },

    #[error("subject type {subject_type:?} of tupleset {tupleset:?} does not define {computed:?}, required by {userset:?} in namespace {namespace:?}")]
    MissingComputedOnSubjectType {
        namespace: String,
        userset: String,
        tupleset: String,
        subject_type: String,
        computed: String,
    },

    #[error("empty union or intersection in {userset:?} of namespace {namespace:?}")]
    EmptyCombinator { namespace: String, userset: String },

    #[error("cyclic computed references in namespace {namespace:?}: {cycle:?}")]
    CyclicDefinition {
        namespace: String,
        cycle: Vec<String>,
    },
}

impl SchemaError {
    /// Stable machine-readable code for logs and API envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateNamespace(_) => "SCHEMA_DUP_NAMESPACE",
            Self::DuplicateUserset { .. } => "SCHEMA_DUP_USERSET",
            Self::InvalidIdentifier { .. } => "SCHEMA_BAD_IDENTIFIER",
            Self::UnknownSubjectType { .. } => "SCHEMA_UNKNOWN_SUBJECT_TYPE",
            Self::UnknownReference { .. } => "SCHEMA_UNKNOWN_REFERENCE",
            Self::TuplesetNotRelation { .. } => "SCHEMA_TUPLESET_NOT_RELATION",
            Self::MissingComputedOnSubjectType { .. } => "SCHEMA_MISSING_COMPUTED",
            Self::EmptyCombinator { .. } => "SCHEMA_EMPTY_COMBINATOR",
            Self::CyclicDefinition { .. } => "SCHEMA_CYCLE",
        }
    }
}
