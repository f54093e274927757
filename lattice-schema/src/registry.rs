//! Schema revision registry
//!
//! Publishing compiles a definition document and, only if compilation
//! succeeds, swaps it in as the active revision. Revisions are immutable
//! and shared as `Arc`s: an evaluation that grabbed a revision keeps
//! using it to completion even if a newer one is published mid-flight.

use crate::compile::{compile, CompiledSchema};
use crate::definition::SchemaDef;
use crate::error::SchemaError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// An immutable published schema.
#[derive(Debug)]
pub struct SchemaRevision {
    pub id: Uuid,
    /// 1-based publish counter; newer revisions have higher versions.
    pub version: u64,
    pub published_at: DateTime<Utc>,
    schema: Arc<CompiledSchema>,
}

impl SchemaRevision {
    pub fn schema(&self) -> Arc<CompiledSchema> {
        Arc::clone(&self.schema)
    }
}

/// Keeps every published revision and tracks the active one.
pub struct SchemaRegistry {
    revisions: RwLock<Vec<Arc<SchemaRevision>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            revisions: RwLock::new(Vec::new()),
        }
    }

    /// Compiles `def` and makes it the active revision. A rejected
    /// document leaves the previous revision active.
    pub fn publish(&self, def: &SchemaDef) -> Result<Arc<SchemaRevision>, SchemaError> {
        let compiled = compile(def)?;
        let mut revisions = self.revisions.write();
        let revision = Arc::new(SchemaRevision {
            id: Uuid::new_v4(),
            version: revisions.len() as u64 + 1,
            published_at: Utc::now(),
            schema: Arc::new(compiled),
        });
        revisions.push(Arc::clone(&revision));
        info!(
            version = revision.version,
            namespaces = revision.schema.namespace_names().count(),
            "published schema revision"
        );
        Ok(revision)
    }

    /// The newest revision, or `None` before the first publish.
    pub fn active(&self) -> Option<Arc<SchemaRevision>> {
        self.revisions.read().last().cloned()
    }

    /// A historical revision by version number.
    pub fn get(&self, version: u64) -> Option<Arc<SchemaRevision>> {
        let revisions = self.revisions.read();
        version
            .checked_sub(1)
            .and_then(|idx| revisions.get(idx as usize))
            .cloned()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
