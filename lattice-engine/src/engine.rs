//! Engine facade.
//!
//! Owns the store, the schema registry and the evaluation limits, and
//! exposes the public API: publish, write, delete, apply, check,
//! expand and list. Request validation and snapshot resolution happen
//! here so the evaluators can assume well-formed input.

use crate::check::{EvalContext, Evaluator, Frame, PathSet};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::expand::{ExpandContext, Expander};
use crate::types::{
    CheckDecision, CheckRequest, Consistency, ExpandRequest, ExpandResponse, ListRequest,
    ListResponse,
};
use lattice_schema::{CompiledSchema, SchemaDef, SchemaRegistry, SchemaRevision};
use lattice_store::{ConsistencyToken, Page, RelationTuple, SubjectRef, TupleStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct LatticeEngine {
    store: Arc<dyn TupleStore>,
    registry: Arc<SchemaRegistry>,
    config: EngineConfig,
}

impl LatticeEngine {
    pub fn new(store: Arc<dyn TupleStore>, registry: Arc<SchemaRegistry>) -> Self {
        Self::with_config(store, registry, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn TupleStore>,
        registry: Arc<SchemaRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self { store, registry, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn TupleStore> {
        &self.store
    }

    /// Compiles `def` and makes it the active revision. On failure the
    /// previous revision stays active.
    pub fn publish_schema(&self, def: &SchemaDef) -> Result<Arc<SchemaRevision>, EngineError> {
        Ok(self.registry.publish(def)?)
    }

    fn active_schema(&self) -> Result<Arc<CompiledSchema>, EngineError> {
        self.registry
            .active()
            .map(|revision| revision.schema())
            .ok_or(EngineError::NoActiveSchema)
    }

    // =============================================================================
    // Write Operations
    // =============================================================================

    /// Stores one tuple. The tuple must name declared usersets and a
    /// subject the relation accepts under the active schema.
    pub async fn write(&self, tuple: RelationTuple) -> Result<ConsistencyToken, EngineError> {
        let schema = self.active_schema()?;
        validate_write(&schema, &tuple)?;
        Ok(self.store.write(tuple).await?)
    }

    /// Removes one tuple. Deletes validate shape only: a schema change
    /// must never trap stale tuples in the store.
    pub async fn delete(&self, tuple: RelationTuple) -> Result<ConsistencyToken, EngineError> {
        validate_shape(&tuple)?;
        Ok(self.store.delete(tuple).await?)
    }

    /// Applies writes and deletes as one atomic batch under a single
    /// token. No snapshot observes a strict subset of the batch.
    pub async fn apply(
        &self,
        writes: Vec<RelationTuple>,
        deletes: Vec<RelationTuple>,
    ) -> Result<ConsistencyToken, EngineError> {
        let schema = self.active_schema()?;
        for tuple in &writes {
            validate_write(&schema, tuple)?;
        }
        for tuple in &deletes {
            validate_shape(tuple)?;
        }
        Ok(self.store.apply(writes, deletes).await?)
    }

    // =============================================================================
    // Read Operations
    // =============================================================================

    /// Answers one membership question at a pinned snapshot.
    pub async fn check(&self, request: CheckRequest) -> Result<CheckDecision, EngineError> {
        let schema = self.active_schema()?;
        validate_goal(&schema, &request.object.namespace, &request.permission)?;
        validate_subject(&schema, &request.subject)?;
        let as_of = self.resolve_consistency(request.consistency).await?;

        let evaluator = Evaluator::new(EvalContext {
            store: Arc::clone(&self.store),
            schema,
            subject: request.subject.clone(),
            as_of,
            max_depth: self.config.max_depth,
        });
        let goal = Frame {
            namespace: request.object.namespace.clone(),
            object: request.object.id.clone(),
            userset: request.permission.clone(),
        };

        let budget = request
            .timeout
            .map_or(self.config.eval_timeout, |t| t.min(self.config.eval_timeout));
        // The timer only wins at a yield point, so a spent budget has to
        // cancel before the evaluation gets its first poll.
        if budget.is_zero() {
            return Err(EngineError::Cancelled { elapsed_ms: 0 });
        }
        let started = Instant::now();
        let evaluation = evaluator.eval_goal(goal, PathSet::default(), self.config.max_depth);
        let allowed = match tokio::time::timeout(budget, evaluation).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Cancelled {
                    elapsed_ms: elapsed_ms(started),
                })
            }
        };
        debug!(
            object = %request.object,
            permission = %request.permission,
            subject = %request.subject,
            %as_of,
            allowed,
            "check evaluated"
        );
        Ok(CheckDecision { allowed, token: as_of })
    }

    /// Builds the membership tree behind one userset at a pinned snapshot.
    pub async fn expand(&self, request: ExpandRequest) -> Result<ExpandResponse, EngineError> {
        let schema = self.active_schema()?;
        validate_goal(&schema, &request.object.namespace, &request.permission)?;
        let as_of = self.resolve_consistency(request.consistency).await?;

        let depth = request
            .max_depth
            .unwrap_or(self.config.max_depth)
            .min(self.config.max_depth);
        let expander = Expander::new(ExpandContext {
            store: Arc::clone(&self.store),
            schema,
            as_of,
        });
        let goal = Frame {
            namespace: request.object.namespace.clone(),
            object: request.object.id.clone(),
            userset: request.permission.clone(),
        };

        if self.config.eval_timeout.is_zero() {
            return Err(EngineError::Cancelled { elapsed_ms: 0 });
        }
        let started = Instant::now();
        let expansion = expander.expand_goal(goal, PathSet::default(), depth);
        let root = match tokio::time::timeout(self.config.eval_timeout, expansion).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Cancelled {
                    elapsed_ms: elapsed_ms(started),
                })
            }
        };
        debug!(object = %request.object, permission = %request.permission, %as_of, "expand evaluated");
        Ok(ExpandResponse { root, token: as_of })
    }

    /// Lists stored tuples matching a filter, one page at a time.
    /// Filters are not schema-validated: listing is an operator surface
    /// and must see tuples schema changes left behind.
    pub async fn list_tuples(&self, request: ListRequest) -> Result<ListResponse, EngineError> {
        let as_of = self.resolve_consistency(request.consistency).await?;
        let size = request
            .page
            .size
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);
        let page = Page { size: Some(size), token: request.page.token.clone() };
        let slice = self.store.query(&request.filter, &page, as_of).await?;
        Ok(ListResponse {
            tuples: slice.tuples,
            next_page_token: slice.next_page_token,
            token: as_of,
        })
    }

    async fn resolve_consistency(
        &self,
        consistency: Consistency,
    ) -> Result<ConsistencyToken, EngineError> {
        match consistency {
            Consistency::Latest => Ok(self.store.head()),
            Consistency::AtToken(token) => {
                self.store.wait_for(token, self.config.consistency_wait).await?;
                Ok(token)
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Request validation
// ============================================================================

/// Every component must be nonempty and free of `:`, `#` and `@`: those
/// characters are structural in the tuple text notation, which page
/// tokens and lock keys are built from.
fn validate_shape(tuple: &RelationTuple) -> Result<(), EngineError> {
    let component = |part: &str| -> Result<(), EngineError> {
        if part.is_empty() {
            return Err(EngineError::InvalidTuple(format!("empty component in {tuple}")));
        }
        if part.contains([':', '#', '@'].as_slice()) {
            return Err(EngineError::InvalidTuple(format!(
                "reserved separator in component {part:?} of {tuple}"
            )));
        }
        Ok(())
    };
    component(&tuple.object.namespace)?;
    component(&tuple.object.id)?;
    component(&tuple.relation)?;
    match &tuple.subject {
        SubjectRef::Object(object) => {
            component(&object.namespace)?;
            component(&object.id)?;
        }
        SubjectRef::Userset(set) => {
            component(&set.object.namespace)?;
            component(&set.object.id)?;
            component(&set.relation)?;
        }
    }
    Ok(())
}

fn validate_write(schema: &CompiledSchema, tuple: &RelationTuple) -> Result<(), EngineError> {
    validate_shape(tuple)?;
    let Some(namespace) = schema.namespace(&tuple.object.namespace) else {
        return Err(EngineError::InvalidTuple(format!(
            "namespace {:?} is not declared",
            tuple.object.namespace
        )));
    };
    let Some(userset) = namespace.userset(&tuple.relation) else {
        return Err(EngineError::InvalidTuple(format!(
            "relation {:?} is not declared in namespace {:?}",
            tuple.relation, tuple.object.namespace
        )));
    };
    let subject_namespace = tuple.subject.namespace();
    let Some(subject_ns) = schema.namespace(subject_namespace) else {
        return Err(EngineError::InvalidTuple(format!(
            "subject namespace {subject_namespace:?} is not declared"
        )));
    };
    if let Some(set) = tuple.subject.as_userset() {
        if subject_ns.userset(&set.relation).is_none() {
            return Err(EngineError::InvalidTuple(format!(
                "subject userset {:?} is not declared in namespace {subject_namespace:?}",
                set.relation
            )));
        }
    }
    if !userset.subject_types.is_empty()
        && !userset.subject_types.iter().any(|accepted| accepted == subject_namespace)
    {
        return Err(EngineError::InvalidTuple(format!(
            "relation {:?} does not accept subjects from namespace {subject_namespace:?}",
            tuple.relation
        )));
    }
    Ok(())
}

fn validate_goal(schema: &CompiledSchema, namespace: &str, permission: &str) -> Result<(), EngineError> {
    let Some(declared) = schema.namespace(namespace) else {
        return Err(EngineError::UnknownNamespace(namespace.to_string()));
    };
    if declared.userset(permission).is_none() {
        return Err(EngineError::UnknownPermission {
            namespace: namespace.to_string(),
            name: permission.to_string(),
        });
    }
    Ok(())
}

fn validate_subject(schema: &CompiledSchema, subject: &SubjectRef) -> Result<(), EngineError> {
    let Some(namespace) = schema.namespace(subject.namespace()) else {
        return Err(EngineError::SubjectInvalid(format!(
            "namespace {:?} is not declared",
            subject.namespace()
        )));
    };
    if let Some(set) = subject.as_userset() {
        if namespace.userset(&set.relation).is_none() {
            return Err(EngineError::SubjectInvalid(format!(
                "userset {:?} is not declared in namespace {:?}",
                set.relation,
                subject.namespace()
            )));
        }
    }
    Ok(())
}
