//! Check evaluation.
//!
//! Reduces a permission expression to a boolean against one pinned
//! snapshot. Branch sets with existential meaning (union children,
//! userset subjects found under `This`, traversal targets) race
//! concurrently and short-circuit on the first `true`; intersections
//! short-circuit on the first `false`. When a decisive answer and an
//! error are both in flight, the decisive answer wins; otherwise the
//! error surfaces. An indeterminate path is never coerced to `true`.

use crate::error::EngineError;
use ahash::AHashSet;
use lattice_schema::{CompiledSchema, PermissionExpr};
use lattice_store::{ConsistencyToken, SubjectRef, TupleStore};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::trace;

/// One goal on an evaluation path: a userset on a concrete object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Frame {
    pub(crate) namespace: String,
    pub(crate) object: String,
    pub(crate) userset: String,
}

/// Goals already visited on the current branch. Cloned per branch, so
/// sibling branches may legitimately revisit the same userset.
pub(crate) type PathSet = AHashSet<Frame>;

type EvalFuture = Pin<Box<dyn Future<Output = Result<bool, EngineError>> + Send>>;

/// State fixed for the whole evaluation of one check.
pub(crate) struct EvalContext {
    pub(crate) store: Arc<dyn TupleStore>,
    pub(crate) schema: Arc<CompiledSchema>,
    pub(crate) subject: SubjectRef,
    pub(crate) as_of: ConsistencyToken,
    pub(crate) max_depth: usize,
}

#[derive(Clone)]
pub(crate) struct Evaluator {
    inner: Arc<EvalContext>,
}

impl Evaluator {
    pub(crate) fn new(context: EvalContext) -> Self {
        Self { inner: Arc::new(context) }
    }

    /// Evaluates one userset goal. `depth` is the remaining hop budget;
    /// revisiting a goal already on `path` means the tuple data recurses,
    /// which fails the evaluation rather than silently answering.
    pub(crate) fn eval_goal(&self, goal: Frame, mut path: PathSet, depth: usize) -> EvalFuture {
        let eval = self.clone();
        Box::pin(async move {
            if !path.insert(goal.clone()) || depth == 0 {
                return Err(EngineError::DepthExceeded { limit: eval.inner.max_depth });
            }
            // Unresolvable names mid-traversal come from tuples written
            // under an older schema; they contribute nothing. The
            // requested goal itself is validated before evaluation.
            let Some(namespace) = eval.inner.schema.namespace(&goal.namespace) else {
                trace!(namespace = %goal.namespace, "undeclared namespace on path");
                return Ok(false);
            };
            let Some(userset) = namespace.userset(&goal.userset) else {
                trace!(
                    namespace = %goal.namespace,
                    userset = %goal.userset,
                    "undeclared userset on path"
                );
                return Ok(false);
            };
            let expr = userset.expr.clone();
            eval.eval_expr(expr, goal, path, depth - 1).await
        })
    }

    fn eval_expr(&self, expr: PermissionExpr, frame: Frame, path: PathSet, depth: usize) -> EvalFuture {
        let eval = self.clone();
        Box::pin(async move {
            match expr {
                PermissionExpr::This => eval.eval_this(&frame, &path, depth).await,
                PermissionExpr::ComputedUserset { relation } => {
                    let goal = Frame {
                        namespace: frame.namespace,
                        object: frame.object,
                        userset: relation,
                    };
                    eval.eval_goal(goal, path, depth).await
                }
                PermissionExpr::TupleToUserset { tupleset, computed } => {
                    eval.eval_traversal(&frame, &tupleset, &computed, &path, depth).await
                }
                PermissionExpr::Union { children } => {
                    let branches = children
                        .into_iter()
                        .map(|child| eval.eval_expr(child, frame.clone(), path.clone(), depth))
                        .collect();
                    race_any(branches).await
                }
                PermissionExpr::Intersection { children } => {
                    let branches = children
                        .into_iter()
                        .map(|child| eval.eval_expr(child, frame.clone(), path.clone(), depth))
                        .collect();
                    race_all(branches).await
                }
                PermissionExpr::Exclusion { include, exclude } => {
                    // The include side decides first; the exclude side
                    // only runs when there is something to take away.
                    if !eval.eval_expr(*include, frame.clone(), path.clone(), depth).await? {
                        return Ok(false);
                    }
                    Ok(!eval.eval_expr(*exclude, frame, path, depth).await?)
                }
            }
        })
    }

    async fn eval_this(&self, frame: &Frame, path: &PathSet, depth: usize) -> Result<bool, EngineError> {
        let subjects = self
            .inner
            .store
            .scan(&frame.namespace, &frame.object, &frame.userset, self.inner.as_of)
            .await?;
        if subjects.contains(&self.inner.subject) {
            trace!(
                namespace = %frame.namespace,
                object = %frame.object,
                userset = %frame.userset,
                "direct tuple hit"
            );
            return Ok(true);
        }
        let branches: Vec<EvalFuture> = subjects
            .into_iter()
            .filter_map(|subject| match subject {
                SubjectRef::Userset(set) => {
                    let goal = Frame {
                        namespace: set.object.namespace,
                        object: set.object.id,
                        userset: set.relation,
                    };
                    Some(self.eval_goal(goal, path.clone(), depth))
                }
                SubjectRef::Object(_) => None,
            })
            .collect();
        race_any(branches).await
    }

    async fn eval_traversal(
        &self,
        frame: &Frame,
        tupleset: &str,
        computed: &str,
        path: &PathSet,
        depth: usize,
    ) -> Result<bool, EngineError> {
        let subjects = self
            .inner
            .store
            .scan(&frame.namespace, &frame.object, tupleset, self.inner.as_of)
            .await?;
        let branches: Vec<EvalFuture> = subjects
            .into_iter()
            .filter_map(|subject| match subject {
                // The hop lands on the subject object. A userset subject
                // names a set, not a single object, so it is not followed.
                SubjectRef::Object(object) => {
                    let goal = Frame {
                        namespace: object.namespace,
                        object: object.id,
                        userset: computed.to_string(),
                    };
                    Some(self.eval_goal(goal, path.clone(), depth))
                }
                SubjectRef::Userset(set) => {
                    trace!(tupleset, %set, "traversal skips userset subject");
                    None
                }
            })
            .collect();
        race_any(branches).await
    }
}

/// Existential fan-out: the first `true` wins and aborts the rest.
/// `true` beats an error, an error beats `false`.
async fn race_any(branches: Vec<EvalFuture>) -> Result<bool, EngineError> {
    if branches.is_empty() {
        return Ok(false);
    }
    let mut tasks = JoinSet::new();
    for branch in branches {
        tasks.spawn(branch);
    }
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(true)) => {
                tasks.abort_all();
                return Ok(true);
            }
            Ok(Ok(false)) => {}
            Ok(Err(error)) => {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
            Err(join_error) if join_error.is_cancelled() => {}
            Err(join_error) => {
                if first_error.is_none() {
                    first_error = Some(EngineError::Internal(join_error.to_string()));
                }
            }
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(false),
    }
}

/// Universal fan-out: the first `false` wins and aborts the rest.
/// `false` beats an error, an error beats `true`.
async fn race_all(branches: Vec<EvalFuture>) -> Result<bool, EngineError> {
    let mut tasks = JoinSet::new();
    for branch in branches {
        tasks.spawn(branch);
    }
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(false)) => {
                tasks.abort_all();
                return Ok(false);
            }
            Ok(Ok(true)) => {}
            Ok(Err(error)) => {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
            Err(join_error) if join_error.is_cancelled() => {}
            Err(join_error) => {
                if first_error.is_none() {
                    first_error = Some(EngineError::Internal(join_error.to_string()));
                }
            }
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(true),
    }
}

// ============================================================================
// Tests
// ============================================================================
