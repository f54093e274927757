//! Expansion trees.
//!
//! Mirrors check evaluation but produces the full membership tree
//! instead of a boolean, for audits and debugging. Children of one
//! node resolve concurrently and are reassembled in expression order,
//! so the same data always yields the same tree. Bounds that fail a
//! check (depth, path revisits) truncate expansion to a frontier node
//! instead: the tree stays an honest partial answer.

use crate::check::{Frame, PathSet};
use crate::error::EngineError;
use crate::types::ExpandNode;
use futures::future::join_all;
use lattice_schema::{CompiledSchema, PermissionExpr};
use lattice_store::{ConsistencyToken, SubjectRef, TupleStore, UsersetRef};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type ExpandFuture = Pin<Box<dyn Future<Output = Result<ExpandNode, EngineError>> + Send>>;

/// State fixed for the whole expansion of one request.
pub(crate) struct ExpandContext {
    pub(crate) store: Arc<dyn TupleStore>,
    pub(crate) schema: Arc<CompiledSchema>,
    pub(crate) as_of: ConsistencyToken,
}

#[derive(Clone)]
pub(crate) struct Expander {
    inner: Arc<ExpandContext>,
}

impl Expander {
    pub(crate) fn new(context: ExpandContext) -> Self {
        Self { inner: Arc::new(context) }
    }

    pub(crate) fn expand_goal(&self, goal: Frame, mut path: PathSet, depth: usize) -> ExpandFuture {
        let expander = self.clone();
        Box::pin(async move {
            let here = UsersetRef::new(&goal.namespace, &goal.object, &goal.userset);
            if !path.insert(goal.clone()) || depth == 0 {
                return Ok(ExpandNode::Frontier { userset: here });
            }
            let Some(namespace) = expander.inner.schema.namespace(&goal.namespace) else {
                return Ok(ExpandNode::Frontier { userset: here });
            };
            let Some(userset) = namespace.userset(&goal.userset) else {
                return Ok(ExpandNode::Frontier { userset: here });
            };
            let expr = userset.expr.clone();
            expander.expand_expr(expr, goal, path, depth - 1).await
        })
    }

    fn expand_expr(&self, expr: PermissionExpr, frame: Frame, path: PathSet, depth: usize) -> ExpandFuture {
        let expander = self.clone();
        Box::pin(async move {
            match expr {
                PermissionExpr::This => expander.expand_this(&frame, &path, depth).await,
                PermissionExpr::ComputedUserset { relation } => {
                    let target = UsersetRef::new(&frame.namespace, &frame.object, &relation);
                    let goal = Frame {
                        namespace: frame.namespace,
                        object: frame.object,
                        userset: relation,
                    };
                    let node = expander.expand_goal(goal, path, depth).await?;
                    Ok(ExpandNode::Subtree { userset: target, node: Box::new(node) })
                }
                PermissionExpr::TupleToUserset { tupleset, computed } => {
                    expander.expand_traversal(&frame, &tupleset, &computed, &path, depth).await
                }
                PermissionExpr::Union { children } => {
                    let nodes = expander.expand_children(children, &frame, &path, depth).await?;
                    Ok(ExpandNode::Union { children: nodes })
                }
                PermissionExpr::Intersection { children } => {
                    let nodes = expander.expand_children(children, &frame, &path, depth).await?;
                    Ok(ExpandNode::Intersection { children: nodes })
                }
                PermissionExpr::Exclusion { include, exclude } => {
                    let include = expander
                        .expand_expr(*include, frame.clone(), path.clone(), depth)
                        .await?;
                    let exclude = expander.expand_expr(*exclude, frame, path, depth).await?;
                    Ok(ExpandNode::Exclusion {
                        include: Box::new(include),
                        exclude: Box::new(exclude),
                    })
                }
            }
        })
    }

    async fn expand_children(
        &self,
        children: Vec<PermissionExpr>,
        frame: &Frame,
        path: &PathSet,
        depth: usize,
    ) -> Result<Vec<ExpandNode>, EngineError> {
        let branches: Vec<ExpandFuture> = children
            .into_iter()
            .map(|child| self.expand_expr(child, frame.clone(), path.clone(), depth))
            .collect();
        join_all(branches).await.into_iter().collect()
    }

    /// Direct tuples: object subjects become leaves, userset subjects
    /// expand into labelled subtrees, all in scan order.
    async fn expand_this(
        &self,
        frame: &Frame,
        path: &PathSet,
        depth: usize,
    ) -> Result<ExpandNode, EngineError> {
        let subjects = self
            .inner
            .store
            .scan(&frame.namespace, &frame.object, &frame.userset, self.inner.as_of)
            .await?;
        let branches: Vec<ExpandFuture> = subjects
            .into_iter()
            .map(|subject| match subject {
                SubjectRef::Userset(set) => {
                    let goal = Frame {
                        namespace: set.object.namespace.clone(),
                        object: set.object.id.clone(),
                        userset: set.relation.clone(),
                    };
                    let nested = self.expand_goal(goal, path.clone(), depth);
                    Box::pin(async move {
                        Ok(ExpandNode::Subtree { userset: set, node: Box::new(nested.await?) })
                    }) as ExpandFuture
                }
                subject => Box::pin(async move { Ok(ExpandNode::Leaf { subject }) }) as ExpandFuture,
            })
            .collect();
        let children: Result<Vec<ExpandNode>, EngineError> =
            join_all(branches).await.into_iter().collect();
        Ok(ExpandNode::Union { children: children? })
    }

    /// Tupleset hop: each object subject contributes the expansion of
    /// its computed userset. Userset subjects are not followed, so they
    /// surface as frontier nodes.
    async fn expand_traversal(
        &self,
        frame: &Frame,
        tupleset: &str,
        computed: &str,
        path: &PathSet,
        depth: usize,
    ) -> Result<ExpandNode, EngineError> {
        let subjects = self
            .inner
            .store
            .scan(&frame.namespace, &frame.object, tupleset, self.inner.as_of)
            .await?;
        let branches: Vec<ExpandFuture> = subjects
            .into_iter()
            .map(|subject| match subject {
                SubjectRef::Object(object) => {
                    let target = UsersetRef::new(&object.namespace, &object.id, computed);
                    let goal = Frame {
                        namespace: object.namespace,
                        object: object.id,
                        userset: computed.to_string(),
                    };
                    let nested = self.expand_goal(goal, path.clone(), depth);
                    Box::pin(async move {
                        Ok(ExpandNode::Subtree { userset: target, node: Box::new(nested.await?) })
                    }) as ExpandFuture
                }
                SubjectRef::Userset(set) => {
                    Box::pin(async move { Ok(ExpandNode::Frontier { userset: set }) }) as ExpandFuture
                }
            })
            .collect();
        let children: Result<Vec<ExpandNode>, EngineError> =
            join_all(branches).await.into_iter().collect();
        Ok(ExpandNode::Union { children: children? })
    }
}
