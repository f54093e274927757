//! Tuple store contract
//!
//! Backends implement versioned tuple storage: every mutation returns a
//! consistency token, every read pins itself to one. A backend must keep
//! enough version history that a read at token `t` sees exactly the
//! writes with token <= `t`, regardless of later mutations.

use crate::error::StoreError;
use crate::token::ConsistencyToken;
use crate::tuple::{RelationTuple, SubjectRef, TupleFilter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pagination request for tuple listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Maximum tuples to return; `None` asks for the backend default.
    pub size: Option<usize>,
    /// Continuation token from a previous [`TupleSlice`].
    pub token: Option<String>,
}

impl Page {
    pub fn first(size: usize) -> Self {
        Self {
            size: Some(size),
            token: None,
        }
    }

    pub fn after(size: usize, token: &str) -> Self {
        Self {
            size: Some(size),
            token: Some(token.to_string()),
        }
    }
}

/// One page of a tuple listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleSlice {
    pub tuples: Vec<RelationTuple>,
    /// `Some` when more results remain; feed it back via [`Page::after`].
    pub next_page_token: Option<String>,
}

/// Versioned storage for relation tuples.
///
/// Mutations are idempotent: writing a tuple that is already live, or
/// deleting one that is absent, succeeds and still returns a fresh token.
/// A batch [`apply`](TupleStore::apply) is atomic under a single token;
/// no read observes part of a batch.
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Inserts one tuple; no-op if it is already live.
    async fn write(&self, tuple: RelationTuple) -> Result<ConsistencyToken, StoreError>;

    /// Removes one tuple; no-op if it is absent.
    async fn delete(&self, tuple: RelationTuple) -> Result<ConsistencyToken, StoreError>;

    /// Applies a batch of writes and deletes under one token.
    async fn apply(
        &self,
        writes: Vec<RelationTuple>,
        deletes: Vec<RelationTuple>,
    ) -> Result<ConsistencyToken, StoreError>;

    /// Whether the exact tuple is live in the snapshot at `as_of`.
    /// [`StoreError::Unready`] when the store has not applied `as_of` yet;
    /// answering from a younger state would miss promised writes.
    async fn exists(
        &self,
        tuple: &RelationTuple,
        as_of: ConsistencyToken,
    ) -> Result<bool, StoreError>;

    /// All subjects holding `relation` on the object in the snapshot at
    /// `as_of`, in a stable order. [`StoreError::Unready`] when the store
    /// has not applied `as_of` yet.
    async fn scan(
        &self,
        namespace: &str,
        object: &str,
        relation: &str,
        as_of: ConsistencyToken,
    ) -> Result<Vec<SubjectRef>, StoreError>;

    /// Pages through tuples matching `filter` in the snapshot at `as_of`.
    /// Ordering is total and stable across pages of the same snapshot.
    /// [`StoreError::Unready`] when the store has not applied `as_of` yet.
    async fn query(
        &self,
        filter: &TupleFilter,
        page: &Page,
        as_of: ConsistencyToken,
    ) -> Result<TupleSlice, StoreError>;

    /// Token of the newest fully applied write.
    fn head(&self) -> ConsistencyToken;

    /// Blocks until `head() >= token` or the budget elapses, in which case
    /// the store is [`StoreError::Unready`] for that token.
    async fn wait_for(&self, token: ConsistencyToken, budget: Duration) -> Result<(), StoreError>;
}
