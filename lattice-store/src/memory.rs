//! In-memory tuple store
//!
//! The reference backend: a forward index from `(namespace, object,
//! relation)` to subject versions, each version stamped with the token
//! that inserted it and, once deleted, the token that removed it. Reads
//! filter versions against their snapshot token, so history stays
//! queryable after later mutations.
//!
//! Overlapping mutations of one key take the key's write lock before a
//! token is issued, which keeps token order and apply order identical per
//! key. Batches lock every touched key (in sorted order) under a single
//! token; the coordinator's contiguous head then guarantees no reader
//! observes half a batch.

use crate::coordinator::{WaitStatus, WriteCoordinator};
use crate::error::StoreError;
use crate::store::{Page, TupleSlice, TupleStore};
use crate::token::ConsistencyToken;
use crate::tuple::{ObjectRef, RelationTuple, SubjectRef, TupleFilter};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_PAGE_SIZE: usize = 100;

/// Key of the forward index: all tuples of one object-relation pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct ForwardKey {
    namespace: String,
    object: String,
    relation: String,
}

impl ForwardKey {
    fn of(tuple: &RelationTuple) -> Self {
        Self {
            namespace: tuple.object.namespace.clone(),
            object: tuple.object.id.clone(),
            relation: tuple.relation.clone(),
        }
    }

    /// Prefilter against the key fields of a listing filter.
    fn accepted_by(&self, filter: &TupleFilter) -> bool {
        if let Some(namespace) = &filter.namespace {
            if *namespace != self.namespace {
                return false;
            }
        }
        if let Some(object) = &filter.object {
            if *object != self.object {
                return false;
            }
        }
        if let Some(relation) = &filter.relation {
            if *relation != self.relation {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
struct SubjectVersion {
    subject: SubjectRef,
    inserted: u64,
    removed: Option<u64>,
}

impl SubjectVersion {
    fn live_at(&self, as_of: u64) -> bool {
        if self.inserted > as_of {
            return false;
        }
        match self.removed {
            None => true,
            Some(removed) => removed > as_of,
        }
    }

    fn live_now(&self) -> bool {
        self.removed.is_none()
    }
}

type Shard = Arc<RwLock<Vec<SubjectVersion>>>;

#[derive(Default)]
struct KeyOps {
    writes: Vec<SubjectRef>,
    deletes: Vec<SubjectRef>,
}

/// Versioned in-memory tuple store backed by the write coordinator.
pub struct MemoryTupleStore {
    coordinator: Arc<WriteCoordinator>,
    index: DashMap<ForwardKey, Shard>,
}

impl MemoryTupleStore {
    pub fn new() -> Self {
        Self::with_coordinator(Arc::new(WriteCoordinator::new()))
    }

    /// Builds on a shared coordinator, for callers that also watch the
    /// head directly.
    pub fn with_coordinator(coordinator: Arc<WriteCoordinator>) -> Self {
        Self {
            coordinator,
            index: DashMap::new(),
        }
    }

    fn shard(&self, key: &ForwardKey) -> Shard {
        self.index
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .clone()
    }

    fn existing_shard(&self, key: &ForwardKey) -> Option<Shard> {
        self.index.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Reads at a token ahead of the watermark would silently miss
    /// writes the snapshot promises to contain.
    fn ensure_covers(&self, as_of: ConsistencyToken) -> Result<(), StoreError> {
        let head = self.coordinator.head();
        if as_of > head {
            return Err(StoreError::Unready { token: as_of, head });
        }
        Ok(())
    }

    /// Applies writes and deletes under one token.
    fn mutate(&self, writes: Vec<RelationTuple>, deletes: Vec<RelationTuple>) -> ConsistencyToken {
        let mut grouped: BTreeMap<ForwardKey, KeyOps> = BTreeMap::new();
        for tuple in writes {
            grouped
                .entry(ForwardKey::of(&tuple))
                .or_default()
                .writes
                .push(tuple.subject);
        }
        for tuple in deletes {
            grouped
                .entry(ForwardKey::of(&tuple))
                .or_default()
                .deletes
                .push(tuple.subject);
        }

        // Lock every touched key before taking a token. BTreeMap iteration
        // gives a sorted acquisition order, and issuing the token while the
        // locks are held keeps token order equal to apply order per key.
        let shards: Vec<(KeyOps, Shard)> = grouped
            .into_iter()
            .map(|(key, ops)| {
                let shard = self.shard(&key);
                (ops, shard)
            })
            .collect();
        let mut guards: Vec<_> = shards
            .iter()
            .map(|(ops, shard)| (ops, shard.write()))
            .collect();

        let token = self.coordinator.issue();
        let sequence = token.sequence();
        let mut inserted = 0usize;
        let mut removed = 0usize;
        for (ops, guard) in &mut guards {
            let versions: &mut Vec<SubjectVersion> = guard;
            for subject in &ops.writes {
                if insert_version(versions, subject, sequence) {
                    inserted += 1;
                }
            }
            for subject in &ops.deletes {
                if remove_version(versions, subject, sequence) {
                    removed += 1;
                }
            }
        }
        drop(guards);
        self.coordinator.commit(token);
        debug!(%token, inserted, removed, "applied tuple mutations");
        token
    }
}

impl Default for MemoryTupleStore {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_version(versions: &mut Vec<SubjectVersion>, subject: &SubjectRef, sequence: u64) -> bool {
    // Idempotent: at most one live version per subject.
    if versions
        .iter()
        .any(|version| version.live_now() && version.subject == *subject)
    {
        return false;
    }
    versions.push(SubjectVersion {
        subject: subject.clone(),
        inserted: sequence,
        removed: None,
    });
    true
}

fn remove_version(versions: &mut [SubjectVersion], subject: &SubjectRef, sequence: u64) -> bool {
    for version in versions.iter_mut() {
        if version.live_now() && version.subject == *subject {
            version.removed = Some(sequence);
            return true;
        }
    }
    false
}

#[async_trait]
impl TupleStore for MemoryTupleStore {
    async fn write(&self, tuple: RelationTuple) -> Result<ConsistencyToken, StoreError> {
        debug!(%tuple, "write tuple");
        Ok(self.mutate(vec![tuple], Vec::new()))
    }

    async fn delete(&self, tuple: RelationTuple) -> Result<ConsistencyToken, StoreError> {
        debug!(%tuple, "delete tuple");
        Ok(self.mutate(Vec::new(), vec![tuple]))
    }

    async fn apply(
        &self,
        writes: Vec<RelationTuple>,
        deletes: Vec<RelationTuple>,
    ) -> Result<ConsistencyToken, StoreError> {
        Ok(self.mutate(writes, deletes))
    }

    async fn exists(
        &self,
        tuple: &RelationTuple,
        as_of: ConsistencyToken,
    ) -> Result<bool, StoreError> {
        self.ensure_covers(as_of)?;
        let Some(shard) = self.existing_shard(&ForwardKey::of(tuple)) else {
            return Ok(false);
        };
        let versions = shard.read();
        Ok(versions
            .iter()
            .any(|version| version.live_at(as_of.sequence()) && version.subject == tuple.subject))
    }

    async fn scan(
        &self,
        namespace: &str,
        object: &str,
        relation: &str,
        as_of: ConsistencyToken,
    ) -> Result<Vec<SubjectRef>, StoreError> {
        self.ensure_covers(as_of)?;
        let key = ForwardKey {
            namespace: namespace.to_string(),
            object: object.to_string(),
            relation: relation.to_string(),
        };
        let Some(shard) = self.existing_shard(&key) else {
            return Ok(Vec::new());
        };
        let versions = shard.read();
        let mut subjects: Vec<SubjectRef> = versions
            .iter()
            .filter(|version| version.live_at(as_of.sequence()))
            .map(|version| version.subject.clone())
            .collect();
        drop(versions);
        subjects.sort();
        Ok(subjects)
    }

    async fn query(
        &self,
        filter: &TupleFilter,
        page: &Page,
        as_of: ConsistencyToken,
    ) -> Result<TupleSlice, StoreError> {
        self.ensure_covers(as_of)?;
        let limit = page.size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let after = match &page.token {
            // Page tokens are the text form of the last tuple returned.
            Some(token) => {
                RelationTuple::from_str(token)
                    .map_err(|_| StoreError::InvalidPageToken(token.clone()))?;
                Some(token.clone())
            }
            None => None,
        };

        let shards: Vec<(ForwardKey, Shard)> = self
            .index
            .iter()
            .filter(|entry| entry.key().accepted_by(filter))
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let sequence = as_of.sequence();
        let mut matched: Vec<(String, RelationTuple)> = Vec::new();
        for (key, shard) in shards {
            let versions = shard.read();
            for version in versions.iter().filter(|version| version.live_at(sequence)) {
                let tuple = RelationTuple {
                    object: ObjectRef::new(&key.namespace, &key.object),
                    relation: key.relation.clone(),
                    subject: version.subject.clone(),
                };
                if filter.matches(&tuple) {
                    matched.push((tuple.to_string(), tuple));
                }
            }
        }
        matched.sort();

        let mut tuples: Vec<RelationTuple> = Vec::new();
        let mut next_page_token = None;
        for (text, tuple) in matched {
            if let Some(after) = &after {
                if text <= *after {
                    continue;
                }
            }
            if tuples.len() == limit {
                next_page_token = tuples.last().map(ToString::to_string);
                break;
            }
            tuples.push(tuple);
        }
        Ok(TupleSlice {
            tuples,
            next_page_token,
        })
    }

    fn head(&self) -> ConsistencyToken {
        self.coordinator.head()
    }

    async fn wait_for(&self, token: ConsistencyToken, budget: Duration) -> Result<(), StoreError> {
        match self.coordinator.wait_for(token, budget).await {
            WaitStatus::Ready => Ok(()),
            WaitStatus::Timeout => Err(StoreError::Unready {
                token,
                head: self.coordinator.head(),
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
