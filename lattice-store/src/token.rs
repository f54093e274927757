//! Consistency tokens
//!
//! Every acknowledged write is assigned a token; reads pin themselves to a
//! token to get a stable snapshot. Tokens are totally ordered within one
//! store and opaque to callers aside from equality, ordering and the
//! string form used to ferry them through APIs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Marker of write ordering issued by the write coordinator.
///
/// A token compares greater than every token issued before it. Callers
/// never construct meaningful tokens themselves; they receive them from
/// writes (or `head()`) and hand them back unchanged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConsistencyToken(u64);

impl ConsistencyToken {
    /// Ordered before every write; the head of an empty store.
    pub const ZERO: ConsistencyToken = ConsistencyToken(0);

    pub(crate) const fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    pub(crate) const fn sequence(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConsistencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid consistency token {0:?}")]
pub struct ParseTokenError(String);

impl FromStr for ConsistencyToken {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| ParseTokenError(s.to_string()))
    }
}
