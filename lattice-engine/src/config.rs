//! Engine limits and defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable evaluation limits.
///
/// The defaults are safe for interactive use; servers embedding the
/// engine usually widen `eval_timeout` for batch audits and narrow
/// `consistency_wait` when callers retry on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Userset hops a single evaluation may take before it fails with
    /// a depth error. Bounds traversal over cyclic tuple data.
    pub max_depth: usize,
    /// How long a pinned-token read waits for the store to catch up
    /// before reporting the snapshot as unready.
    pub consistency_wait: Duration,
    /// Wall-clock budget for one check or expand evaluation.
    pub eval_timeout: Duration,
    /// Page size used when a list request does not name one.
    pub default_page_size: usize,
    /// Upper bound on the page size a list request may ask for.
    pub max_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            consistency_wait: Duration::from_secs(5),
            eval_timeout: Duration::from_secs(2),
            default_page_size: 25,
            max_page_size: 100,
        }
    }
}

impl EngineConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_consistency_wait(mut self, wait: Duration) -> Self {
        self.consistency_wait = wait;
        self
    }

    pub fn with_eval_timeout(mut self, timeout: Duration) -> Self {
        self.eval_timeout = timeout;
        self
    }

    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
