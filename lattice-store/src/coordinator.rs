//! Write coordinator
//!
//! Hands out consistency tokens and tracks which prefix of them has been
//! applied. Tokens are issued in a strictly increasing sequence; the
//! published head only advances over a contiguous prefix of committed
//! tokens, so a reader that has been told "head >= t" can rely on every
//! write up to `t` being visible, with no holes.

use crate::token::ConsistencyToken;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Outcome of waiting for the head to reach a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Head is at or past the requested token.
    Ready,
    /// The wait budget elapsed first.
    Timeout,
}

#[derive(Debug)]
struct CommitLog {
    /// Highest token such that every token up to it has committed.
    applied: u64,
    /// Committed tokens above `applied`, waiting for the gap to close.
    out_of_order: BTreeSet<u64>,
}

/// Issues tokens and publishes the contiguous applied watermark.
///
/// `issue` reserves the next token before a write's effects are recorded;
/// `commit` (or `abandon`, for writes that failed and left no effects)
/// marks it done. Waiters park on a watch channel keyed by the watermark.
#[derive(Debug)]
pub struct WriteCoordinator {
    issued: AtomicU64,
    log: Mutex<CommitLog>,
    head_tx: watch::Sender<u64>,
}

impl WriteCoordinator {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Resumes token issuance after `sequence`, for backends that persist
    /// their version history across restarts.
    pub fn starting_at(sequence: u64) -> Self {
        let (head_tx, _) = watch::channel(sequence);
        Self {
            issued: AtomicU64::new(sequence),
            log: Mutex::new(CommitLog {
                applied: sequence,
                out_of_order: BTreeSet::new(),
            }),
            head_tx,
        }
    }

    /// Reserves the next token. Every issued token must eventually reach
    /// `commit` or `abandon`, otherwise the head stalls behind it.
    pub fn issue(&self) -> ConsistencyToken {
        ConsistencyToken::new(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Marks a token's effects as applied and advances the head over any
    /// newly contiguous prefix.
    pub fn commit(&self, token: ConsistencyToken) {
        let head = {
            let mut log = self.log.lock();
            log.out_of_order.insert(token.sequence());
            loop {
                let next = log.applied + 1;
                if !log.out_of_order.remove(&next) {
                    break;
                }
                log.applied += 1;
            }
            log.applied
        };
        self.head_tx.send_replace(head);
    }

    /// Releases a token whose write failed before recording any effects.
    /// The head may advance past it as if it were an applied no-op.
    pub fn abandon(&self, token: ConsistencyToken) {
        self.commit(token);
    }

    /// Highest token whose entire prefix is visible to readers.
    pub fn head(&self) -> ConsistencyToken {
        ConsistencyToken::new(*self.head_tx.borrow())
    }

    /// Waits until the head reaches `token` or the budget elapses.
    pub async fn wait_for(&self, token: ConsistencyToken, budget: Duration) -> WaitStatus {
        let target = token.sequence();
        if *self.head_tx.borrow() >= target {
            return WaitStatus::Ready;
        }
        let mut head_rx = self.head_tx.subscribe();
        let wait = head_rx.wait_for(|head| *head >= target);
        let outcome = tokio::time::timeout(budget, wait).await;
        match outcome {
            Ok(Ok(_)) => WaitStatus::Ready,
            // The sender lives in self, so a closed channel can only mean
            // the coordinator is being torn down; report as not ready.
            Ok(Err(_)) | Err(_) => WaitStatus::Timeout,
        }
    }
}

impl Default for WriteCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_issue_is_strictly_increasing() {
        let coordinator = WriteCoordinator::new();
        let first = coordinator.issue();
        let second = coordinator.issue();
        let third = coordinator.issue();
        assert!(first < second && second < third);
        assert_eq!(coordinator.head(), ConsistencyToken::ZERO);
    }

    #[test]
    fn test_head_waits_for_contiguous_prefix() {
        let coordinator = WriteCoordinator::new();
        let first = coordinator.issue();
        let second = coordinator.issue();
        let third = coordinator.issue();

        coordinator.commit(third);
        assert_eq!(
            coordinator.head(),
            ConsistencyToken::ZERO,
            "a committed token behind a hole must stay invisible"
        );

        coordinator.commit(first);
        assert_eq!(coordinator.head(), first);

        coordinator.commit(second);
        assert_eq!(
            coordinator.head(),
            third,
            "closing the gap should advance over the whole prefix"
        );
    }

    #[test]
    fn test_abandon_counts_toward_the_prefix() {
        let coordinator = WriteCoordinator::new();
        let failed = coordinator.issue();
        let ok = coordinator.issue();
        coordinator.commit(ok);
        assert_eq!(coordinator.head(), ConsistencyToken::ZERO);
        coordinator.abandon(failed);
        assert_eq!(coordinator.head(), ok);
    }

    #[test]
    fn test_starting_at_resumes_sequence() {
        let coordinator = WriteCoordinator::starting_at(10);
        assert_eq!(coordinator.head().to_string(), "10");
        let next = coordinator.issue();
        assert_eq!(next.to_string(), "11");
    }

    #[tokio::test]
    async fn test_wait_for_returns_immediately_when_caught_up() {
        let coordinator = WriteCoordinator::new();
        let token = coordinator.issue();
        coordinator.commit(token);
        let status = coordinator.wait_for(token, Duration::from_millis(10)).await;
        assert_eq!(status, WaitStatus::Ready);
    }

    #[tokio::test]
    async fn test_wait_for_times_out_on_future_token() {
        let coordinator = WriteCoordinator::new();
        let pending = coordinator.issue();
        let status = coordinator
            .wait_for(pending, Duration::from_millis(20))
            .await;
        assert_eq!(status, WaitStatus::Timeout);
    }

    #[tokio::test]
    async fn test_wait_for_wakes_when_commit_lands() {
        let coordinator = Arc::new(WriteCoordinator::new());
        let token = coordinator.issue();

        let committer = Arc::clone(&coordinator);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            committer.commit(token);
        });

        let status = coordinator.wait_for(token, Duration::from_secs(5)).await;
        assert_eq!(status, WaitStatus::Ready);
        handle.await.unwrap();
    }
}
