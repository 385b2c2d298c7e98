//! In-memory cursor state for the coordination service.

use std::collections::HashMap;

use tokio::sync::Mutex;

use feed_core::claim_window;

/// Outcome of a cursor claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Indices for the batch, in order.
    Granted(Vec<usize>),
    /// The batch would run past the end and wrapping was not allowed.
    Exhausted,
}

/// One cursor per iterator key (`executions.{id}.{dataset}`), starting at 0.
///
/// Cursors live in memory for the life of the process. A service is meant
/// to serve one test run; long-lived deployments drop the cursors of a
/// finished execution with [`CursorState::end_execution`].
#[derive(Debug)]
pub struct CursorState {
    key: Option<String>,
    cursors: Mutex<HashMap<String, u64>>,
}

impl CursorState {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// True when `key` may use the service.
    pub fn authorize(&self, key: Option<&str>) -> bool {
        match &self.key {
            Some(expected) => key == Some(expected.as_str()),
            None => true,
        }
    }

    /// Claim `rows` indices from the cursor for `iterator`.
    ///
    /// Check and advance happen under one lock, so concurrent requests for
    /// the same key never receive overlapping windows. An exhausted claim
    /// leaves the cursor where it was.
    pub async fn claim(&self, iterator: &str, rows: usize, length: usize, wrap: bool) -> Claim {
        let mut cursors = self.cursors.lock().await;
        let position = cursors.get(iterator).copied().unwrap_or(0);

        let Some(indices) = claim_window(position, rows, length, wrap) else {
            return Claim::Exhausted;
        };

        let next = position.wrapping_add(rows as u64);
        if cursors.insert(iterator.to_string(), next).is_none() {
            tracing::info!(iterator, tracked = cursors.len(), "new iterator cursor");
        }
        Claim::Granted(indices)
    }

    /// Drop every cursor belonging to `execution_id`.
    ///
    /// Returns how many cursors were removed. A later claim for the same
    /// execution starts again at position 0.
    pub async fn end_execution(&self, execution_id: &str) -> usize {
        let prefix = format!("executions.{execution_id}.");
        let mut cursors = self.cursors.lock().await;

        let before = cursors.len();
        cursors.retain(|iterator, _| !iterator.starts_with(&prefix));
        let removed = before - cursors.len();

        tracing::info!(
            execution_id,
            removed,
            tracked = cursors.len(),
            "execution cursors dropped"
        );
        removed
    }

    /// Current cursor position for `iterator`, if it has been used.
    #[cfg(test)]
    pub async fn position(&self, iterator: &str) -> Option<u64> {
        self.cursors.lock().await.get(iterator).copied()
    }

    #[cfg(test)]
    pub async fn iterator_count(&self) -> usize {
        self.cursors.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_claim_advances_per_key() {
        let state = CursorState::new(None);

        assert_eq!(state.claim("executions.1.a", 2, 5, true).await, Claim::Granted(vec![0, 1]));
        assert_eq!(state.claim("executions.1.a", 2, 5, true).await, Claim::Granted(vec![2, 3]));
        // Independent cursor per dataset
        assert_eq!(state.claim("executions.1.b", 1, 5, true).await, Claim::Granted(vec![0]));

        assert_eq!(state.position("executions.1.a").await, Some(4));
        assert_eq!(state.position("executions.1.b").await, Some(1));
        assert_eq!(state.position("executions.2.a").await, None);
        assert_eq!(state.iterator_count().await, 2);
    }

    #[tokio::test]
    async fn test_claim_wraps() {
        let state = CursorState::new(None);
        assert_eq!(state.claim("it", 4, 3, true).await, Claim::Granted(vec![0, 1, 2, 0]));
        assert_eq!(state.claim("it", 2, 3, true).await, Claim::Granted(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_claim_exhausted_keeps_cursor() {
        let state = CursorState::new(None);
        assert_eq!(state.claim("it", 2, 3, false).await, Claim::Granted(vec![0, 1]));
        assert_eq!(state.claim("it", 2, 3, false).await, Claim::Exhausted);
        assert_eq!(state.position("it").await, Some(2));
        assert_eq!(state.claim("it", 1, 3, false).await, Claim::Granted(vec![2]));
    }

    #[tokio::test]
    async fn test_end_execution_drops_only_its_cursors() {
        let state = CursorState::new(None);
        state.claim("executions.1.a", 2, 5, true).await;
        state.claim("executions.1.b", 1, 5, true).await;
        state.claim("executions.12.a", 3, 5, true).await;

        assert_eq!(state.end_execution("1").await, 2);
        assert_eq!(state.iterator_count().await, 1);
        assert_eq!(state.position("executions.12.a").await, Some(3));

        // Unknown execution is a no-op
        assert_eq!(state.end_execution("7").await, 0);

        // A dropped cursor restarts from the first row
        assert_eq!(state.claim("executions.1.a", 1, 5, true).await, Claim::Granted(vec![0]));
    }

    #[tokio::test]
    async fn test_authorize() {
        let open = CursorState::new(None);
        assert!(open.authorize(None));
        assert!(open.authorize(Some("anything")));

        let locked = CursorState::new(Some("s3cret".to_string()));
        assert!(locked.authorize(Some("s3cret")));
        assert!(!locked.authorize(Some("wrong")));
        assert!(!locked.authorize(None));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_are_disjoint() {
        let state = Arc::new(CursorState::new(None));
        let length = 400;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let state = Arc::clone(&state);
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                for _ in 0..10 {
                    match state.claim("it", 5, length, false).await {
                        Claim::Granted(indices) => got.extend(indices),
                        Claim::Exhausted => panic!("dataset exhausted early"),
                    }
                }
                got
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..length).collect::<Vec<_>>());
    }
}
