//! Async mutual-exclusion region shared by every executor in a run.
//!
//! `SharedState` is a plain key/value map guarded by a `tokio::sync::Mutex`.
//! `get`/`set`/`has`/`delete` each take the lock for a single operation;
//! `hold()` takes it for the lifetime of the returned guard so a caller can
//! read-modify-write several keys atomically. Nested holds on the same task
//! would deadlock on the inner lock attempt, so a task-local flag raises
//! [`crate::error::WorkflowError::NestedHold`] instead (`spec.md` §9).

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Result, WorkflowError};

tokio::task_local! {
    static HOLDING: Cell<bool>;
}

/// Shared key/value state visible to every executor in a workflow run.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<HashMap<String, Value>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().await.insert(key.into(), value);
    }

    pub async fn has(&self, key: &str) -> bool {
        self.inner.lock().await.contains_key(key)
    }

    pub async fn delete(&self, key: &str) -> Option<Value> {
        self.inner.lock().await.remove(key)
    }

    /// Take an exclusive hold on the whole map for a multi-key
    /// read-modify-write. Fails with `NestedHold` if the current task is
    /// already inside another `hold()` on this state.
    pub async fn hold(&self) -> Result<SharedStateGuard> {
        let already_holding = HOLDING.try_with(|flag| flag.get()).unwrap_or(false);
        if already_holding {
            return Err(WorkflowError::NestedHold);
        }
        let _ = HOLDING.try_with(|flag| flag.set(true));
        let guard = self.inner.clone().lock_owned().await;
        Ok(SharedStateGuard { guard })
    }

    /// Replace the entire map's contents, used when transferring state from
    /// a restored checkpoint (`spec.md` §4.6's foreign-restore path).
    pub async fn replace_all(&self, values: HashMap<String, Value>) {
        let mut inner = self.inner.lock().await;
        inner.clear();
        inner.extend(values);
    }

    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.lock().await.clone()
    }
}

/// RAII guard returned by [`SharedState::hold`]. Holds the underlying lock
/// for its lifetime; drop it (or let it fall out of scope) to release.
pub struct SharedStateGuard {
    guard: OwnedMutexGuard<HashMap<String, Value>>,
}

impl Drop for SharedStateGuard {
    fn drop(&mut self) {
        let _ = HOLDING.try_with(|flag| flag.set(false));
    }
}

impl SharedStateGuard {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.guard.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.guard.insert(key.into(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.guard.contains_key(key)
    }

    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.guard.remove(key)
    }

    pub fn replace_all(&mut self, values: HashMap<String, Value>) {
        self.guard.clear();
        self.guard.extend(values);
    }
}

/// Establishes the reentrancy-tracking scope for a single handler
/// invocation, so that a `hold()` taken inside `f` is visible to any nested
/// `hold()` attempted further down the same call stack. The runner wraps
/// every handler invocation in this.
pub async fn with_reentrancy_guard<F, Fut, T>(f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    HOLDING.scope(Cell::new(false), f()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let state = SharedState::new();
        state.set("count", json!(1)).await;
        assert_eq!(state.get("count").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let state = SharedState::new();
        state.set("count", json!(1)).await;
        assert_eq!(state.delete("count").await, Some(json!(1)));
        assert!(!state.has("count").await);
    }

    #[tokio::test]
    async fn hold_allows_atomic_multi_key_update() {
        let state = SharedState::new();
        {
            let mut guard = state.hold().await.unwrap();
            guard.set("a", json!(1));
            guard.set("b", json!(2));
        }
        assert_eq!(state.get("a").await, Some(json!(1)));
        assert_eq!(state.get("b").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn nested_hold_within_guard_scope_is_rejected() {
        let state = SharedState::new();
        let result = with_reentrancy_guard(|| async {
            let _outer = state.hold().await.unwrap();
            state.hold().await
        })
        .await;
        assert!(matches!(result, Err(WorkflowError::NestedHold)));
    }

    #[tokio::test]
    async fn sequential_holds_within_the_same_scope_both_succeed() {
        let state = SharedState::new();
        with_reentrancy_guard(|| async {
            {
                let _first = state.hold().await.unwrap();
            }
            let _second = state.hold().await.unwrap();
        })
        .await;
    }
}
