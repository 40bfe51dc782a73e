//! Condition cache: memoized condition values, shared by every identity of
//! a run.

use crate::error::Fault;
use bakery_core::{Bindings, Value};
use bakery_profile::Testable;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// `(condition name, testable, used iterarg bindings)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Condition name
    pub name: String,

    /// Scope the condition was declared for
    pub testable: Testable,

    /// Bindings of the iterargs the condition depends on
    pub bindings: Bindings,
}

impl CacheKey {
    /// Create a key.
    pub fn new(name: impl Into<String>, testable: Testable, bindings: Bindings) -> Self {
        Self {
            name: name.into(),
            testable,
            bindings,
        }
    }
}

/// A memoized evaluation. Failures are memoized as well.
pub type Cached = Result<Value, Fault>;

type Slot = Arc<Mutex<Option<Cached>>>;

/// Key-locked concurrent map: write once, read many.
///
/// Concurrent requests for the same key wait on that key's lock, so a
/// condition body runs at most once per key.
#[derive(Default)]
pub struct ConditionCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    evaluations: AtomicUsize,
}

impl ConditionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`, evaluating it with `evaluate` on first use.
    pub async fn get_or_evaluate<F, Fut>(&self, key: CacheKey, evaluate: F) -> Cached
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Cached>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key).or_insert_with(|| Arc::new(Mutex::new(None))))
        };

        let mut entry = slot.lock().await;
        if let Some(cached) = entry.as_ref() {
            return cached.clone();
        }
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let value = evaluate().await;
        *entry = Some(value.clone());
        value
    }

    /// Cached value for `key`, without evaluating.
    pub async fn peek(&self, key: &CacheKey) -> Option<Cached> {
        let slot = self.slots.lock().await.get(key).cloned()?;
        let entry = slot.lock().await;
        entry.clone()
    }

    /// Number of condition bodies evaluated so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Number of keys seen.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Whether no key was seen yet.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
