//! Single-flight result cache.
//!
//! Each fingerprint owns a slot guarded by its own mutex. The first caller
//! for a fingerprint holds the slot lock while the test runs; concurrent
//! callers for the same fingerprint block on that lock and then read the
//! stored result. Callers for other fingerprints never contend. Failed
//! executions leave the slot empty, so the next caller retries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use super::fingerprint::Fingerprint;
use crate::error::DocResult;
use crate::result::TestResult;

/// A stored successful execution.
#[derive(Debug)]
pub struct CachedResult {
    /// Key the result is stored under.
    pub fingerprint: Fingerprint,
    /// The result document.
    pub result: TestResult,
    /// When the execution finished.
    pub created_at: Instant,
}

/// Counters describing cache use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Stored results.
    pub entries: u64,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to execute.
    pub misses: u64,
    /// Executions started, including failed ones.
    pub executions: u64,
}

type Slot = Arc<Mutex<Option<Arc<CachedResult>>>>;

/// Append-only map from fingerprint to result, with a per-key gate.
#[derive(Debug, Default)]
pub struct ResultCache {
    slots: RwLock<HashMap<Fingerprint, Slot>>,
    entries: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    executions: AtomicU64,
}

impl ResultCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored result for `fingerprint`, without waiting on an in-flight
    /// execution.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<CachedResult>> {
        let slot = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .cloned()?;
        let guard = slot.try_lock().ok()?;
        guard.clone()
    }

    /// Return the stored result, or run `execute` exactly once across all
    /// concurrent callers and store its success.
    ///
    /// The boolean is `true` when the result came from the cache.
    ///
    /// # Errors
    ///
    /// Propagates the error of `execute`; nothing is stored in that case.
    pub fn get_or_execute<F>(
        &self,
        fingerprint: Fingerprint,
        execute: F,
    ) -> DocResult<(Arc<CachedResult>, bool)>
    where
        F: FnOnce() -> DocResult<TestResult>,
    {
        let slot = self.slot(fingerprint);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((Arc::clone(cached), true));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.executions.fetch_add(1, Ordering::Relaxed);
        let result = execute()?;
        let cached = Arc::new(CachedResult {
            fingerprint,
            result,
            created_at: Instant::now(),
        });
        *guard = Some(Arc::clone(&cached));
        self.entries.fetch_add(1, Ordering::Relaxed);
        Ok((cached, false))
    }

    fn slot(&self, fingerprint: Fingerprint) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&fingerprint)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(fingerprint).or_default())
    }

    /// Number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from(self.entries.load(Ordering::Relaxed)).unwrap_or(usize::MAX)
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
        }
    }
}
