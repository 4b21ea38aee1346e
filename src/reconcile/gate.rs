// src/reconcile/gate.rs

//! Tree-wide suspend/resume gate.
//!
//! A reconciliation pass holds the gate exclusively from before indexing
//! until the pass completes. Snapshot readers (dumps, view refreshes,
//! connector lookups from outside the pass) hold it shared, so they never
//! observe a half-merged registry or a half-swapped parent link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

#[derive(Debug, Default)]
pub struct ConcurrencyGate {
    lock: RwLock<()>,
    suspended: AtomicBool,
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend snapshot readers until the returned guard is dropped.
    pub fn suspend(&self) -> GateGuard<'_> {
        // A panicking pass poisons the lock; the gate itself holds no data.
        let guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        self.suspended.store(true, Ordering::Release);
        trace!("concurrency gate suspended");
        GateGuard {
            _guard: guard,
            suspended: &self.suspended,
        }
    }

    /// Shared access for readers that must not race a pass.
    pub fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Non-blocking shared access; `None` while a pass is running.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, ()>> {
        self.lock.try_read().ok()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }
}

/// Exclusive hold on the gate; resumes readers on drop, whatever the outcome
/// of the pass.
#[derive(Debug)]
pub struct GateGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
    suspended: &'a AtomicBool,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.suspended.store(false, Ordering::Release);
        trace!("concurrency gate released");
    }
}
