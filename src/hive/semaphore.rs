//! Hive semaphores.
//!
//! A semaphore is a `u32` counter living in the hive's semaphore arena. Tasks
//! waiting on it become runnable once it reaches zero; every task naming it
//! as its signal semaphore decrements it on completion.

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::diagnostics::{emit, emit_with_context, PH403, PH901};

use super::HiveShared;

/// Counter gating dependent tasks, valid for one scheduling epoch.
///
/// Clones refer to the same counter. After [`Hive::wait_all`](crate::Hive::wait_all)
/// returns the storage is recycled, and any further use panics.
pub struct HiveSemaphore {
    counter: NonNull<AtomicU32>,
    epoch: u64,
    shared: Arc<HiveShared>,
}

// SAFETY: the counter lives in the semaphore arena owned by `shared`, which this
// handle keeps alive; all access goes through atomics.
unsafe impl Send for HiveSemaphore {}
unsafe impl Sync for HiveSemaphore {}

impl HiveSemaphore {
    pub(crate) fn new(counter: NonNull<AtomicU32>, epoch: u64, shared: Arc<HiveShared>) -> Self {
        Self { counter, epoch, shared }
    }

    /// Current counter value.
    ///
    /// # Panics
    ///
    /// Panics if the semaphore's epoch has ended.
    pub fn value(&self) -> u32 {
        self.check_epoch();
        self.atomic().load(Ordering::Acquire)
    }

    /// Expect one more signalling task.
    ///
    /// # Panics
    ///
    /// Panics if the semaphore's epoch has ended.
    pub fn increase(&self) {
        self.check_epoch();
        self.atomic().fetch_add(1, Ordering::AcqRel);
    }

    /// Epoch this semaphore was created in.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the semaphore's epoch is still open.
    pub fn is_current(&self) -> bool {
        self.epoch == self.shared.epoch()
    }

    pub(crate) fn check_epoch(&self) {
        if !self.is_current() {
            emit(&PH403);
            panic!(
                "[{}] semaphore from epoch {} used in epoch {}",
                PH403.code,
                self.epoch,
                self.shared.epoch()
            );
        }
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<HiveShared>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }

    /// Whether tasks waiting on this semaphore may run. Queue lock held.
    pub(crate) fn is_open(&self) -> bool {
        self.atomic().load(Ordering::Acquire) == 0
    }

    /// Record one completed signaller. Queue lock held.
    pub(crate) fn signal(&self) {
        let result = self
            .atomic()
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
        if result.is_err() {
            emit_with_context(&PH901, "semaphore signalled more often than its count");
        }
    }

    fn atomic(&self) -> &AtomicU32 {
        // SAFETY: the arena buffer outlives `shared`, and the slot was
        // initialized when the semaphore was created.
        unsafe { self.counter.as_ref() }
    }
}

impl Clone for HiveSemaphore {
    fn clone(&self) -> Self {
        Self {
            counter: self.counter,
            epoch: self.epoch,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl PartialEq for HiveSemaphore {
    fn eq(&self, other: &Self) -> bool {
        self.counter == other.counter && self.epoch == other.epoch
    }
}

impl Eq for HiveSemaphore {}

impl fmt::Debug for HiveSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("HiveSemaphore");
        s.field("epoch", &self.epoch);
        if self.is_current() {
            s.field("value", &self.atomic().load(Ordering::Acquire));
        }
        s.finish()
    }
}
