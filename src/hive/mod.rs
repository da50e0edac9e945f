//! Hive - a fixed pool of worker threads running dependency-gated tasks.
//!
//! Tasks are queued in submission order. A worker takes the first task
//! whose wait semaphore is open (absent or zero), runs it without holding
//! the queue lock, then decrements the task's signal semaphore. Semaphores
//! are carved from a small stack pool that is recycled every time
//! [`Hive::wait_all`] drains the queue; that drain closes an *epoch*.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use poolhive::{Hive, HiveTask};
//!
//! let hive = Hive::new(4).unwrap();
//! let sum = Arc::new(AtomicUsize::new(0));
//!
//! // Two producers, then one consumer gated on both.
//! let produced = hive.new_semaphore(2).unwrap();
//! let mut tasks = Vec::new();
//! for i in 1..=2 {
//!     let sum = sum.clone();
//!     tasks.push(HiveTask::new(move |_| { sum.fetch_add(i, Ordering::SeqCst); }).signal(&produced));
//! }
//! let total = sum.clone();
//! tasks.push(HiveTask::new(move |_| assert_eq!(total.load(Ordering::SeqCst), 3)).wait_on(&produced));
//!
//! hive.submit_tasks(tasks);
//! hive.wait_all();
//! ```

mod semaphore;
mod task;
mod worker;

pub use semaphore::HiveSemaphore;
pub use task::{HiveTask, TaskContext};

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::allocators::raw::{system_allocator, SharedRawAllocator};
use crate::api::config::{FreeMode, HiveConfig, StackPoolConfig, MAX_THREADS};
use crate::api::error::HiveError;
use crate::api::pools::StackPool;
use crate::api::stats::HiveStats;
use crate::diagnostics::{emit, emit_with_context, PH401, PH402, PH403};
use crate::sync::atomics::AtomicCounter;
use crate::sync::mutex::{Condvar, Mutex};

/// Queue state guarded by the hive lock.
pub(crate) struct QueueState {
    tasks: VecDeque<HiveTask>,
    /// Submitted and not yet completed, running tasks included
    pending: usize,
    quit: bool,
}

impl QueueState {
    /// Remove the first task whose dependencies are met.
    fn take_ready(&mut self) -> Option<HiveTask> {
        let index = self.tasks.iter().position(HiveTask::is_ready)?;
        self.tasks.remove(index)
    }
}

/// State shared by the hive handle, its workers and its semaphores.
pub(crate) struct HiveShared {
    queue: Mutex<QueueState>,
    /// Wakes workers on new or unblocked tasks and `wait_all` on completion
    wake: Condvar,
    semaphores: StackPool,
    epoch: AtomicU64,
    submitted: AtomicCounter,
    completed: AtomicCounter,
    epochs: AtomicCounter,
}

impl HiveShared {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn new_semaphore(this: &Arc<Self>, initial: u32) -> Result<HiveSemaphore, HiveError> {
        assert!(initial > 0, "hive semaphores must start above zero");

        // The lock keeps the epoch stable against a concurrent wait_all.
        let _queue = this.queue.lock();
        let slot = this.semaphores.alloc::<AtomicU32>()?;
        // SAFETY: the slot is fresh, sized and aligned for an AtomicU32.
        unsafe { slot.as_ptr().write(AtomicU32::new(initial)) };

        Ok(HiveSemaphore::new(slot, this.epoch(), Arc::clone(this)))
    }

    fn submit<I>(this: &Arc<Self>, tasks: I)
    where
        I: IntoIterator<Item = HiveTask>,
    {
        let tasks: Vec<HiveTask> = tasks.into_iter().collect();
        if tasks.is_empty() {
            return;
        }
        for semaphore in tasks.iter().flat_map(HiveTask::semaphores) {
            if !semaphore.belongs_to(this) {
                emit(&PH403);
                panic!("[{}] semaphore belongs to another hive", PH403.code);
            }
            semaphore.check_epoch();
        }

        let count = tasks.len();
        let mut queue = this.queue.lock();
        queue.tasks.extend(tasks);
        queue.pending += count;
        drop(queue);

        this.submitted.add(count as u64);
        this.wake.notify_all();
    }
}

impl Drop for HiveShared {
    fn drop(&mut self) {
        // Semaphores are never freed one by one.
        self.semaphores.reset();
    }
}

/// A pool of worker threads executing [`HiveTask`]s.
///
/// Dropping the hive stops the workers after their current task; tasks
/// still queued are discarded with a `PH402` warning.
pub struct Hive {
    shared: Arc<HiveShared>,
    workers: Vec<JoinHandle<()>>,
}

impl Hive {
    /// Start a hive with `thread_count` workers over the system allocator.
    pub fn new(thread_count: usize) -> Result<Self, HiveError> {
        Self::with_config(HiveConfig::with_threads(thread_count), system_allocator())
    }

    /// Start a hive from a full configuration. Semaphore storage comes from `allocator`.
    pub fn with_config(config: HiveConfig, allocator: SharedRawAllocator) -> Result<Self, HiveError> {
        if config.thread_count == 0 || config.thread_count > MAX_THREADS {
            return Err(HiveError::InvalidThreadCount(config.thread_count));
        }

        let semaphores = StackPool::with_config(
            allocator,
            StackPoolConfig::default()
                .with_capacity(config.semaphore_arena_size)
                .with_alignment(mem::align_of::<AtomicU32>())
                .with_free_mode(FreeMode::Ignore),
        )?;

        let shared = Arc::new(HiveShared {
            queue: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                pending: 0,
                quit: false,
            }),
            wake: Condvar::new(),
            semaphores,
            epoch: AtomicU64::new(0),
            submitted: AtomicCounter::new(0),
            completed: AtomicCounter::new(0),
            epochs: AtomicCounter::new(0),
        });

        let cores = if config.pin_to_cores {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut hive = Self {
            shared,
            workers: Vec::with_capacity(config.thread_count),
        };
        for thread_id in 0..config.thread_count {
            let core = cores.get(thread_id % cores.len().max(1)).copied();
            // On failure, dropping `hive` stops the workers already started.
            let handle = worker::spawn(Arc::clone(&hive.shared), thread_id, core)
                .map_err(HiveError::Spawn)?;
            hive.workers.push(handle);
        }

        ph_debug!(
            "hive started with {} worker(s){}",
            config.thread_count,
            if cores.is_empty() { "" } else { ", pinned" }
        );
        Ok(hive)
    }

    /// Create a semaphore valid until the next [`wait_all`](Self::wait_all).
    ///
    /// # Panics
    ///
    /// Panics if `initial` is zero.
    pub fn new_semaphore(&self, initial: u32) -> Result<HiveSemaphore, HiveError> {
        HiveShared::new_semaphore(&self.shared, initial)
    }

    /// Queue one task with no dependencies.
    pub fn submit_task<F>(&self, callback: F)
    where
        F: FnOnce(&TaskContext<'_>) + Send + 'static,
    {
        self.submit_tasks([HiveTask::new(callback)]);
    }

    /// Queue a batch of tasks.
    ///
    /// # Panics
    ///
    /// Panics if a task names a semaphore from another hive or a closed epoch.
    pub fn submit_tasks<I>(&self, tasks: I)
    where
        I: IntoIterator<Item = HiveTask>,
    {
        HiveShared::submit(&self.shared, tasks);
    }

    /// Block until every submitted task has completed, then close the epoch.
    ///
    /// All semaphores created so far become invalid.
    ///
    /// # Panics
    ///
    /// Panics when called from one of this hive's workers.
    pub fn wait_all(&self) {
        if worker::is_worker_of(&self.shared) {
            emit(&PH401);
            panic!("[{}] wait_all called from a hive worker", PH401.code);
        }

        let mut queue = self.shared.queue.lock();
        while queue.pending != 0 {
            self.shared.wake.wait(&mut queue);
        }

        self.shared.semaphores.reset();
        let closed = self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        self.shared.epochs.increment();
        drop(queue);

        ph_trace!("hive epoch {} closed", closed);
    }

    /// Number of workers.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Tasks submitted and not yet completed.
    pub fn pending_tasks(&self) -> usize {
        self.shared.queue.lock().pending
    }

    /// Current epoch (number of completed `wait_all` calls).
    pub fn epoch(&self) -> u64 {
        self.shared.epoch()
    }

    /// Snapshot of the hive statistics.
    pub fn stats(&self) -> HiveStats {
        HiveStats {
            thread_count: self.thread_count(),
            pending: self.pending_tasks(),
            submitted: self.shared.submitted.get(),
            completed: self.shared.completed.get(),
            epochs: self.shared.epochs.get(),
        }
    }
}

impl Drop for Hive {
    fn drop(&mut self) {
        let mut discarded = {
            let mut queue = self.shared.queue.lock();
            queue.quit = true;
            mem::take(&mut queue.tasks)
        };
        self.shared.wake.notify_all();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                ph_debug!("hive worker panicked");
            }
        }

        // Tasks running at quit time may have queued children since.
        discarded.extend(mem::take(&mut self.shared.queue.lock().tasks));

        // Queued tasks hold semaphores, which hold the shared state.
        let count = discarded.len();
        drop(discarded);

        if count > 0 {
            emit_with_context(&PH402, &format!("{} task(s) never completed", count));
        }
        ph_debug!("hive stopped");
    }
}

impl std::fmt::Debug for Hive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hive")
            .field("thread_count", &self.thread_count())
            .field("epoch", &self.epoch())
            .finish()
    }
}
