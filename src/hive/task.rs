//! Tasks and the context handed to running callbacks.

use std::fmt;
use std::sync::Arc;

use crate::api::error::HiveError;

use super::semaphore::HiveSemaphore;
use super::HiveShared;

type Callback = Box<dyn FnOnce(&TaskContext<'_>) + Send + 'static>;

/// A unit of work for the hive.
///
/// A task runs once its wait semaphore (if any) has reached zero, and
/// decrements its signal semaphore (if any) after the callback returns.
///
/// # Example
///
/// ```rust
/// use poolhive::{Hive, HiveTask};
///
/// let hive = Hive::new(2).unwrap();
/// let done = hive.new_semaphore(1).unwrap();
///
/// hive.submit_tasks([
///     HiveTask::new(|_| println!("second")).wait_on(&done),
///     HiveTask::new(|_| println!("first")).signal(&done),
/// ]);
/// hive.wait_all();
/// ```
pub struct HiveTask {
    callback: Callback,
    wait: Option<HiveSemaphore>,
    signal: Option<HiveSemaphore>,
}

impl HiveTask {
    /// Wrap a callback with no dependencies.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(&TaskContext<'_>) + Send + 'static,
    {
        Self {
            callback: Box::new(callback),
            wait: None,
            signal: None,
        }
    }

    /// Hold the task back until `semaphore` reaches zero.
    pub fn wait_on(mut self, semaphore: &HiveSemaphore) -> Self {
        self.wait = Some(semaphore.clone());
        self
    }

    /// Decrement `semaphore` once the task has run.
    pub fn signal(mut self, semaphore: &HiveSemaphore) -> Self {
        self.signal = Some(semaphore.clone());
        self
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.wait.as_ref().map_or(true, HiveSemaphore::is_open)
    }

    pub(crate) fn semaphores(&self) -> impl Iterator<Item = &HiveSemaphore> {
        self.wait.iter().chain(self.signal.iter())
    }

    pub(crate) fn into_parts(self) -> (Callback, Option<HiveSemaphore>) {
        (self.callback, self.signal)
    }
}

impl fmt::Debug for HiveTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HiveTask")
            .field("wait", &self.wait)
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}

/// What a running callback can reach: its worker, its signal semaphore and
/// the hive, for submitting follow-up work.
pub struct TaskContext<'a> {
    shared: &'a Arc<HiveShared>,
    thread_id: usize,
    signal: Option<&'a HiveSemaphore>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        shared: &'a Arc<HiveShared>,
        thread_id: usize,
        signal: Option<&'a HiveSemaphore>,
    ) -> Self {
        Self { shared, thread_id, signal }
    }

    /// Index of the worker running this task (`0..thread_count`).
    pub fn thread_id(&self) -> usize {
        self.thread_id
    }

    /// The semaphore this task signals on completion, if any.
    pub fn signal_semaphore(&self) -> Option<&HiveSemaphore> {
        self.signal
    }

    /// Create a semaphore in the current epoch.
    pub fn new_semaphore(&self, initial: u32) -> Result<HiveSemaphore, HiveError> {
        HiveShared::new_semaphore(self.shared, initial)
    }

    /// Queue one more task.
    pub fn submit_task<F>(&self, callback: F)
    where
        F: FnOnce(&TaskContext<'_>) + Send + 'static,
    {
        self.submit_tasks([HiveTask::new(callback)]);
    }

    /// Queue a batch of tasks.
    pub fn submit_tasks<I>(&self, tasks: I)
    where
        I: IntoIterator<Item = HiveTask>,
    {
        HiveShared::submit(self.shared, tasks);
    }
}

impl fmt::Debug for TaskContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("thread_id", &self.thread_id)
            .field("signal", &self.signal)
            .finish()
    }
}
