//! Worker threads.

use std::cell::Cell;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use core_affinity::CoreId;

use super::task::TaskContext;
use super::HiveShared;

thread_local! {
    /// Address of the hive this thread works for, 0 on other threads.
    static CURRENT_HIVE: Cell<usize> = Cell::new(0);
}

/// Whether the calling thread is one of `shared`'s workers.
pub(crate) fn is_worker_of(shared: &Arc<HiveShared>) -> bool {
    let id = Arc::as_ptr(shared) as usize;
    CURRENT_HIVE.with(|current| current.get() == id)
}

/// Start worker `thread_id`, optionally pinned to `core`.
pub(crate) fn spawn(
    shared: Arc<HiveShared>,
    thread_id: usize,
    core: Option<CoreId>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("hive-worker-{}", thread_id))
        .spawn(move || run(shared, thread_id, core))
}

fn run(shared: Arc<HiveShared>, thread_id: usize, core: Option<CoreId>) {
    if let Some(core) = core {
        if !core_affinity::set_for_current(core) {
            ph_debug!("hive worker {} could not be pinned to core {}", thread_id, core.id);
        }
    }
    CURRENT_HIVE.with(|current| current.set(Arc::as_ptr(&shared) as usize));
    ph_debug!("hive worker {} started", thread_id);

    let mut queue = shared.queue.lock();
    loop {
        if queue.quit {
            break;
        }

        let Some(task) = queue.take_ready() else {
            shared.wake.wait(&mut queue);
            continue;
        };
        drop(queue);

        let (callback, signal) = task.into_parts();
        callback(&TaskContext::new(&shared, thread_id, signal.as_ref()));

        queue = shared.queue.lock();
        if let Some(semaphore) = &signal {
            semaphore.signal();
        }
        queue.pending -= 1;
        shared.completed.increment();
        shared.wake.notify_all();
    }
    drop(queue);

    CURRENT_HIVE.with(|current| current.set(0));
    ph_debug!("hive worker {} stopped", thread_id);
}
