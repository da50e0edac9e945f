//! Diagnostics reported through an installed sink.
//!
//! Lives in its own test binary: the sink is process-wide, so everything
//! that emits runs inside a single test.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use poolhive::diagnostics::{self, CollectingSink};
use poolhive::{ChainPool, ChainPoolConfig, DiagnosticKind, Hive, HiveTask, StackPool};

fn codes(sink: &CollectingSink) -> Vec<&'static str> {
    sink.drain().iter().map(|d| d.code).collect()
}

#[test]
fn test_sink_collects_pool_and_hive_diagnostics() {
    let sink = Arc::new(CollectingSink::new());
    diagnostics::set_sink(Some(sink.clone()));

    // Stack pool exhausted
    let pool = StackPool::system(64).unwrap();
    assert!(pool.allocate(128, 8).is_err());
    assert_eq!(codes(&sink), vec!["PH002"]);

    // Out-of-order free
    let a = pool.allocate(8, 8).unwrap();
    let _b = pool.allocate(8, 8).unwrap();
    assert!(unsafe { pool.free(a) }.is_err());
    let drained = sink.drain();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].code, "PH102");
    assert_eq!(drained[0].kind, DiagnosticKind::Warning);

    // Dropped with a live block
    drop(pool);
    assert_eq!(codes(&sink), vec!["PH301"]);

    let chain = ChainPool::system(ChainPoolConfig::fixed(1024)).unwrap();
    chain.allocate(64, 8).unwrap();
    drop(chain);
    assert_eq!(codes(&sink), vec!["PH301"]);

    // Clean teardown stays quiet
    let pool = StackPool::system(1024).unwrap();
    pool.allocate(64, 8).unwrap();
    pool.reset();
    drop(pool);
    assert!(sink.is_empty());

    // Hive dropped with a task that can never run
    let hive = Hive::new(1).unwrap();
    let never = hive.new_semaphore(1).unwrap();
    hive.submit_tasks([HiveTask::new(|_| unreachable!()).wait_on(&never)]);
    assert_eq!(hive.pending_tasks(), 1);
    drop(never);
    drop(hive);
    assert_eq!(codes(&sink), vec!["PH402"]);

    // A task still running at drop completes, so nothing is discarded
    let hive = Hive::new(1).unwrap();
    let (started_tx, started) = mpsc::channel();
    hive.submit_task(move |_| {
        started_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(50));
    });
    started.recv().unwrap();
    drop(hive);
    assert!(sink.is_empty());

    // Suppressed diagnostics reach no sink
    diagnostics::suppress_diagnostics(true);
    assert!(diagnostics::emit::is_suppressed());
    let pool = StackPool::system(64).unwrap();
    assert!(pool.allocate(128, 8).is_err());
    assert!(sink.is_empty());
    diagnostics::suppress_diagnostics(false);
    assert!(pool.allocate(128, 8).is_err());
    assert_eq!(codes(&sink), vec!["PH002"]);
    drop(pool);

    diagnostics::set_sink(None);
    let pool = StackPool::system(64).unwrap();
    assert!(pool.allocate(128, 8).is_err());
    assert!(sink.is_empty());
}
