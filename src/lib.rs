//! # poolhive
//!
//! Reference-counted memory pools and a dependency-scheduled worker hive.
//!
//! ## Features
//!
//! - Pluggable aligned raw allocation ([`RawAllocator`])
//! - [`HeapPool`]: general purpose, any free order
//! - [`StackPool`]: one atomic cursor over a fixed buffer, LIFO frees,
//!   snapshots and reset
//! - [`ChainPool`]: a growing chain of stack chunks, released chunk by chunk
//! - [`Hive`]: fixed worker threads running tasks gated by counting
//!   semaphores, with per-epoch semaphore recycling
//! - Coded diagnostics with optional strict mode
//!
//! ## Quick Start
//!
//! ```rust
//! use poolhive::{Hive, HiveTask, StackPool};
//!
//! let pool = StackPool::system(4096).unwrap();
//! let block = pool.allocate(128, 16).unwrap();
//! unsafe { pool.free(block).unwrap() };
//!
//! let hive = Hive::new(2).unwrap();
//! let ready = hive.new_semaphore(1).unwrap();
//! hive.submit_tasks([
//!     HiveTask::new(|_| println!("load")).signal(&ready),
//!     HiveTask::new(|ctx| println!("use on worker {}", ctx.thread_id())).wait_on(&ready),
//! ]);
//! hive.wait_all();
//! ```

#[macro_use]
mod macros;

pub mod allocators;
pub mod api;
pub mod diagnostics;
pub mod hive;

mod sync;
mod util;

#[cfg(feature = "debug")]
pub mod debug;

// Re-export public API at crate root for convenience
pub use allocators::raw::{
    allocate_aligned, free_aligned, system_allocator, CountingAllocator, RawAllocator,
    SharedRawAllocator, SystemAllocator,
};
pub use api::checkpoint::{RewindGuard, SpeculativeResult, StackSnapshot};
pub use api::config::{
    ChainPoolConfig, ChunkGrowth, FreeMode, HiveConfig, StackPoolConfig, DEFAULT_ALIGNMENT,
    MAX_THREADS,
};
pub use api::error::{HiveError, PoolError};
pub use api::pools::{ChainPool, HeapPool, StackPool};
pub use api::stats::{HiveStats, PoolStats};
pub use api::wrappers::{BlockPool, PoolBox, PoolSlice};

pub use hive::{Hive, HiveSemaphore, HiveTask, TaskContext};

// Diagnostics - core types and predefined codes
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use diagnostics::{set_strict_mode, StrictMode, StrictModeGuard};
pub use diagnostics::{PH001, PH002, PH101, PH102, PH103, PH201, PH301, PH401, PH402, PH403, PH901};

// Size helpers
pub use util::size::{format_bytes, kb, mb};
