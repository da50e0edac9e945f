//! Pool and hive configuration.

use crate::util::layout::is_valid_alignment;
use crate::util::size::{kb, mb};

use super::error::PoolError;

/// Default alignment of stack and chain pools.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// Upper bound on hive workers.
pub const MAX_THREADS: usize = 32;

/// What a stack pool does with `free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreeMode {
    /// Frees pop the most recent allocation; anything else is rejected.
    #[default]
    Lifo,
    /// Frees only update the live count; memory comes back on reset.
    Ignore,
}

/// Configuration for a stack pool.
#[derive(Debug, Clone)]
pub struct StackPoolConfig {
    /// Buffer size in bytes (rounded up to `alignment`, default: 1 MB)
    pub capacity: usize,

    /// Alignment of every allocation (default: 16)
    pub alignment: usize,

    /// Free behavior
    pub free_mode: FreeMode,
}

impl Default for StackPoolConfig {
    fn default() -> Self {
        Self {
            capacity: mb(1),
            alignment: DEFAULT_ALIGNMENT,
            free_mode: FreeMode::Lifo,
        }
    }
}

impl StackPoolConfig {
    /// Create a minimal config for testing or constrained environments.
    pub fn minimal() -> Self {
        Self {
            capacity: kb(4),
            ..Self::default()
        }
    }

    /// Builder pattern: set capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builder pattern: set alignment.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Builder pattern: set free mode.
    pub fn with_free_mode(mut self, free_mode: FreeMode) -> Self {
        self.free_mode = free_mode;
        self
    }
}

/// How the next chain chunk is sized from the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkGrowth {
    /// Every chunk has the initial size.
    Fixed,
    /// Previous size plus a step.
    Add(usize),
    /// Previous size times a step.
    Multiply(usize),
}

impl ChunkGrowth {
    /// Nominal size of the chunk after one of `previous` bytes, clamped to `max`.
    pub fn next(&self, previous: usize, initial: usize, max: usize) -> usize {
        let grown = match *self {
            ChunkGrowth::Fixed => initial,
            ChunkGrowth::Add(step) => previous.saturating_add(step),
            ChunkGrowth::Multiply(step) => previous.saturating_mul(step),
        };
        grown.min(max)
    }
}

/// Configuration for a chain pool.
#[derive(Debug, Clone)]
pub struct ChainPoolConfig {
    /// Size of the first chunk (default: 64 KB)
    pub initial_chunk_size: usize,

    /// Largest size growth may reach (default: 4 MB)
    pub max_chunk_size: usize,

    /// Growth policy (default: doubling)
    pub growth: ChunkGrowth,

    /// Alignment of every allocation (default: 16)
    pub alignment: usize,
}

impl Default for ChainPoolConfig {
    fn default() -> Self {
        Self {
            initial_chunk_size: kb(64),
            max_chunk_size: mb(4),
            growth: ChunkGrowth::Multiply(2),
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl ChainPoolConfig {
    /// Chunks of one fixed size.
    pub fn fixed(chunk_size: usize) -> Self {
        Self {
            initial_chunk_size: chunk_size,
            max_chunk_size: chunk_size,
            growth: ChunkGrowth::Fixed,
            alignment: DEFAULT_ALIGNMENT,
        }
    }

    /// Builder pattern: set the chunk size range.
    pub fn with_chunk_sizes(mut self, initial: usize, max: usize) -> Self {
        self.initial_chunk_size = initial;
        self.max_chunk_size = max;
        self
    }

    /// Builder pattern: set the growth policy.
    pub fn with_growth(mut self, growth: ChunkGrowth) -> Self {
        self.growth = growth;
        self
    }

    /// Builder pattern: set alignment.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Check the parameters for consistency.
    pub fn validate(&self) -> Result<(), PoolError> {
        if !is_valid_alignment(self.alignment) {
            return Err(PoolError::InvalidConfig("alignment must be a non-zero power of two"));
        }
        if self.initial_chunk_size == 0 {
            return Err(PoolError::InvalidConfig("initial chunk size must be non-zero"));
        }

        match self.growth {
            ChunkGrowth::Fixed => {
                if self.initial_chunk_size != self.max_chunk_size {
                    return Err(PoolError::InvalidConfig(
                        "fixed growth needs initial and max chunk sizes to match",
                    ));
                }
            }
            ChunkGrowth::Add(step) | ChunkGrowth::Multiply(step) => {
                if self.initial_chunk_size >= self.max_chunk_size {
                    return Err(PoolError::InvalidConfig(
                        "growing chains need an initial chunk size below the max",
                    ));
                }
                if step == 0 {
                    return Err(PoolError::InvalidConfig("growth step must be non-zero"));
                }
                if matches!(self.growth, ChunkGrowth::Multiply(1)) {
                    return Err(PoolError::InvalidConfig("multiplicative growth step must be at least 2"));
                }
            }
        }

        Ok(())
    }
}

/// Configuration for the hive.
#[derive(Debug, Clone)]
pub struct HiveConfig {
    /// Worker threads (default: logical CPUs, clamped to 1..=32)
    pub thread_count: usize,

    /// Pin worker N to core N (best effort)
    pub pin_to_cores: bool,

    /// Bytes reserved for semaphores per epoch (default: 64 KB)
    pub semaphore_arena_size: usize,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            thread_count: num_cpus::get().clamp(1, MAX_THREADS),
            pin_to_cores: false,
            semaphore_arena_size: kb(64),
        }
    }
}

impl HiveConfig {
    /// Config with an explicit worker count.
    pub fn with_threads(thread_count: usize) -> Self {
        Self {
            thread_count,
            ..Self::default()
        }
    }

    /// Builder pattern: enable core pinning.
    pub fn with_pinning(mut self, pin: bool) -> Self {
        self.pin_to_cores = pin;
        self
    }

    /// Builder pattern: set the semaphore arena size.
    pub fn with_semaphore_arena_size(mut self, size: usize) -> Self {
        self.semaphore_arena_size = size;
        self
    }
}
