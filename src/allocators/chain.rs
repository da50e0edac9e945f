//! Chain pool backend - a growing list of stack arenas.
//!
//! New allocations go to the newest chunk. When it runs dry a bigger one is
//! appended according to the growth policy. A chunk is released as soon as
//! the last block taken from it is freed.

use std::ptr::NonNull;

use crate::allocators::raw::SharedRawAllocator;
use crate::allocators::stack::{StackArena, HEADER_BYTES};
use crate::api::config::ChainPoolConfig;
use crate::api::error::PoolError;
use crate::diagnostics::{emit, emit_with_context, PH101, PH301, PH901};
use crate::sync::atomics::{AtomicCounter, AtomicGauge};
use crate::sync::mutex::Mutex;
use crate::util::layout::align_up;

/// One arena in the chain.
struct Chunk {
    /// Backing arena
    arena: StackArena,

    /// Size the growth policy asked for (the arena adds header slack)
    nominal: usize,

    /// Blocks handed out from this chunk and not yet freed
    allocation_count: usize,
}

/// Chain state guarded by the pool lock. Oldest chunk first; the last one is the tail.
#[derive(Default)]
struct ChainState {
    chunks: Vec<Chunk>,
}

/// Implementation object shared by every `ChainPool` handle.
pub(crate) struct ChainCore {
    /// Backing allocator for chunk buffers
    allocator: SharedRawAllocator,

    /// Growth parameters
    config: ChainPoolConfig,

    /// Aligned per-block header size
    header_size: usize,

    /// Chunk list
    state: Mutex<ChainState>,

    /// High-water mark of bytes in use
    peak_bytes: AtomicGauge,

    /// Successful allocations
    total_allocations: AtomicCounter,

    /// Failed allocations
    failed_allocations: AtomicCounter,

    /// Chunks created over the pool's lifetime
    chunks_created: AtomicCounter,
}

impl ChainCore {
    /// Build an empty chain. No memory is reserved until the first allocation.
    pub fn new(allocator: SharedRawAllocator, config: ChainPoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        Ok(Self {
            allocator,
            header_size: align_up(HEADER_BYTES, config.alignment),
            config,
            state: Mutex::new(ChainState::default()),
            peak_bytes: AtomicGauge::new(0),
            total_allocations: AtomicCounter::new(0),
            failed_allocations: AtomicCounter::new(0),
            chunks_created: AtomicCounter::new(0),
        })
    }

    /// Nominal size of the next chunk for a request of `size` bytes.
    fn next_chunk_size(&self, state: &ChainState, size: usize) -> usize {
        let grown = match state.chunks.last() {
            Some(tail) => self.config.growth.next(
                tail.nominal,
                self.config.initial_chunk_size,
                self.config.max_chunk_size,
            ),
            None => self.config.initial_chunk_size,
        };
        grown.max(size)
    }

    /// Allocate `size` bytes.
    pub fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        let mut state = self.state.lock();

        if let Some(tail) = state.chunks.last_mut() {
            match tail.arena.allocate(size, alignment) {
                Ok(ptr) => {
                    tail.allocation_count += 1;
                    self.record_alloc(&state);
                    return Ok(ptr);
                }
                Err(PoolError::Exhausted { .. }) => {}
                Err(err) => {
                    self.failed_allocations.increment();
                    return Err(err);
                }
            }
        }

        let nominal = self.next_chunk_size(&state, size);
        let arena = nominal
            .checked_add(self.header_size)
            .ok_or(PoolError::OutOfMemory { size: nominal, alignment: self.config.alignment })
            .and_then(|capacity| {
                StackArena::new(self.allocator.clone(), capacity, self.config.alignment)
            })
            .map_err(|err| {
                self.failed_allocations.increment();
                err
            })?;

        let ptr = arena.allocate(size, alignment).map_err(|err| {
            emit_with_context(&PH901, "fresh chain chunk cannot hold the request");
            self.failed_allocations.increment();
            err
        })?;

        ph_debug!(
            "chain pool: chunk #{} of {} bytes ({} live)",
            self.chunks_created.get() + 1,
            arena.capacity(),
            state.chunks.len() + 1
        );

        state.chunks.push(Chunk {
            arena,
            nominal,
            allocation_count: 1,
        });
        self.chunks_created.increment();
        self.record_alloc(&state);

        Ok(ptr)
    }

    fn record_alloc(&self, state: &ChainState) {
        self.total_allocations.increment();
        self.peak_bytes.update_max(Self::bytes_in_use(state));
    }

    /// Release a block, dropping its chunk once the chunk is empty.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this chain and not have been freed
    /// since the last reset.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        let mut state = self.state.lock();

        let Some(idx) = state.chunks.iter().position(|c| c.arena.contains(ptr.as_ptr())) else {
            drop(state);
            emit(&PH101);
            panic!("[{}] pointer {:p} was not allocated by this chain pool", PH101.code, ptr);
        };

        let chunk = &mut state.chunks[idx];
        assert!(chunk.allocation_count > 0, "[{}] chunk allocation count underflow", PH901.code);

        // Hand the space back if this was the chunk's newest block.
        let _ = chunk.arena.pop(ptr);
        chunk.allocation_count -= 1;

        if chunk.allocation_count == 0 {
            let chunk = state.chunks.remove(idx);
            ph_debug!(
                "chain pool: released chunk of {} bytes ({} live)",
                chunk.arena.capacity(),
                state.chunks.len()
            );
            drop(chunk);
        }
    }

    /// Release every chunk, invalidating all allocations.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        ph_trace!("chain pool: reset, dropping {} chunks", state.chunks.len());
        state.chunks.clear();
    }

    fn bytes_in_use(state: &ChainState) -> usize {
        state.chunks.iter().map(|c| c.arena.top()).sum()
    }

    /// Bytes consumed across all chunks, headers included.
    pub fn allocated_bytes(&self) -> usize {
        Self::bytes_in_use(&self.state.lock())
    }

    /// Live allocations across all chunks.
    pub fn allocation_count(&self) -> usize {
        self.state.lock().chunks.iter().map(|c| c.allocation_count).sum()
    }

    /// Bytes reserved across all chunks.
    pub fn capacity(&self) -> usize {
        self.state.lock().chunks.iter().map(|c| c.arena.capacity()).sum()
    }

    /// Number of live chunks.
    pub fn chunk_count(&self) -> usize {
        self.state.lock().chunks.len()
    }

    /// Nominal sizes of the live chunks, oldest first.
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.state.lock().chunks.iter().map(|c| c.nominal).collect()
    }

    /// Growth parameters.
    pub fn config(&self) -> &ChainPoolConfig {
        &self.config
    }

    /// High-water mark of bytes in use.
    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes.get()
    }

    /// Successful allocations over the pool's lifetime.
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations.get()
    }

    /// Failed allocations over the pool's lifetime.
    pub fn failed_allocations(&self) -> u64 {
        self.failed_allocations.get()
    }

    /// Chunks created over the pool's lifetime.
    pub fn chunks_created(&self) -> u64 {
        self.chunks_created.get()
    }
}

impl Drop for ChainCore {
    fn drop(&mut self) {
        if self.allocation_count() != 0 {
            emit_with_context(&PH301, "chain pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::raw::system_allocator;
    use crate::api::config::ChunkGrowth;

    fn chain(config: ChainPoolConfig) -> ChainCore {
        ChainCore::new(system_allocator(), config).unwrap()
    }

    #[test]
    fn test_first_allocation_creates_chunk() {
        let chain = chain(ChainPoolConfig::fixed(256));
        assert_eq!(chain.chunk_count(), 0);

        let p = chain.allocate(32, 16).unwrap();
        assert_eq!(chain.chunk_count(), 1);
        assert_eq!(chain.chunk_sizes(), vec![256]);

        unsafe { chain.free(p) };
        assert_eq!(chain.chunk_count(), 0);
    }

    #[test]
    fn test_additive_growth() {
        let config = ChainPoolConfig::default()
            .with_chunk_sizes(128, 400)
            .with_growth(ChunkGrowth::Add(128));
        let chain = chain(config);

        let mut ptrs = Vec::new();
        for _ in 0..7 {
            ptrs.push(chain.allocate(100, 16).unwrap());
        }

        // Each 100-byte request takes a 128-byte block: one fits the first
        // chunk, two the second, three the third, and the max clamps the fourth.
        assert_eq!(chain.chunk_sizes(), vec![128, 256, 384, 400]);

        for p in ptrs {
            unsafe { chain.free(p) };
        }
        assert_eq!(chain.chunk_count(), 0);
        assert_eq!(chain.chunks_created(), 4);
    }

    #[test]
    fn test_oversized_request_gets_own_chunk() {
        let chain = chain(ChainPoolConfig::default().with_chunk_sizes(64, 256));

        let p = chain.allocate(1000, 16).unwrap();
        assert_eq!(chain.chunk_sizes(), vec![1000]);
        unsafe { chain.free(p) };
    }

    #[test]
    fn test_reset_drops_chunks() {
        let chain = chain(ChainPoolConfig::fixed(128));
        let _ = chain.allocate(64, 16).unwrap();
        let _ = chain.allocate(64, 16).unwrap();
        assert_eq!(chain.chunk_count(), 2);

        chain.reset();
        assert_eq!(chain.chunk_count(), 0);
        assert_eq!(chain.allocated_bytes(), 0);
        assert_eq!(chain.allocation_count(), 0);
    }
}
