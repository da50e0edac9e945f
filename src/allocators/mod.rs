//! Allocation backends.
//!
//! This module contains the pool implementations behind the public handles.
//! **These are the only modules that should contain `unsafe` code**, apart
//! from the hive's semaphore slots.

pub mod raw;

pub(crate) mod chain;
pub(crate) mod heap;
pub(crate) mod stack;
