//! Debug utilities for pool memory.
//!
//! Only compiled when the `debug` feature is enabled.

pub mod poison;
