//! Public API for poolhive.
//!
//! This module contains the user-facing pool handles and the types they
//! share with the hive.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod pools;
pub mod stats;
pub mod wrappers;
