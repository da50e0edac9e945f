//! Small helpers shared by the pools.

pub mod layout;
pub mod size;
