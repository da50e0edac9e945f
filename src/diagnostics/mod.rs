//! Runtime diagnostics.
//!
//! This module provides:
//! - **Runtime diagnostics**: pool- and hive-aware messages with codes
//! - **Sinks**: route diagnostics to custom collectors
//! - **Strict mode**: optional panic-on-error for CI
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                        |
//! |-------|--------------------------------|
//! | PH0xx | Backing memory / exhaustion    |
//! | PH1xx | Stack/chain pool misuse        |
//! | PH2xx | Heap pool integrity            |
//! | PH3xx | Leaks                          |
//! | PH4xx | Hive scheduling                |
//! | PH9xx | Internal errors                |
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use poolhive::diagnostics::{self, CollectingSink};
//!
//! let sink = Arc::new(CollectingSink::new());
//! diagnostics::set_sink(Some(sink.clone()));
//! diagnostics::emit(&poolhive::PH102);
//! diagnostics::set_sink(None);
//! ```

pub mod emit;
pub mod kind;
pub mod strict;

pub use emit::{emit, emit_with_context, set_sink, suppress_diagnostics, CollectingSink, DiagnosticSink};
pub use kind::{Diagnostic, DiagnosticKind};
pub use strict::{init_from_env, set_strict_mode, strict_mode, StrictMode, StrictModeGuard};

pub use kind::{PH001, PH002, PH101, PH102, PH103, PH201, PH301, PH401, PH402, PH403, PH901};
