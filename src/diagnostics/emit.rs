//! Diagnostic emission backend.
//!
//! Routes diagnostics to the `log` crate (when enabled), to stderr in debug
//! builds, and to an optional process-wide sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crossbeam_queue::SegQueue;

use super::kind::{Diagnostic, DiagnosticKind};
use super::strict::{should_panic, should_panic_on_warning};

/// Global flag to suppress diagnostic output (for testing).
static DIAGNOSTICS_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// Installed sink, if any.
static SINK: RwLock<Option<Arc<dyn DiagnosticSink>>> = RwLock::new(None);

/// Suppress all diagnostic output.
pub fn suppress_diagnostics(suppress: bool) {
    DIAGNOSTICS_SUPPRESSED.store(suppress, Ordering::Relaxed);
}

/// Check if diagnostics are suppressed.
pub fn is_suppressed() -> bool {
    DIAGNOSTICS_SUPPRESSED.load(Ordering::Relaxed)
}

/// Install a sink that receives every emitted diagnostic.
///
/// Passing `None` removes the current sink.
pub fn set_sink(sink: Option<Arc<dyn DiagnosticSink>>) {
    if let Ok(mut slot) = SINK.write() {
        *slot = sink;
    }
}

/// Emit a diagnostic.
pub fn emit(diag: &Diagnostic) {
    emit_inner(diag, None);
}

/// Emit a diagnostic with additional runtime context.
pub fn emit_with_context(diag: &Diagnostic, context: &str) {
    emit_inner(diag, Some(context));
}

fn emit_inner(diag: &Diagnostic, context: Option<&str>) {
    if is_suppressed() {
        return;
    }

    #[cfg(feature = "log")]
    emit_to_log(diag, context);

    #[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
    emit_to_stderr(diag, context);

    if let Ok(slot) = SINK.read() {
        if let Some(sink) = slot.as_ref() {
            sink.emit(diag);
        }
    }

    let fatal = match diag.kind {
        DiagnosticKind::Error => should_panic(),
        DiagnosticKind::Warning => should_panic_on_warning(),
        _ => false,
    };

    if fatal {
        match context {
            Some(context) => panic!(
                "{}\nContext: {}\nStrict mode enabled - diagnostics are fatal.",
                diag, context
            ),
            None => panic!("{}\nStrict mode enabled - diagnostics are fatal.", diag),
        }
    }
}

/// Internal: emit through the log crate.
#[cfg(feature = "log")]
fn emit_to_log(diag: &Diagnostic, context: Option<&str>) {
    let level = match diag.kind {
        DiagnosticKind::Error => log::Level::Error,
        DiagnosticKind::Warning => log::Level::Warn,
        DiagnosticKind::Note | DiagnosticKind::Help => log::Level::Info,
    };

    match context {
        Some(context) => log::log!(level, "[{}] {} ({})", diag.code, diag.message, context),
        None => log::log!(level, "[{}] {}", diag.code, diag.message),
    }

    if let Some(note) = diag.note {
        log::debug!("  note: {}", note);
    }
    if let Some(help) = diag.help {
        log::debug!("  help: {}", help);
    }
}

/// Internal: emit to stderr.
#[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
fn emit_to_stderr(diag: &Diagnostic, context: Option<&str>) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "{}", diag);

    if let Some(context) = context {
        let _ = writeln!(stderr, "  context: {}", context);
    }
    if let Some(note) = diag.note {
        let _ = writeln!(stderr, "  note: {}", note);
    }
    if let Some(help) = diag.help {
        let _ = writeln!(stderr, "  help: {}", help);
    }

    let _ = writeln!(stderr);
}

/// A diagnostic sink trait for custom output.
pub trait DiagnosticSink: Send + Sync {
    /// Handle a diagnostic.
    fn emit(&self, diag: &Diagnostic);
}

/// A sink that collects diagnostics, safe to feed from many threads at once.
#[derive(Default)]
pub struct CollectingSink {
    diagnostics: SegQueue<Diagnostic>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every collected diagnostic.
    pub fn drain(&self) -> Vec<Diagnostic> {
        let mut out = Vec::with_capacity(self.diagnostics.len());
        while let Some(diag) = self.diagnostics.pop() {
            out.push(diag);
        }
        out
    }

    /// Number of diagnostics waiting to be drained.
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Check if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diag: &Diagnostic) {
        self.diagnostics.push(diag.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::kind::{PH001, PH102};

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.emit(&PH001);
        sink.emit(&PH102);

        assert_eq!(sink.len(), 2);

        let drained = sink.drain();
        assert_eq!(drained[0].code, "PH001");
        assert_eq!(drained[1].kind, DiagnosticKind::Warning);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_collecting_sink_from_threads() {
        let sink = Arc::new(CollectingSink::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        sink.emit(&PH102);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sink.drain().len(), 100);
    }
}
