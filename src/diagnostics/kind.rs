//! Diagnostic kinds and core types.
//!
//! Mirrors rustc's diagnostic levels for familiar UX.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong or suboptimal.
    Warning,
    /// Additional context about another diagnostic.
    Note,
    /// Actionable suggestion to fix the issue.
    Help,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
            DiagnosticKind::Help => "help",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `PH0xx` - Backing memory and exhaustion
/// - `PH1xx` - Stack/chain pool misuse
/// - `PH2xx` - Heap pool integrity
/// - `PH3xx` - Leaks
/// - `PH4xx` - Hive scheduling
/// - `PH9xx` - Internal errors
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "PH001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[poolhive][{}] {}: {}", self.code, self.kind.prefix(), self.message)
    }
}

// =============================================================================
// Predefined diagnostics (PH0xx - Backing memory)
// =============================================================================

/// PH001: The raw allocator could not provide memory.
pub const PH001: Diagnostic = Diagnostic::error(
    "PH001",
    "raw aligned allocation failed"
).with_note("the backing allocator returned no memory")
 .with_help("reduce pool capacities or check the injected RawAllocator");

/// PH002: Stack pool exhausted.
pub const PH002: Diagnostic = Diagnostic::warning(
    "PH002",
    "stack pool exhausted, allocation failed"
).with_note("the pool cursor would pass the end of its buffer")
 .with_help("increase the stack pool capacity, reset it more often, or use a ChainPool");

// =============================================================================
// Predefined diagnostics (PH1xx - Stack/chain misuse)
// =============================================================================

/// PH101: Free of a pointer this pool never handed out.
pub const PH101: Diagnostic = Diagnostic::error(
    "PH101",
    "pointer does not belong to this pool"
).with_note("the address lies outside every buffer owned by the pool")
 .with_help("free memory through the same pool that allocated it");

/// PH102: Stack free not in LIFO order.
pub const PH102: Diagnostic = Diagnostic::warning(
    "PH102",
    "stack pool free out of LIFO order"
).with_note("the block stays unusable until the pool is reset or rewound")
 .with_help("free stack allocations in reverse order, or use FreeMode::Ignore");

/// PH103: Rewind to a snapshot that does not belong to this pool.
pub const PH103: Diagnostic = Diagnostic::error(
    "PH103",
    "rewind to a snapshot taken from another pool"
).with_help("only rewind a pool with snapshots it produced");

// =============================================================================
// Predefined diagnostics (PH2xx - Heap integrity)
// =============================================================================

/// PH201: Heap block header signature mismatch.
pub const PH201: Diagnostic = Diagnostic::error(
    "PH201",
    "heap pool signature mismatch on free"
).with_note("the block header was overwritten or the pointer came from another pool")
 .with_help("check for buffer underruns and cross-pool frees");

// =============================================================================
// Predefined diagnostics (PH3xx - Leaks)
// =============================================================================

/// PH301: Pool dropped with live allocations.
pub const PH301: Diagnostic = Diagnostic::warning(
    "PH301",
    "memory pool destroyed before all memory was released"
).with_note("outstanding pointers from this pool are now dangling")
 .with_help("free every allocation before dropping the last pool handle");

// =============================================================================
// Predefined diagnostics (PH4xx - Hive)
// =============================================================================

/// PH401: wait_all called from a worker.
pub const PH401: Diagnostic = Diagnostic::error(
    "PH401",
    "Hive::wait_all called from one of the hive's own workers"
).with_note("the worker would wait on tasks that only workers can drain")
 .with_help("submit follow-up tasks with semaphores instead of blocking inside a task");

/// PH402: Hive dropped with pending tasks.
pub const PH402: Diagnostic = Diagnostic::warning(
    "PH402",
    "hive shut down with pending tasks"
).with_note("queued tasks that had not started are discarded")
 .with_help("call wait_all() before dropping the hive");

/// PH403: Semaphore used after its epoch ended.
pub const PH403: Diagnostic = Diagnostic::error(
    "PH403",
    "hive semaphore used outside the epoch it was created in"
).with_note("semaphore storage is recycled when wait_all() returns")
 .with_help("create new semaphores for every batch submitted after wait_all()");

// =============================================================================
// Predefined diagnostics (PH9xx - Internal)
// =============================================================================

/// PH901: Internal error.
pub const PH901: Diagnostic = Diagnostic::error(
    "PH901",
    "internal pool error"
).with_note("this indicates a bug in poolhive");
