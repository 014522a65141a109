//! Recorded structural violations.
//!
//! Tolerant parsing keeps going past violations; each one is recorded here
//! and emitted through `log` at the level chosen by [`Verbosity`].

use crate::parser_config::Verbosity;

/// One recovered violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Byte offset in the source, when known
    pub offset: Option<usize>,
    /// Human-readable description
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "at byte {}: {}", offset, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Ordered list of diagnostics produced while reading a document.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    verbosity: Verbosity,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection emitting at `verbosity`.
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            entries: Vec::new(),
        }
    }

    /// Record a violation.
    pub fn record(&mut self, offset: Option<usize>, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            offset,
            message: message.into(),
        };
        match self.verbosity {
            Verbosity::Quiet => log::debug!("recovered: {}", diagnostic),
            Verbosity::Verbose => log::warn!("recovered: {}", diagnostic),
        }
        self.entries.push(diagnostic);
    }

    /// Number of recorded violations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the recorded violations in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }
}
