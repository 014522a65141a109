//! Parser configuration.
//!
//! Options are an explicit value passed to [`Document::read`](crate::Document::read);
//! nothing about parsing is configured through process-wide state.
//!
//! # Example
//!
//! ```
//! use pdf_seal::parser_config::{ParserOptions, Verbosity};
//!
//! let strict = ParserOptions::strict();
//! assert!(strict.strict);
//!
//! let quiet = ParserOptions::lenient().with_verbosity(Verbosity::Quiet);
//! assert_eq!(quiet.verbosity, Verbosity::Quiet);
//! ```

/// How loudly recovered violations are reported.
///
/// Verbosity only selects the log level diagnostics are emitted at; parsed
/// values are identical at every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Emit diagnostics at `debug` level
    Quiet,
    /// Emit diagnostics at `warn` level
    #[default]
    Verbose,
}

/// Parser options for controlling error handling and recovery behavior.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Fail on first structural violation (true) or record it and recover (false)
    pub strict: bool,

    /// Diagnostic emission level
    pub verbosity: Verbosity,

    /// Password tried against the security handler; the empty password is
    /// always tried first
    pub password: Option<Vec<u8>>,

    /// Maximum number of recorded violations before giving up (0 = unlimited)
    pub max_errors: usize,

    /// Maximum object nesting depth
    pub max_nesting: usize,

    /// Maximum length of a Prev chain or reference chain
    pub max_recursion_depth: u32,

    /// Maximum input size in bytes (0 = unlimited)
    pub max_file_size: usize,
}

impl Default for ParserOptions {
    /// Default configuration: tolerant parsing
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: any structural violation aborts the read.
    pub fn strict() -> Self {
        Self {
            strict: true,
            verbosity: Verbosity::Verbose,
            password: None,
            max_errors: 1,
            max_nesting: 100,
            max_recursion_depth: 100,
            max_file_size: 500 * 1024 * 1024,
        }
    }

    /// Tolerant mode: violations become diagnostics, offending objects are
    /// skipped or replaced with Null.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            verbosity: Verbosity::Verbose,
            password: None,
            max_errors: 1000,
            max_nesting: 100,
            max_recursion_depth: 100,
            max_file_size: 500 * 1024 * 1024,
        }
    }

    /// Set the diagnostic verbosity.
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set the password used to open an encrypted document.
    pub fn with_password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.password = Some(password.as_ref().to_vec());
        self
    }

    /// Check if we should continue parsing after `error_count` violations.
    pub(crate) fn should_continue(&self, error_count: usize) -> bool {
        if self.strict {
            return false;
        }
        self.max_errors == 0 || error_count < self.max_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_mode() {
        let opts = ParserOptions::strict();
        assert!(opts.strict);
        assert_eq!(opts.verbosity, Verbosity::Verbose);
    }

    #[test]
    fn test_default_is_lenient() {
        let opts = ParserOptions::default();
        assert!(!opts.strict);
        assert!(opts.password.is_none());
    }

    #[test]
    fn test_builders() {
        let opts = ParserOptions::strict()
            .with_verbosity(Verbosity::Quiet)
            .with_password("secret");
        assert_eq!(opts.verbosity, Verbosity::Quiet);
        assert_eq!(opts.password.as_deref(), Some(&b"secret"[..]));
    }

    #[test]
    fn test_should_continue() {
        assert!(!ParserOptions::strict().should_continue(0));

        let lenient = ParserOptions::lenient();
        assert!(lenient.should_continue(999));
        assert!(!lenient.should_continue(1000));

        let unlimited = ParserOptions {
            max_errors: 0,
            ..ParserOptions::lenient()
        };
        assert!(unlimited.should_continue(1_000_000));
    }
}
