//! Logging setup for the `motorpool` binary.
//!
//! Command output (tables, CSV, JSON) goes to stdout, so log lines are
//! written to stderr where they cannot corrupt a piped export.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How much the binary logs, chosen with `-q` / `-v` / `-vv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Store selection, writes, and warnings.
    #[default]
    Normal,
    /// Row counts and skipped cache writes.
    Verbose,
    /// Everything.
    Trace,
}

impl Verbosity {
    /// The most detailed level logged at this verbosity.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    fn directive(self) -> String {
        format!("motorpool={}", self.level())
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbosity`.
///
/// ```no_run
/// use motorpool::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    // A second call keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(Verbosity::Quiet.level(), Level::ERROR);
        assert_eq!(Verbosity::default().level(), Level::INFO);
        assert_eq!(Verbosity::Verbose.level(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.level(), Level::TRACE);
    }

    #[test]
    fn test_directive_scopes_to_crate() {
        assert_eq!(Verbosity::Verbose.directive(), "motorpool=DEBUG");
        assert_eq!(Verbosity::Quiet.directive(), "motorpool=ERROR");
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Trace);
    }
}
