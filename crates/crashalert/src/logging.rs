//! Tracing setup for the CLI and the HTTP server.
//!
//! The default filter is per module: delivery problems from
//! `crashalert::dispatch` and `crashalert::provider` stay visible under
//! `--quiet`, storage chatter is held back at normal verbosity, and the HTTP
//! client stack only speaks up at `-vv`. `RUST_LOG` replaces all of it.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors, plus warnings about failed deliveries.
    Quiet,
    /// Info and above.
    #[default]
    Normal,
    /// Debug and above, including routing decisions.
    Verbose,
    /// Everything, including countdown ticks and HTTP client internals.
    Trace,
}

impl Verbosity {
    /// Map `-q` / `-v` flags to a verbosity. `quiet` wins.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Level for the crate's own modules.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter directives used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_directives(&self) -> String {
        let level = self.to_level_filter();
        let delivery = match self {
            Self::Quiet => Level::WARN,
            _ => level,
        };
        let storage = match self {
            Self::Quiet | Self::Normal => Level::WARN,
            _ => level,
        };
        let http = match self {
            Self::Trace => Level::DEBUG,
            _ => Level::WARN,
        };

        [
            format!("crashalert={level}"),
            format!("crashalert::dispatch={delivery}"),
            format!("crashalert::provider={delivery}"),
            format!("crashalert::storage={storage}"),
            format!("reqwest={http}"),
            format!("hyper={http}"),
        ]
        .join(",")
        .to_lowercase()
    }
}

/// Install the global subscriber.
///
/// Call once at startup. Later calls are no-ops.
///
/// # Examples
///
/// ```no_run
/// use crashalert::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(false, 1));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directives()));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        assert_eq!(Verbosity::from_flags(false, 0), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(false, 1), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, 7), Verbosity::Trace);
        assert_eq!(Verbosity::from_flags(true, 2), Verbosity::Quiet);
    }

    #[test]
    fn test_quiet_keeps_delivery_warnings() {
        let directives = Verbosity::Quiet.default_directives();
        assert!(directives.starts_with("crashalert=error,"));
        assert!(directives.contains("crashalert::dispatch=warn"));
        assert!(directives.contains("crashalert::provider=warn"));
        assert!(directives.contains("reqwest=warn"));
    }

    #[test]
    fn test_normal_holds_back_storage() {
        let directives = Verbosity::Normal.default_directives();
        assert!(directives.contains("crashalert=info"));
        assert!(directives.contains("crashalert::dispatch=info"));
        assert!(directives.contains("crashalert::storage=warn"));
    }

    #[test]
    fn test_trace_opens_http_stack() {
        let directives = Verbosity::Trace.default_directives();
        assert!(directives.contains("crashalert::storage=trace"));
        assert!(directives.contains("hyper=debug"));
    }

    #[test]
    fn test_directives_parse() {
        for verbosity in [
            Verbosity::Quiet,
            Verbosity::Normal,
            Verbosity::Verbose,
            Verbosity::Trace,
        ] {
            assert!(EnvFilter::try_new(verbosity.default_directives()).is_ok());
        }
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Trace);
    }
}
