//! Tracing subscriber initialization.
//!
//! Hosts call [`init_logging`] once at startup. Filter directives come from,
//! highest priority first:
//!
//! 1. `MODELDOC_LOG` (per-target directives, e.g. `modeldoc=debug,warn`)
//! 2. `RUST_LOG`
//! 3. the configured [`Verbosity`]

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Project-specific filter variable.
pub const LOG_ENV: &str = "MODELDOC_LOG";

/// Default log level when no environment directives are set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Warnings and above.
    #[default]
    Normal,
    /// Info and above: test executions, handshakes, uploads.
    Verbose,
    /// Debug and above: cache hits, registrations, requests.
    Debug,
    /// Everything.
    Trace,
}

impl Verbosity {
    /// Map to a `tracing::Level`.
    #[must_use]
    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Install the global subscriber, writing to stderr.
///
/// Returns `false` when a subscriber was already installed; the existing
/// one is kept.
pub fn init_logging(verbosity: Verbosity) -> bool {
    let filter = build_env_filter(verbosity);
    let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_ansi)
        .with_target(true);

    let installed = if verbosity >= Verbosity::Debug {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.with_timer(fmt::time::uptime()))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.without_time().compact())
            .try_init()
    };
    installed.is_ok()
}

fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    // Unparseable directives fall through rather than failing startup.
    if let Some(filter) = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
    {
        return filter;
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(verbosity.default_level().as_str())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_mapping() {
        assert_eq!(Verbosity::Quiet.default_level(), Level::ERROR);
        assert_eq!(Verbosity::Normal.default_level(), Level::WARN);
        assert_eq!(Verbosity::Verbose.default_level(), Level::INFO);
        assert_eq!(Verbosity::Debug.default_level(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.default_level(), Level::TRACE);
    }

    #[test]
    fn test_verbosity_ordering() {
        assert!(Verbosity::Quiet < Verbosity::Normal);
        assert!(Verbosity::Debug > Verbosity::Verbose);
    }

    #[test]
    fn test_verbosity_serde() {
        let v: Verbosity = serde_yaml::from_str("debug").unwrap();
        assert_eq!(v, Verbosity::Debug);
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_build_env_filter_fallback() {
        let _filter = build_env_filter(Verbosity::Quiet);
        let _filter = build_env_filter(Verbosity::Trace);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(Verbosity::Normal);
        assert!(!init_logging(Verbosity::Normal));
    }
}
