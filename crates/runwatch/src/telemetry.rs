//! Log setup for the runwatch binary.
//!
//! Log lines always go to stderr; stdout carries the run summary only.
//! `RUST_LOG` overrides the filter derived from the command-line flags.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Chattiness selected with `-q` / `-v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Errors only
    Quiet,
    Normal,
    Debug,
    /// Includes raw provider payloads and HTTP client internals
    Trace,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, 0) => Verbosity::Normal,
            (false, 1) => Verbosity::Debug,
            (false, _) => Verbosity::Trace,
        }
    }

    pub fn level(self) -> Level {
        match self {
            Verbosity::Quiet => Level::ERROR,
            Verbosity::Normal => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Trace => Level::TRACE,
        }
    }

    /// Filter directives used when `RUST_LOG` is unset. The HTTP stack stays
    /// at warn unless tracing everything.
    fn directives(self) -> String {
        match self {
            Verbosity::Trace => Level::TRACE.as_str().to_lowercase(),
            other => format!(
                "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn",
                other.level().as_str().to_lowercase()
            ),
        }
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(json: bool, verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directives()));

    let json_layer = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(verbosity == Verbosity::Trace)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}
