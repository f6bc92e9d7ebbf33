//! Tracing subscriber setup.
//!
//! [`TracingSetup`] installs a global `tracing` subscriber built from a
//! registry, an [`EnvFilter`] and a fmt layer in the chosen
//! [`TracingFormat`]. Installing twice is harmless: the second call keeps the
//! first subscriber.
//!
//! # Configuration Options
//!
//! ```
//! use holoflow_core::{TracingFormat, TracingSetup};
//! use tracing::Level;
//!
//! // Development: pretty output with span enter/exit events
//! let dev = TracingSetup::new()
//!     .with_level(Level::DEBUG)
//!     .with_format(TracingFormat::Pretty)
//!     .with_span_events(true);
//!
//! // Production: JSON output, quiet scheduler internals
//! let prod = TracingSetup::new()
//!     .with_format(TracingFormat::Json)
//!     .with_env_filter("holoflow_graph=warn,holoradio=info");
//! ```

use core::fmt::{self as core_fmt, Display, Formatter};
use core::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Multi-line, colored.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON objects.
    Json,
}

impl Display for TracingFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> core_fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Error returned when parsing an unknown [`TracingFormat`] name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tracing format '{0}', expected one of: pretty, compact, json")]
pub struct ParseFormatError(String);

impl FromStr for TracingFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(ParseFormatError(s.to_owned())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration a subscriber was installed with.
///
/// Returned by [`TracingSetup::init`] so callers can adapt their own logging,
/// e.g. skip expensive debug-only computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingConfig {
    /// The configured maximum log level.
    pub level: Level,
    /// Rendering of log lines.
    pub format: TracingFormat,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingSetup
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for the global tracing subscriber.
#[derive(Debug, Clone)]
pub struct TracingSetup {
    /// Maximum log level, used when no filter is given or the filter is invalid.
    level: Level,
    /// Output format.
    format: TracingFormat,
    /// `EnvFilter` directives overriding `level`.
    env_filter: Option<String>,
    /// Log span enter and exit.
    span_events: bool,
}

impl Default for TracingSetup {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingSetup {
    /// Creates a setup with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Level used when no filter directive applies.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Rendering of log lines.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter directives in `EnvFilter` syntax, e.g.
    /// `holoflow_graph=debug,holoradio=info`.
    ///
    /// Malformed directives fall back to the configured level.
    #[must_use]
    pub fn with_env_filter(mut self, directives: impl Into<String>) -> Self {
        self.env_filter = Some(directives.into());
        self
    }

    /// Logs an event whenever a span is entered or exited.
    #[must_use]
    pub fn with_span_events(mut self, span_events: bool) -> Self {
        self.span_events = span_events;
        self
    }

    /// Returns the configuration this setup will install.
    #[must_use]
    pub fn config(&self) -> TracingConfig {
        TracingConfig {
            level: self.level,
            format: self.format,
        }
    }

    fn filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str());
        self.env_filter
            .as_deref()
            .map_or_else(fallback, |directives| {
                EnvFilter::try_new(directives).unwrap_or_else(|_| fallback())
            })
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let spans = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer().with_thread_names(true).with_span_events(spans);
        match self.format {
            TracingFormat::Pretty => base.pretty().boxed(),
            TracingFormat::Compact => base.compact().boxed(),
            TracingFormat::Json => base.json().boxed(),
        }
    }

    /// Installs the subscriber and returns the applied configuration.
    ///
    /// Keeps the existing global subscriber if one is already set.
    pub fn init(self) -> TracingConfig {
        let layer = self.layer().with_filter(self.filter());
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::trace!("global subscriber already set");
        }
        tracing::debug!(level = %self.level, format = %self.format, "tracing ready");
        self.config()
    }
}
