//! Run configuration read from the environment.

use core::str::FromStr;

use crate::cube::Shape;

/// Default cube shape. The full instrument shape is `[128, 2016, 128, 4]`.
pub const DEFAULT_DIMS: Shape = [8, 64, 32, 4];

/// Default number of generated batches.
pub const DEFAULT_ITERATIONS: u64 = 10;

/// Default number of scheduler workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable did not parse as the expected number.
    #[error("{var}: '{value}' is not a valid {expected}")]
    InvalidNumber {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
        /// What was expected.
        expected: &'static str,
    },
    /// `HOLORADIO_DIMS` did not hold four positive lengths.
    #[error("dims: expected 't,b,f,p' with four positive lengths, got '{0}'")]
    InvalidDims(String),
}

/// Cube dimensions parsed from `t,b,f,p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims(pub Shape);

impl Default for Dims {
    fn default() -> Self {
        Self(DEFAULT_DIMS)
    }
}

impl FromStr for Dims {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidDims(s.to_owned());
        let lengths = s
            .split(',')
            .map(|part| part.trim().parse::<usize>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        let shape: Shape = lengths.try_into().map_err(|_| invalid())?;
        if shape.contains(&0) {
            return Err(invalid());
        }
        Ok(Self(shape))
    }
}

/// Settings for one `holoradio` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioConfig {
    /// Scheduler worker threads.
    pub workers: usize,
    /// Batches produced by the generator.
    pub iterations: u64,
    /// Cube shape.
    pub dims: Dims,
    /// Tracing filter directive.
    pub log: Option<String>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            iterations: DEFAULT_ITERATIONS,
            dims: Dims::default(),
            log: None,
        }
    }
}

impl RadioConfig {
    /// Reads `HOLORADIO_WORKERS`, `HOLORADIO_ITERATIONS`, `HOLORADIO_DIMS` and
    /// `HOLORADIO_LOG`, keeping defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a variable that is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`RadioConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a variable that is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup("HOLORADIO_WORKERS") {
            config.workers = parse_number("HOLORADIO_WORKERS", &value, "worker count")?;
        }
        if let Some(value) = lookup("HOLORADIO_ITERATIONS") {
            config.iterations = parse_number("HOLORADIO_ITERATIONS", &value, "iteration count")?;
        }
        if let Some(value) = lookup("HOLORADIO_DIMS") {
            config.dims = value.parse()?;
        }
        config.log = lookup("HOLORADIO_LOG").filter(|value| !value.trim().is_empty());
        Ok(config)
    }
}

fn parse_number<T: FromStr>(
    var: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_owned(),
            expected,
        })
}
