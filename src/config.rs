//! Collector configuration.
//!
//! Everything is supplied at construction: either programmatically through [`Config`]'s
//! setters or from the process environment via [`Config::from_env`]. An invalid configuration
//! is rejected by [`Config::validate`] before any collector component is built.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_SDK_FILE: &str = "/usr/appinsights/docker/sdk.info";
pub const DEFAULT_SAMPLES_IN_EACH_METRIC: usize = 2;
pub const DEFAULT_COLLECT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_PARALLELISM: usize = 64;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("samples_in_each_metric must be greater than 1, given: {0}")]
    TooFewSamples(usize),
    #[error("max_parallelism must be greater than 0")]
    ZeroParallelism,
    #[error("{name} must be a positive duration")]
    ZeroDuration { name: &'static str },
    #[error("sdk file path must not be empty")]
    EmptySdkFile,
    #[error("invalid value `{value}` for environment variable `{name}`")]
    InvalidEnv { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Timing and retry rules for instrumentation key resolution and cache eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionPolicy {
    /// How long a container missing from the listing keeps its entry.
    pub grace_period: Duration,
    /// How long after registration key discovery is still retried.
    pub give_up_after: Duration,
    /// Discovery attempts made when a container is first seen.
    pub initial_attempts: u32,
    /// Pause between two failed initial attempts.
    pub retry_delay: Duration,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(60),
            give_up_after: Duration::from_secs(60),
            initial_attempts: 5,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub docker_socket: PathBuf,
    pub samples_in_each_metric: usize,
    pub sdk_file: String,
    pub collect_interval: Duration,
    pub max_parallelism: usize,
    pub call_timeout: Duration,
    pub resolution: ResolutionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_socket: PathBuf::from(DEFAULT_DOCKER_SOCKET),
            samples_in_each_metric: DEFAULT_SAMPLES_IN_EACH_METRIC,
            sdk_file: DEFAULT_SDK_FILE.to_owned(),
            collect_interval: DEFAULT_COLLECT_INTERVAL,
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            resolution: ResolutionPolicy::default(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment, falling back to defaults for unset
    /// variables, and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEnv`] if a variable cannot be parsed, or any validation error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(socket) = lookup("DOCKER_SOCKET") {
            config.docker_socket = PathBuf::from(socket);
        }
        if let Some(samples) = parse_var(&lookup, "SAMPLES_IN_EACH_METRIC")? {
            config.samples_in_each_metric = samples;
        }
        if let Some(sdk_file) = lookup("SDK_FILE") {
            config.sdk_file = sdk_file;
        }
        if let Some(secs) = parse_var(&lookup, "COLLECT_INTERVAL_SECS")? {
            config.collect_interval = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var(&lookup, "FANOUT_MAX_PARALLELISM")? {
            config.max_parallelism = max;
        }
        if let Some(secs) = parse_var(&lookup, "CALL_TIMEOUT_SECS")? {
            config.call_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants every collector component relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.samples_in_each_metric <= 1 {
            return Err(Error::TooFewSamples(self.samples_in_each_metric));
        }
        if self.max_parallelism == 0 {
            return Err(Error::ZeroParallelism);
        }
        if self.collect_interval.is_zero() {
            return Err(Error::ZeroDuration {
                name: "collect_interval",
            });
        }
        if self.call_timeout.is_zero() {
            return Err(Error::ZeroDuration {
                name: "call_timeout",
            });
        }
        if self.sdk_file.trim().is_empty() {
            return Err(Error::EmptySdkFile);
        }

        Ok(())
    }

    pub fn with_samples_in_each_metric(mut self, samples: usize) -> Self {
        self.samples_in_each_metric = samples;
        self
    }

    pub fn with_sdk_file(mut self, sdk_file: impl Into<String>) -> Self {
        self.sdk_file = sdk_file.into();
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_collect_interval(mut self, collect_interval: Duration) -> Self {
        self.collect_interval = collect_interval;
        self
    }

    pub fn with_resolution_policy(mut self, resolution: ResolutionPolicy) -> Self {
        self.resolution = resolution;
        self
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::InvalidEnv { name, value }),
    }
}
