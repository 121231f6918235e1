//! Construction-time configuration for histograms
//!
//! A histogram's sampling strategy is chosen once, when it is built. The
//! selector usually arrives as text from a registry or a config file, so
//! [`SamplingType`] parses from a string and an unknown name surfaces as a
//! [`ConfigError`] before any reservoir exists.

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::sampling::{
    ExponentiallyDecayingReservoir, SlidingWindowReservoir, UniformReservoir, DEFAULT_ALPHA,
    DEFAULT_SIZE,
};
use crate::traits::Reservoir;

/// Error raised while building a histogram or reservoir from configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The sampling strategy selector is not recognized
    #[error("unknown sampling type: {0:?}")]
    UnknownSamplingType(String),
    /// Reservoir capacity must be at least one
    #[error("invalid reservoir size: {0}")]
    InvalidSize(usize),
    /// Decay rate must be finite and positive
    #[error("invalid decay rate: {0}")]
    InvalidAlpha(f64),
}

/// Which observations a histogram keeps
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum SamplingType {
    /// Forward-decay sampling biased towards recent observations
    #[default]
    FavourRecent,
    /// Uniform sampling over every observation since the last reset
    LongTerm,
    /// The most recent observations only
    SlidingWindow,
}

impl SamplingType {
    /// Canonical name, as accepted by [`FromStr`]
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingType::FavourRecent => "favour-recent",
            SamplingType::LongTerm => "long-term",
            SamplingType::SlidingWindow => "sliding-window",
        }
    }
}

impl fmt::Display for SamplingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingType {
    type Err = ConfigError;

    /// Parse a selector, ignoring case and `-`/`_` separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "favourrecent" | "favorrecent" => Ok(SamplingType::FavourRecent),
            "longterm" => Ok(SamplingType::LongTerm),
            "slidingwindow" => Ok(SamplingType::SlidingWindow),
            _ => Err(ConfigError::UnknownSamplingType(s.to_string())),
        }
    }
}

/// Reservoir settings for a histogram
///
/// # Example
///
/// ```
/// use flowhist::config::{ReservoirConfig, SamplingType};
///
/// let reservoir = ReservoirConfig::new("sliding-window".parse::<SamplingType>().unwrap())
///     .with_size(128)
///     .build()
///     .unwrap();
///
/// assert_eq!(reservoir.strategy(), "sliding_window");
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReservoirConfig {
    /// Sampling strategy
    pub sampling: SamplingType,
    /// Number of samples kept
    pub size: usize,
    /// Decay rate, only used by [`SamplingType::FavourRecent`]
    pub alpha: f64,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self::new(SamplingType::default())
    }
}

impl ReservoirConfig {
    /// Create a config for the given strategy with default size and decay rate
    pub fn new(sampling: SamplingType) -> Self {
        Self {
            sampling,
            size: DEFAULT_SIZE,
            alpha: DEFAULT_ALPHA,
        }
    }

    /// Set the number of samples kept
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the decay rate
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Check that the settings describe a buildable reservoir
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::InvalidSize(self.size));
        }
        if self.sampling == SamplingType::FavourRecent
            && !(self.alpha.is_finite() && self.alpha > 0.0)
        {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        Ok(())
    }

    /// Build the configured reservoir using the process monotonic clock
    pub fn build(&self) -> Result<Box<dyn Reservoir>, ConfigError> {
        self.validate()?;

        let reservoir: Box<dyn Reservoir> = match self.sampling {
            SamplingType::FavourRecent => {
                Box::new(ExponentiallyDecayingReservoir::new(self.size, self.alpha))
            }
            SamplingType::LongTerm => Box::new(UniformReservoir::new(self.size)),
            SamplingType::SlidingWindow => Box::new(SlidingWindowReservoir::new(self.size)),
        };
        Ok(reservoir)
    }

    /// Build the configured reservoir driven by the given clock
    pub fn build_with_clock(
        &self,
        clock: Arc<dyn Clock>,
    ) -> Result<Box<dyn Reservoir>, ConfigError> {
        self.validate()?;

        let reservoir: Box<dyn Reservoir> = match self.sampling {
            SamplingType::FavourRecent => Box::new(ExponentiallyDecayingReservoir::with_clock(
                self.size, self.alpha, clock,
            )),
            SamplingType::LongTerm => Box::new(UniformReservoir::with_clock_and_rng(
                self.size,
                clock,
                crate::random::default_rng(),
            )),
            SamplingType::SlidingWindow => {
                Box::new(SlidingWindowReservoir::with_clock(self.size, clock))
            }
        };
        Ok(reservoir)
    }
}
