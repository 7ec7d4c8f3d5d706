//! Population run configuration.

use crate::error::SimError;

use statesim_core::time::{days, years, Timestamp};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What the scheduler does when simulating one person fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop scheduling and return the first error.
    #[default]
    Abort,
    /// Log the error, record the failed index and keep going.
    Skip,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "skip" => Ok(FailurePolicy::Skip),
            _ => Err(format!("Unknown failure policy: {} (expected abort or skip)", s)),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abort => f.write_str("abort"),
            FailurePolicy::Skip => f.write_str("skip"),
        }
    }
}

/// Configuration for a population run.
#[derive(Debug, Clone)]
pub struct PopulationConfig {
    /// Number of people to simulate
    pub population: usize,

    /// Master seed; every person's random stream derives from it
    pub seed: u64,

    /// Simulation end time; people are simulated from birth up to here
    pub stop: Timestamp,

    /// Simulated time between ticks
    pub timestep: i64,

    /// Regenerate people who die before `stop`
    pub only_alive: bool,

    /// Attempts per person in only-alive mode
    pub max_tries: usize,

    /// Worker threads
    pub workers: usize,

    /// Reaction to a failed person
    pub on_error: FailurePolicy,

    /// How often the scheduler logs progress while waiting
    pub progress_interval: Duration,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            population: 1,
            seed: 42,
            stop: years(100),
            timestep: days(7),
            only_alive: false,
            max_tries: 10,
            workers: 8,
            on_error: FailurePolicy::Abort,
            progress_interval: Duration::from_secs(30),
        }
    }
}

impl PopulationConfig {
    pub fn new(population: usize, seed: u64) -> Self {
        Self {
            population,
            seed,
            ..Default::default()
        }
    }

    pub fn with_stop(mut self, stop: Timestamp) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_timestep(mut self, timestep: i64) -> Self {
        self.timestep = timestep;
        self
    }

    pub fn with_only_alive(mut self, only_alive: bool) -> Self {
        self.only_alive = only_alive;
        self
    }

    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_failure_policy(mut self, on_error: FailurePolicy) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Rejects settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.timestep <= 0 {
            return Err(SimError::Config(format!("timestep must be positive, got {}", self.timestep)));
        }
        if self.workers == 0 {
            return Err(SimError::Config("at least one worker is required".to_string()));
        }
        if self.max_tries == 0 {
            return Err(SimError::Config("max_tries must be at least 1".to_string()));
        }
        if self.progress_interval.is_zero() {
            return Err(SimError::Config("progress interval must be positive".to_string()));
        }
        Ok(())
    }
}
