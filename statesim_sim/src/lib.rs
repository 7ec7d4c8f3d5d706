//! StateSim Population Simulator
//!
//! Runs a population of people through every top-level module of a
//! [`statesim_core::ModuleRegistry`], tick by tick, on a fixed worker pool.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Scheduler                          │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │ rayon pool: one task per population index           │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │       │                       │                           │
//! │  ┌────▼─────┐            ┌────▼─────┐                     │
//! │  │ Person 0 │    ...     │ Person n │  (own seed, own RNG)│
//! │  └────┬─────┘            └────┬─────┘                     │
//! │       │  Interpreter::advance per module per tick         │
//! │  ┌────▼───────────────────────▼────┐                      │
//! │  │ TransitionMetrics  +  RecordSink │                     │
//! │  └──────────────────────────────────┘                     │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use statesim_sim::{PopulationConfig, Scheduler};
//! use statesim_core::ModuleRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ModuleRegistry::load_dir("modules")?);
//! let scheduler = Scheduler::new(PopulationConfig::new(1000, 42), registry.clone());
//! let summary = scheduler.run()?;
//! println!("{}", scheduler.metrics().report(&registry, summary.kept() as u64));
//! ```

mod config;
mod demographics;
mod error;
mod lifecycle;
mod scheduler;
mod seeds;
mod sink;
mod wellness;

pub use config::{FailurePolicy, PopulationConfig};
pub use demographics::{Demographics, UniformAgeDemographics};
pub use error::SimError;
pub use lifecycle::{convert_risk_to_timestep, daily_death_risk, Lifecycle, AGE};
pub use scheduler::{PopulationSummary, Scheduler};
pub use seeds::{AttemptSeeds, SeedProvider};
pub use sink::{CollectingSink, JsonLinesSink, PersonRecord, RecordSink};
pub use wellness::{WellnessSchedule, ENCOUNTERS, NEXT_WELLNESS};
