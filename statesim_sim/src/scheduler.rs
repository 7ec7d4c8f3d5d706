//! Population scheduler - runs every person through every top-level module.
//!
//! Each population index is one task on a fixed-size rayon pool. A task owns
//! its [`Person`] from birth to the stop time and shares only the read-only
//! [`ModuleRegistry`], the [`TransitionMetrics`] table and the record sink.
//! Finished tasks report back over a crossbeam channel; the calling thread
//! blocks on that channel, logging progress while it waits.

use crate::config::{FailurePolicy, PopulationConfig};
use crate::demographics::{Demographics, UniformAgeDemographics};
use crate::error::SimError;
use crate::lifecycle::Lifecycle;
use crate::seeds::SeedProvider;
use crate::sink::RecordSink;
use crate::wellness::WellnessSchedule;

use crossbeam::channel::{self, RecvTimeoutError};
use serde::Serialize;
use statesim_core::{EncounterManager, Interpreter, ModuleRegistry, Person, Progress, Timestamp, TransitionMetrics};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Results of a population run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulationSummary {
    /// People kept and alive at the stop time
    pub alive: usize,

    /// People kept but dead at the stop time
    pub dead: usize,

    /// Attempts thrown away in only-alive mode
    pub discarded: usize,

    /// Indices that failed under the skip policy
    pub failed: Vec<usize>,

    /// Wall-clock time of the run
    pub elapsed: Duration,
}

impl PopulationSummary {
    /// People handed to metrics and the sink.
    pub fn kept(&self) -> usize {
        self.alive + self.dead
    }
}

/// How one task ended.
enum Outcome {
    Kept { alive: bool, discarded: usize },
    Cancelled,
}

/// Everything a task needs, shared across the pool.
struct Worker {
    config: PopulationConfig,
    seeds: SeedProvider,
    registry: Arc<ModuleRegistry>,
    metrics: Arc<TransitionMetrics>,
    demographics: Arc<dyn Demographics>,
    lifecycle: Lifecycle,
    encounters: Arc<dyn EncounterManager>,
    sink: Option<Arc<dyn RecordSink>>,
}

impl Worker {
    /// Simulates population `index`, retrying dead people in only-alive mode.
    fn simulate(&self, index: usize) -> Result<Outcome, SimError> {
        let tries = if self.config.only_alive { self.config.max_tries } else { 1 };
        let mut discarded = 0;

        for seed in self.seeds.attempts(index).take(tries) {
            let (person, end) = self.live(index, seed)?;
            let alive = person.alive(self.config.stop);

            if alive || !self.config.only_alive {
                self.metrics.record(&person, end);
                if let Some(sink) = &self.sink {
                    sink.accept(&person)?;
                }
                return Ok(Outcome::Kept { alive, discarded });
            }

            discarded += 1;
            debug!("Person {} died at {:?}; discarding attempt {}", index, person.death(), discarded);
        }

        Err(SimError::RetryExhausted { index, tries })
    }

    /// Runs one person from birth until death or the stop time.
    ///
    /// Returns the person and the tick time the loop stopped at.
    fn live(&self, index: usize, seed: u64) -> Result<(Person, Timestamp), SimError> {
        let mut person = Person::new(index, seed);
        let birth = self.demographics.assign(&mut person, &self.config);
        person.set_birth(birth);

        let interpreter = Interpreter::new(&self.registry, self.encounters.as_ref());
        let mut active: Vec<&str> = self.registry.top_level().map(|m| m.name()).collect();

        let mut time = birth;
        while person.alive(time) && time < self.config.stop {
            self.lifecycle.tick(&mut person, time, self.config.timestep);
            if !person.alive(time) {
                break;
            }
            self.encounters.open_wellness_window(&mut person, time);

            let mut i = 0;
            while i < active.len() {
                match interpreter.advance(active[i], &mut person, time) {
                    Ok(Progress::Active) => i += 1,
                    Ok(Progress::Completed) => {
                        active.remove(i);
                    }
                    Err(e) => return Err(SimError::agent(index, e)),
                }
            }

            self.encounters.close_wellness_window(&mut person, time);
            time += self.config.timestep;
        }

        Ok((person, time))
    }
}

/// Drives a whole population through the registry's modules.
pub struct Scheduler {
    config: PopulationConfig,
    registry: Arc<ModuleRegistry>,
    metrics: Arc<TransitionMetrics>,
    demographics: Arc<dyn Demographics>,
    lifecycle: Lifecycle,
    encounters: Arc<dyn EncounterManager>,
    sink: Option<Arc<dyn RecordSink>>,
}

impl Scheduler {
    /// Creates a scheduler with the default demographics, natural mortality
    /// and wellness schedule.
    pub fn new(config: PopulationConfig, registry: Arc<ModuleRegistry>) -> Self {
        Self {
            config,
            registry,
            metrics: Arc::new(TransitionMetrics::new()),
            demographics: Arc::new(UniformAgeDemographics::default()),
            lifecycle: Lifecycle::default(),
            encounters: Arc::new(WellnessSchedule),
            sink: None,
        }
    }

    pub fn with_demographics(mut self, demographics: Arc<dyn Demographics>) -> Self {
        self.demographics = demographics;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_encounters(mut self, encounters: Arc<dyn EncounterManager>) -> Self {
        self.encounters = encounters;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &PopulationConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Metrics accumulated by finished people.
    pub fn metrics(&self) -> &Arc<TransitionMetrics> {
        &self.metrics
    }

    /// Simulates the whole population and blocks until every task is done.
    pub fn run(&self) -> Result<PopulationSummary, SimError> {
        self.config.validate()?;
        let started = Instant::now();
        let population = self.config.population;

        info!(
            "Simulating {} people on {} workers (seed={}, modules={})",
            population,
            self.config.workers,
            self.config.seed,
            self.registry.top_level().count()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("statesim-worker-{}", i))
            .build()
            .map_err(|e| SimError::Pool(e.to_string()))?;

        let worker = Arc::new(Worker {
            config: self.config.clone(),
            seeds: SeedProvider::new(self.config.seed),
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            demographics: Arc::clone(&self.demographics),
            lifecycle: self.lifecycle,
            encounters: Arc::clone(&self.encounters),
            sink: self.sink.clone(),
        });
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = channel::unbounded();

        for index in 0..population {
            let worker = Arc::clone(&worker);
            let cancelled = Arc::clone(&cancelled);
            let tx = tx.clone();
            pool.spawn(move || {
                let result = if cancelled.load(Ordering::Relaxed) {
                    Ok(Outcome::Cancelled)
                } else {
                    worker.simulate(index)
                };
                tx.send((index, result)).ok();
            });
        }
        drop(tx);

        let mut summary = PopulationSummary::default();
        let mut first_error = None;
        let mut completed = 0usize;

        while completed < population {
            match rx.recv_timeout(self.config.progress_interval) {
                Ok((index, result)) => {
                    completed += 1;
                    match result {
                        Ok(Outcome::Kept { alive, discarded }) => {
                            if alive {
                                summary.alive += 1;
                            } else {
                                summary.dead += 1;
                            }
                            summary.discarded += discarded;
                        }
                        Ok(Outcome::Cancelled) => {}
                        Err(e) => match self.config.on_error {
                            FailurePolicy::Abort => {
                                if first_error.is_none() {
                                    error!("Person {} failed, aborting run: {}", index, e);
                                    cancelled.store(true, Ordering::Relaxed);
                                    first_error = Some(e);
                                }
                            }
                            FailurePolicy::Skip => {
                                warn!("Person {} failed, skipping: {}", index, e);
                                summary.failed.push(index);
                            }
                        },
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    info!("Waiting for people... {}/{} complete", completed, population);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SimError::Pool(format!(
                        "workers stopped reporting after {}/{} people",
                        completed, population
                    )));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if let Some(sink) = &self.sink {
            sink.finish()?;
        }

        summary.failed.sort_unstable();
        summary.elapsed = started.elapsed();
        info!(
            "Simulated {} people in {:.2?}: {} alive, {} dead, {} discarded, {} failed",
            population,
            summary.elapsed,
            summary.alive,
            summary.dead,
            summary.discarded,
            summary.failed.len()
        );
        Ok(summary)
    }
}
