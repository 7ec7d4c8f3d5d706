//! State-level transition metrics.
//!
//! [`TransitionMetrics`] aggregates finished people's module histories into
//! per-(module, state) counters:
//! - **entered**: times any person entered the state
//! - **population**: distinct people that ever entered it
//! - **current**: people whose last state in the module was this one
//! - **duration**: total time spent in the state
//! - **destinations**: how often each successor state followed it
//!
//! The table is a sharded `DashMap` of atomic counters, so workers record
//! concurrently without a global lock.

use crate::module::StateKind;
use crate::person::Person;
use crate::registry::ModuleRegistry;
use crate::time::{describe_duration, Timestamp};

use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Metric {
    entered: AtomicU64,
    population: AtomicU64,
    current: AtomicU64,
    duration: AtomicI64,
    destinations: DashMap<String, AtomicU64>,
}

impl Metric {
    fn add_destination(&self, state: &str) {
        if let Some(count) = self.destinations.get(state) {
            count.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.destinations
            .entry(state.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            entered: self.entered.load(Ordering::Relaxed),
            population: self.population.load(Ordering::Relaxed),
            current: self.current.load(Ordering::Relaxed),
            duration: self.duration.load(Ordering::Relaxed),
            destinations: self
                .destinations
                .iter()
                .map(|d| (d.key().clone(), d.value().load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// Point-in-time copy of one state's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricSnapshot {
    pub entered: u64,
    pub population: u64,
    pub current: u64,
    /// Total milliseconds spent in the state.
    pub duration: i64,
    pub destinations: BTreeMap<String, u64>,
}

/// Concurrent per-(module, state) metric table.
#[derive(Debug, Default)]
pub struct TransitionMetrics {
    table: DashMap<(String, String), Arc<Metric>>,
}

impl TransitionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, module: &str, state: &str) -> Arc<Metric> {
        let key = (module.to_string(), state.to_string());
        if let Some(metric) = self.table.get(&key) {
            return Arc::clone(metric.value());
        }
        Arc::clone(&*self.table.entry(key).or_default())
    }

    /// Folds one finished person's histories into the table.
    ///
    /// Open entries are counted as lasting until `end`.
    pub fn record(&self, person: &Person, end: Timestamp) {
        for (module, history) in person.histories() {
            let Some(last) = history.current() else {
                continue;
            };

            let mut seen = HashSet::new();
            for entry in history.iter() {
                let metric = self.entry(module, &entry.state);
                metric.entered.fetch_add(1, Ordering::Relaxed);
                metric.duration.fetch_add(entry.duration(end), Ordering::Relaxed);
                if seen.insert(entry.state.as_str()) {
                    metric.population.fetch_add(1, Ordering::Relaxed);
                }
            }

            self.entry(module, &last.state).current.fetch_add(1, Ordering::Relaxed);

            // Oldest to newest: each entry's successor is the next more recent one.
            let entries: Vec<_> = history.iter().collect();
            for pair in entries.windows(2).rev() {
                let (to, from) = (pair[0], pair[1]);
                self.entry(module, &from.state).add_destination(&to.state);
            }
        }
    }

    /// Current counters for one state, if any person ever entered it.
    pub fn metric(&self, module: &str, state: &str) -> Option<MetricSnapshot> {
        let key = (module.to_string(), state.to_string());
        self.table.get(&key).map(|metric| metric.snapshot())
    }

    /// Number of (module, state) pairs that were reached.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Builds the per-module report for every module in `registry`.
    pub fn report(&self, registry: &ModuleRegistry, total_population: u64) -> MetricsReport {
        let modules = registry
            .modules()
            .map(|module| {
                let mut states = Vec::new();
                let mut never_reached = Vec::new();

                for state in module.states() {
                    match self.metric(module.name(), &state.name) {
                        Some(snapshot) => states.push(StateReport::new(
                            &state.name,
                            &state.kind,
                            snapshot,
                            total_population,
                        )),
                        None => never_reached.push(state.name.clone()),
                    }
                }

                ModuleReport {
                    name: module.name().to_string(),
                    states,
                    never_reached,
                }
            })
            .collect();

        MetricsReport {
            total_population,
            modules,
        }
    }
}

fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

fn ratio(count: f64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count / total as f64
    }
}

/// Metrics for a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub total_population: u64,
    pub modules: Vec<ModuleReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub name: String,
    pub states: Vec<StateReport>,
    /// Declared states no person ever entered.
    pub never_reached: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    pub name: String,
    pub kind: &'static str,
    pub entered: u64,
    pub population: u64,
    pub population_percent: f64,
    /// Entries per person in the whole population.
    pub entries_per_person: f64,
    /// Entries per person that ever entered the state.
    pub entries_per_member: f64,
    pub current: u64,
    pub current_percent: f64,
    /// Only reported for Guard and Delay states.
    pub duration: Option<DurationReport>,
    /// Wellness encounters report no duration.
    pub wellness: bool,
    pub destinations: Vec<DestinationReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DurationReport {
    pub total: i64,
    pub per_entry: f64,
    pub per_member: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DestinationReport {
    pub state: String,
    pub count: u64,
    pub percent: f64,
}

impl StateReport {
    fn new(name: &str, kind: &StateKind, snapshot: MetricSnapshot, total_population: u64) -> Self {
        let duration = kind.is_time_bounded().then(|| DurationReport {
            total: snapshot.duration,
            per_entry: ratio(snapshot.duration as f64, snapshot.entered),
            per_member: ratio(snapshot.duration as f64, snapshot.population),
        });

        let transitions: u64 = snapshot.destinations.values().sum();
        let destinations = snapshot
            .destinations
            .iter()
            .map(|(state, &count)| DestinationReport {
                state: state.clone(),
                count,
                percent: percent(count, transitions),
            })
            .collect();

        Self {
            name: name.to_string(),
            kind: kind.label(),
            entered: snapshot.entered,
            population: snapshot.population,
            population_percent: percent(snapshot.population, total_population),
            entries_per_person: ratio(snapshot.entered as f64, total_population),
            entries_per_member: ratio(snapshot.entered as f64, snapshot.population),
            current: snapshot.current,
            current_percent: percent(snapshot.current, total_population),
            duration,
            wellness: kind.is_wellness_encounter(),
            destinations,
        }
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for module in &self.modules {
            writeln!(f, "{}", module.name.to_uppercase())?;

            for state in &module.states {
                writeln!(f, "{}:", state.name)?;
                writeln!(f, " Total times entered: {}", state.entered)?;
                writeln!(
                    f,
                    " Population that ever hit this state: {} ({:.2}%)",
                    state.population, state.population_percent
                )?;
                writeln!(f, " Average # of hits per total population: {:.2}", state.entries_per_person)?;
                writeln!(
                    f,
                    " Average # of hits per person that ever hit state: {:.2}",
                    state.entries_per_member
                )?;
                writeln!(
                    f,
                    " Population currently in state: {} ({:.2}%)",
                    state.current, state.current_percent
                )?;

                if let Some(duration) = &state.duration {
                    writeln!(f, " Total duration: {}", describe_duration(duration.total as f64))?;
                    writeln!(
                        f,
                        " Average duration per time entered: {}",
                        describe_duration(duration.per_entry)
                    )?;
                    writeln!(
                        f,
                        " Average duration per person that ever entered state: {}",
                        describe_duration(duration.per_member)
                    )?;
                } else if state.wellness {
                    writeln!(f, " (duration metrics for wellness encounter omitted)")?;
                }

                if !state.destinations.is_empty() {
                    writeln!(f, " Transitioned to:")?;
                    for destination in &state.destinations {
                        writeln!(
                            f,
                            " --> {} : {} = {:.2}%",
                            destination.state, destination.count, destination.percent
                        )?;
                    }
                }
                writeln!(f)?;
            }

            for state in &module.never_reached {
                writeln!(f, "{}:", state)?;
                writeln!(f, " Never reached")?;
                writeln!(f)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::days;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn person_with_path(index: usize, module: &str, path: &[(&str, i64)], end_open: bool) -> Person {
        let mut person = Person::new(index, index as u64);
        let history = person.history_mut(module);
        for (state, at) in path {
            history.enter(state, *at);
        }
        if !end_open {
            let last = path.last().map_or(0, |(_, at)| *at);
            history.close_current(last);
        }
        person
    }

    #[test]
    fn test_record_counts() {
        let metrics = TransitionMetrics::new();
        let path = [("Initial", 0), ("Wait", 0), ("Done", days(5))];
        metrics.record(&person_with_path(0, "m", &path, false), days(10));
        metrics.record(&person_with_path(1, "m", &path[..2], true), days(10));

        let wait = metrics.metric("m", "Wait").unwrap();
        assert_eq!(wait.entered, 2);
        assert_eq!(wait.population, 2);
        assert_eq!(wait.current, 1);
        assert_eq!(wait.duration, days(5) + days(10));
        assert_eq!(wait.destinations.get("Done"), Some(&1));

        let initial = metrics.metric("m", "Initial").unwrap();
        assert_eq!(initial.destinations.get("Wait"), Some(&2));
        assert_eq!(initial.duration, 0);
        assert!(metrics.metric("m", "Missing").is_none());
    }

    #[test]
    fn test_population_counts_distinct_people() {
        let metrics = TransitionMetrics::new();
        let path = [("Initial", 0), ("Loop", 1), ("Loop", 2), ("Loop", 3), ("Done", 4)];
        metrics.record(&person_with_path(0, "m", &path, false), 10);

        let looped = metrics.metric("m", "Loop").unwrap();
        assert_eq!(looped.entered, 3);
        assert_eq!(looped.population, 1);
        assert_eq!(looped.destinations.get("Loop"), Some(&2));
        assert_eq!(looped.destinations.get("Done"), Some(&1));
    }

    #[test]
    fn test_concurrent_record() {
        let metrics = TransitionMetrics::new();
        let path = [("Initial", 0), ("Done", 1)];
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let metrics = &metrics;
                scope.spawn(move || {
                    for i in 0..100 {
                        metrics.record(&person_with_path(worker * 100 + i, "m", &path, false), 2);
                    }
                });
            }
        });

        let done = metrics.metric("m", "Done").unwrap();
        assert_eq!(done.entered, 800);
        assert_eq!(done.current, 800);
        assert_eq!(metrics.metric("m", "Initial").unwrap().destinations.get("Done"), Some(&800));
    }

    fn report_registry() -> ModuleRegistry {
        let module = json!({
            "name": "waiting",
            "states": {
                "Initial": { "type": "Initial", "direct_transition": "Wait" },
                "Wait": { "type": "Delay", "exact": { "quantity": 2, "unit": "years" }, "direct_transition": "Done" },
                "Checkup": { "type": "Encounter", "encounter_class": "wellness", "wellness": true, "direct_transition": "Done" },
                "Done": { "type": "Terminal" }
            }
        });
        ModuleRegistry::from_json_strs(&[module.to_string()]).unwrap()
    }

    #[test]
    fn test_report_fields() {
        let metrics = TransitionMetrics::new();
        let path = [("Initial", 0), ("Wait", 0), ("Done", days(730))];
        metrics.record(&person_with_path(0, "waiting", &path, false), days(800));
        metrics.record(&person_with_path(1, "waiting", &path[..2], true), days(365));

        let report = metrics.report(&report_registry(), 4);
        let module = &report.modules[0];
        assert_eq!(module.never_reached, vec!["Checkup".to_string()]);

        let wait = module.states.iter().find(|s| s.name == "Wait").unwrap();
        assert_eq!(wait.kind, "Delay");
        assert_relative_eq!(wait.population_percent, 50.0);
        assert_relative_eq!(wait.entries_per_person, 0.5);
        assert_relative_eq!(wait.entries_per_member, 1.0);
        assert_relative_eq!(wait.current_percent, 25.0);
        let duration = wait.duration.as_ref().unwrap();
        assert_eq!(duration.total, days(730) + days(365));
        assert_relative_eq!(duration.per_entry, (days(1095) / 2) as f64);
        assert_eq!(wait.destinations.len(), 1);
        assert_relative_eq!(wait.destinations[0].percent, 100.0);

        let done = module.states.iter().find(|s| s.name == "Done").unwrap();
        assert!(done.duration.is_none());
    }

    #[test]
    fn test_report_text() {
        let metrics = TransitionMetrics::new();
        let path = [("Initial", 0), ("Wait", 0), ("Done", days(730))];
        metrics.record(&person_with_path(0, "waiting", &path, false), days(800));

        let text = metrics.report(&report_registry(), 1).to_string();
        assert!(text.starts_with("WAITING\n"));
        assert!(text.contains("Wait:\n Total times entered: 1\n"));
        assert!(text.contains(" Population that ever hit this state: 1 (100.00%)"));
        assert!(text.contains(" Total duration: 2.00 years (About "));
        assert!(text.contains(" --> Done : 1 = 100.00%"));
        assert!(text.contains("Checkup:\n Never reached\n"));
    }

    #[test]
    fn test_report_serializes() {
        let metrics = TransitionMetrics::new();
        metrics.record(&person_with_path(0, "waiting", &[("Initial", 0)], true), 0);
        let value = serde_json::to_value(metrics.report(&report_registry(), 1)).unwrap();
        assert_eq!(value["total_population"], 1);
        assert_eq!(value["modules"][0]["states"][0]["name"], "Initial");
    }

    proptest! {
        #[test]
        fn prop_counters_are_consistent(paths in prop::collection::vec(
            prop::collection::vec(0usize..4, 1..12), 1..20)
        ) {
            const STATES: [&str; 4] = ["A", "B", "C", "D"];
            let metrics = TransitionMetrics::new();
            for (index, path) in paths.iter().enumerate() {
                let steps: Vec<(&str, i64)> = path
                    .iter()
                    .enumerate()
                    .map(|(t, s)| (STATES[*s], t as i64))
                    .collect();
                metrics.record(&person_with_path(index, "m", &steps, index % 2 == 0), 100);
            }

            let total = paths.len() as u64;
            let mut current_sum = 0;
            for state in STATES {
                if let Some(m) = metrics.metric("m", state) {
                    prop_assert!(m.population <= total);
                    prop_assert!(m.current <= m.population);
                    prop_assert!(m.population <= m.entered);
                    let transitions: u64 = m.destinations.values().sum();
                    prop_assert_eq!(transitions, m.entered - m.current);
                    current_sum += m.current;
                }
            }
            prop_assert_eq!(current_sum, total);
        }
    }
}
