//! Per-person mutable simulation context.
//!
//! A [`Person`] owns everything the interpreter mutates while running
//! modules for one simulated individual:
//! - An attribute store
//! - A seeded ChaCha8 random stream (never seeded from the wall clock)
//! - Alive/dead status
//! - One [`ModuleHistory`] per module ever entered
//! - One [`ModuleRun`] per top-level module, holding the submodule call stack
//!
//! A person is owned by exactly one worker for its whole life and is never
//! shared across threads.

use crate::attribute::AttributeValue;
use crate::time::Timestamp;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use uuid::Uuid;

/// One visit to a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state: String,
    pub entered: Timestamp,
    /// `None` while this is the person's current state.
    pub exited: Option<Timestamp>,
}

impl HistoryEntry {
    pub fn is_open(&self) -> bool {
        self.exited.is_none()
    }

    /// Time spent in the state, using `end` for a still-open entry.
    pub fn duration(&self, end: Timestamp) -> i64 {
        self.exited.unwrap_or(end) - self.entered
    }
}

/// The visits of one person to the states of one module, most recent first.
///
/// Index 0 is the current (or last) state; the last index is the module's
/// entry state. Only index 0 may be open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleHistory {
    entries: VecDeque<HistoryEntry>,
}

impl ModuleHistory {
    /// The most recent entry.
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    /// Entries from most recent to oldest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_state(&self, state: &str) -> bool {
        self.entries.iter().any(|e| e.state == state)
    }

    /// State names from oldest to newest.
    pub fn path(&self) -> Vec<&str> {
        self.entries.iter().rev().map(|e| e.state.as_str()).collect()
    }

    /// Opens a new current entry. Any still-open entry is closed at `now` first.
    pub(crate) fn enter(&mut self, state: &str, now: Timestamp) {
        self.close_current(now);
        self.entries.push_front(HistoryEntry {
            state: state.to_string(),
            entered: now,
            exited: None,
        });
    }

    /// Closes the current entry if it is open.
    pub(crate) fn close_current(&mut self, now: Timestamp) {
        if let Some(entry) = self.entries.front_mut() {
            if entry.exited.is_none() {
                entry.exited = Some(now.max(entry.entered));
            }
        }
    }
}

/// A suspended caller waiting for a submodule to finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrame {
    /// Module that issued the call.
    pub module: String,
    /// CallSubmodule state to resume at once the callee terminates.
    pub return_state: String,
}

/// Execution pointer for one top-level module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRun {
    /// Module whose current state is being executed (the top-level module or a callee).
    pub(crate) active: String,
    pub(crate) stack: Vec<CallFrame>,
    /// Wake time of the Delay state the active module is holding in.
    pub(crate) wake_at: Option<Timestamp>,
}

impl ModuleRun {
    pub(crate) fn new(module: &str) -> Self {
        Self {
            active: module.to_string(),
            stack: Vec::new(),
            wake_at: None,
        }
    }

    pub fn active_module(&self) -> &str {
        &self.active
    }

    pub fn call_stack(&self) -> &[CallFrame] {
        &self.stack
    }
}

/// One simulated individual.
#[derive(Debug)]
pub struct Person {
    index: usize,
    id: Uuid,
    seed: u64,
    rng: ChaCha8Rng,
    birth: Timestamp,
    death: Option<Timestamp>,
    attributes: BTreeMap<String, AttributeValue>,
    histories: BTreeMap<String, ModuleHistory>,
    runs: HashMap<String, ModuleRun>,
    wellness_window: Option<Timestamp>,
}

impl Person {
    /// Creates a person at population `index` with its own random stream.
    pub fn new(index: usize, seed: u64) -> Self {
        Self {
            index,
            id: person_id(seed),
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            birth: 0,
            death: None,
            attributes: BTreeMap::new(),
            histories: BTreeMap::new(),
            runs: HashMap::new(),
            wellness_window: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The person's private random stream.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn birth(&self) -> Timestamp {
        self.birth
    }

    pub fn set_birth(&mut self, birth: Timestamp) {
        self.birth = birth;
    }

    pub fn age_millis(&self, now: Timestamp) -> i64 {
        now - self.birth
    }

    /// Whether the person is alive at `time`.
    pub fn alive(&self, time: Timestamp) -> bool {
        self.death.map_or(true, |death| death > time)
    }

    pub fn death(&self) -> Option<Timestamp> {
        self.death
    }

    /// Records the time of death. The first recorded death wins.
    pub fn record_death(&mut self, time: Timestamp) {
        if self.death.is_none() {
            self.death = Some(time);
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn history(&self, module: &str) -> Option<&ModuleHistory> {
        self.histories.get(module)
    }

    /// Every module history, keyed by module name.
    pub fn histories(&self) -> &BTreeMap<String, ModuleHistory> {
        &self.histories
    }

    pub(crate) fn history_mut(&mut self, module: &str) -> &mut ModuleHistory {
        self.histories.entry(module.to_string()).or_default()
    }

    /// Execution pointer of a top-level module, if it has started.
    pub fn run(&self, module: &str) -> Option<&ModuleRun> {
        self.runs.get(module)
    }

    pub(crate) fn run_mut(&mut self, module: &str) -> &mut ModuleRun {
        self.runs
            .entry(module.to_string())
            .or_insert_with(|| ModuleRun::new(module))
    }

    /// Time the current wellness window opened, if one is open.
    pub fn wellness_window(&self) -> Option<Timestamp> {
        self.wellness_window
    }

    pub fn open_wellness_window(&mut self, time: Timestamp) {
        self.wellness_window = Some(time);
    }

    pub fn close_wellness_window(&mut self) -> Option<Timestamp> {
        self.wellness_window.take()
    }
}

/// Derives a stable identifier from a person's seed.
fn person_id(seed: u64) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes[0..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_history_most_recent_first() {
        let mut history = ModuleHistory::default();
        history.enter("Initial", 0);
        history.enter("Wait", 0);
        history.enter("Done", 5);

        assert_eq!(history.current().unwrap().state, "Done");
        assert_eq!(history.get(2).unwrap().state, "Initial");
        assert_eq!(history.path(), vec!["Initial", "Wait", "Done"]);
        assert_eq!(history.get(1).unwrap().exited, Some(5));
        assert!(history.current().unwrap().is_open());
        assert_eq!(history.iter().filter(|e| e.is_open()).count(), 1);
    }

    #[test]
    fn test_close_never_precedes_entry() {
        let mut history = ModuleHistory::default();
        history.enter("A", 10);
        history.close_current(3);
        assert_eq!(history.current().unwrap().exited, Some(10));
    }

    #[test]
    fn test_alive_and_death() {
        let mut person = Person::new(0, 1);
        assert!(person.alive(100));
        person.record_death(50);
        person.record_death(70);
        assert_eq!(person.death(), Some(50));
        assert!(person.alive(49));
        assert!(!person.alive(50));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = Person::new(0, 99);
        let mut b = Person::new(5, 99);
        let xs: Vec<u64> = (0..4).map(|_| a.rng().gen()).collect();
        let ys: Vec<u64> = (0..4).map(|_| b.rng().gen()).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.id(), b.id());
        assert_ne!(Person::new(0, 100).id(), a.id());
    }

    #[test]
    fn test_wellness_window() {
        let mut person = Person::new(0, 1);
        assert_eq!(person.wellness_window(), None);
        person.open_wellness_window(20);
        assert_eq!(person.wellness_window(), Some(20));
        assert_eq!(person.close_wellness_window(), Some(20));
        assert_eq!(person.wellness_window(), None);
    }
}
