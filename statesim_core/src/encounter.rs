//! Encounter-management collaborator.
//!
//! The interpreter does not know how encounters are scheduled or recorded.
//! It reports encounter states through [`EncounterManager`], and wellness
//! encounter states hold until the manager has opened the person's wellness
//! window for the current tick.

use crate::person::Person;
use crate::time::Timestamp;

/// Opens and closes wellness windows and records encounters.
///
/// Implementations are shared by all workers, so they keep per-person state
/// on the [`Person`] (attributes or the wellness window), never on `self`.
pub trait EncounterManager: Send + Sync {
    /// Called at the start of every tick, before any module runs.
    fn open_wellness_window(&self, person: &mut Person, time: Timestamp);

    /// Called at the end of every tick, after every module ran.
    fn close_wellness_window(&self, person: &mut Person, time: Timestamp);

    /// Called when an Encounter state is processed.
    fn record_encounter(&self, person: &mut Person, encounter_type: &str, wellness: bool, time: Timestamp);
}

/// An encounter manager that never opens a wellness window.
///
/// Wellness encounter states hold forever under this manager; ordinary
/// encounters pass straight through.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEncounters;

impl EncounterManager for NoEncounters {
    fn open_wellness_window(&self, _person: &mut Person, _time: Timestamp) {}

    fn close_wellness_window(&self, person: &mut Person, _time: Timestamp) {
        person.close_wellness_window();
    }

    fn record_encounter(&self, _person: &mut Person, _encounter_type: &str, _wellness: bool, _time: Timestamp) {}
}
