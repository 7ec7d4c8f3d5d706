//! Age-banded wellness visit schedule.
//!
//! [`WellnessSchedule`] is the default [`EncounterManager`]: it opens a
//! person's wellness window on the tick a checkup is due, closes it at the
//! end of that tick and schedules the next checkup from the person's age.
//! The schedule is kept in the person's attributes, so one instance is
//! shared by every worker.

use statesim_core::time::{MONTH_MS, YEAR_MS};
use statesim_core::{EncounterManager, Person, Timestamp};

use tracing::trace;

/// Attribute holding the time the next wellness visit is due.
pub const NEXT_WELLNESS: &str = "next_wellness";

/// Attribute counting recorded encounters.
pub const ENCOUNTERS: &str = "encounters";

/// Wellness schedule by age.
#[derive(Debug, Default, Clone, Copy)]
pub struct WellnessSchedule;

impl WellnessSchedule {
    /// Time between wellness visits for someone `age` milliseconds old.
    pub fn interval(age: i64) -> i64 {
        match age {
            a if a <= MONTH_MS => MONTH_MS,
            a if a <= 5 * MONTH_MS => 2 * MONTH_MS,
            a if a <= 17 * MONTH_MS => 3 * MONTH_MS,
            a if a < 3 * YEAR_MS => 6 * MONTH_MS,
            a if a <= 19 * YEAR_MS => YEAR_MS,
            a if a <= 39 * YEAR_MS => 3 * YEAR_MS,
            a if a <= 49 * YEAR_MS => 2 * YEAR_MS,
            _ => YEAR_MS,
        }
    }

    fn next_due(person: &Person) -> Timestamp {
        person
            .attribute(NEXT_WELLNESS)
            .and_then(|v| v.as_number())
            .map_or(person.birth(), |due| due as Timestamp)
    }
}

impl EncounterManager for WellnessSchedule {
    fn open_wellness_window(&self, person: &mut Person, time: Timestamp) {
        if time >= Self::next_due(person) {
            person.open_wellness_window(time);
        }
    }

    fn close_wellness_window(&self, person: &mut Person, time: Timestamp) {
        if let Some(opened) = person.close_wellness_window() {
            let next = opened + Self::interval(person.age_millis(opened));
            trace!("person {} next wellness visit at {} (closed at {})", person.index(), next, time);
            person.set_attribute(NEXT_WELLNESS, next as f64);
        }
    }

    fn record_encounter(&self, person: &mut Person, encounter_type: &str, wellness: bool, time: Timestamp) {
        let count = person.attribute(ENCOUNTERS).and_then(|v| v.as_number()).unwrap_or(0.0);
        person.set_attribute(ENCOUNTERS, count + 1.0);
        trace!(
            "person {} encounter '{}' (wellness: {}) at {}",
            person.index(),
            encounter_type,
            wellness,
            time
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statesim_core::time::{days, years};

    #[test]
    fn test_interval_bands() {
        assert_eq!(WellnessSchedule::interval(days(10)), MONTH_MS);
        assert_eq!(WellnessSchedule::interval(4 * MONTH_MS), 2 * MONTH_MS);
        assert_eq!(WellnessSchedule::interval(12 * MONTH_MS), 3 * MONTH_MS);
        assert_eq!(WellnessSchedule::interval(years(2)), 6 * MONTH_MS);
        assert_eq!(WellnessSchedule::interval(years(3)), YEAR_MS);
        assert_eq!(WellnessSchedule::interval(years(19)), YEAR_MS);
        assert_eq!(WellnessSchedule::interval(years(30)), 3 * YEAR_MS);
        assert_eq!(WellnessSchedule::interval(years(45)), 2 * YEAR_MS);
        assert_eq!(WellnessSchedule::interval(years(70)), YEAR_MS);
    }

    #[test]
    fn test_window_opens_when_due() {
        let schedule = WellnessSchedule;
        let mut person = Person::new(0, 1);
        person.set_birth(-years(30));

        schedule.open_wellness_window(&mut person, 0);
        assert_eq!(person.wellness_window(), Some(0));
        schedule.close_wellness_window(&mut person, 0);
        assert_eq!(person.wellness_window(), None);

        let due = years(3) as f64;
        assert_eq!(person.attribute(NEXT_WELLNESS).and_then(|v| v.as_number()), Some(due));

        schedule.open_wellness_window(&mut person, years(1));
        assert_eq!(person.wellness_window(), None);
        schedule.close_wellness_window(&mut person, years(1));

        schedule.open_wellness_window(&mut person, years(3));
        assert_eq!(person.wellness_window(), Some(years(3)));
    }

    #[test]
    fn test_encounters_counted() {
        let schedule = WellnessSchedule;
        let mut person = Person::new(0, 1);
        schedule.record_encounter(&mut person, "ambulatory", false, 0);
        schedule.record_encounter(&mut person, "wellness", true, 0);
        assert_eq!(person.attribute(ENCOUNTERS).and_then(|v| v.as_number()), Some(2.0));
    }
}
