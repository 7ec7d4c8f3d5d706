//! Aging and natural mortality.
//!
//! [`Lifecycle`] runs at the start of every tick, before any module:
//! - Updates the `age` attribute (whole years since birth)
//! - Draws natural death from an age-banded daily risk, rescaled to the
//!   scheduler's timestep
//!
//! Draws come from the person's own random stream, so deaths replay with
//! the seed.

use rand::Rng;
use statesim_core::time::{DAY_MS, YEAR_MS};
use statesim_core::{Person, Timestamp};
use tracing::debug;

/// Attribute holding the person's age in whole years.
pub const AGE: &str = "age";

/// Converts a risk over `period` milliseconds into the risk over `timestep`.
pub fn convert_risk_to_timestep(risk: f64, period: i64, timestep: i64) -> f64 {
    1.0 - (1.0 - risk).powf(timestep as f64 / period as f64)
}

/// Daily probability of death at `age` years (US all-cause rates).
pub fn daily_death_risk(age: i64) -> f64 {
    match age {
        a if a < 1 => 508.1 / 100_000.0 / 365.0,
        1..=4 => 15.6 / 100_000.0 / 365.0,
        5..=14 => 10.6 / 100_000.0 / 365.0,
        15..=24 => 56.4 / 100_000.0 / 365.0,
        25..=34 => 74.7 / 100_000.0 / 365.0,
        35..=44 => 145.7 / 100_000.0 / 365.0,
        45..=54 => 326.5 / 100_000.0 / 365.0,
        55..=64 => 737.8 / 100_000.0 / 365.0,
        65..=74 => 1817.0 / 100_000.0 / 365.0,
        75..=84 => 4877.3 / 100_000.0 / 365.0,
        85..=94 => 13499.4 / 100_000.0 / 365.0,
        _ => 50_000.0 / 100_000.0 / 365.0,
    }
}

/// Ages people and applies natural mortality.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    /// Whether people can die of natural causes
    pub natural_death: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { natural_death: true }
    }
}

impl Lifecycle {
    /// Aging only; people die only through module Death states.
    pub fn without_mortality() -> Self {
        Self { natural_death: false }
    }

    /// Ages `person` to `time` and draws natural death for the coming timestep.
    pub fn tick(&self, person: &mut Person, time: Timestamp, timestep: i64) {
        let age = person.age_millis(time).max(0) / YEAR_MS;
        person.set_attribute(AGE, age);

        if !self.natural_death {
            return;
        }
        let risk = convert_risk_to_timestep(daily_death_risk(age), DAY_MS, timestep);
        if person.rng().gen::<f64>() < risk {
            debug!("Person {} died of natural causes at age {}", person.index(), age);
            person.record_death(time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use statesim_core::time::{days, years};

    #[test]
    fn test_convert_risk_to_timestep() {
        assert_relative_eq!(convert_risk_to_timestep(0.1, DAY_MS, DAY_MS), 0.1, epsilon = 1e-12);
        // Two independent days at 10% each.
        assert_relative_eq!(convert_risk_to_timestep(0.1, DAY_MS, days(2)), 0.19, epsilon = 1e-12);
        assert_relative_eq!(convert_risk_to_timestep(0.0, DAY_MS, days(7)), 0.0);
    }

    #[test]
    fn test_risk_rises_with_age() {
        assert!(daily_death_risk(0) > daily_death_risk(10));
        assert!(daily_death_risk(30) < daily_death_risk(60));
        assert!(daily_death_risk(90) < daily_death_risk(100));
        assert_relative_eq!(daily_death_risk(0), 0.00001392054794520548, epsilon = 1e-15);
    }

    #[test]
    fn test_age_attribute_follows_time() {
        let lifecycle = Lifecycle::without_mortality();
        let mut person = Person::new(0, 1);
        person.set_birth(years(10));

        lifecycle.tick(&mut person, years(10), days(7));
        assert_eq!(person.attribute(AGE).and_then(|v| v.as_number()), Some(0.0));
        lifecycle.tick(&mut person, years(52) + days(3), days(7));
        assert_eq!(person.attribute(AGE).and_then(|v| v.as_number()), Some(42.0));
        assert_eq!(person.death(), None);
    }

    #[test]
    fn test_seeded_mortality_replays() {
        let lifecycle = Lifecycle::default();
        let death_at = |seed: u64| {
            let mut person = Person::new(0, seed);
            let mut time = 0;
            while person.alive(time) && time < years(150) {
                lifecycle.tick(&mut person, time, days(30));
                time += days(30);
            }
            person.death()
        };

        let deaths: Vec<_> = (0..20).map(death_at).collect();
        assert_eq!(deaths, (0..20).map(death_at).collect::<Vec<_>>());
        // Past 95 the yearly risk is about 50%, so nobody reaches 150.
        assert!(deaths.iter().all(|d| d.is_some()));
    }
}
