//! Demographics collaborator.
//!
//! Before any module runs, the scheduler asks a [`Demographics`] to fill in
//! a new person's starting attributes and birth time. Draws come from the
//! person's own random stream, so demographics replay with the seed.

use crate::config::PopulationConfig;

use rand::Rng;
use statesim_core::time::{years, YEAR_MS};
use statesim_core::{Person, Timestamp};

/// Assigns starting attributes and a birth time.
pub trait Demographics: Send + Sync {
    /// Sets up `person` and returns its birth time.
    fn assign(&self, person: &mut Person, config: &PopulationConfig) -> Timestamp;
}

/// Gender by a fixed male ratio, age uniform over a range of years at the stop time.
///
/// Sets the `gender` ("M" or "F") and `age_at_start` (whole years)
/// attributes.
#[derive(Debug, Clone)]
pub struct UniformAgeDemographics {
    /// Probability a person is male; out-of-range values are clamped and
    /// non-finite ones read as 0.5
    pub male_ratio: f64,

    /// Youngest age in years at the stop time
    pub min_age_years: i64,

    /// Oldest age in years at the stop time
    pub max_age_years: i64,
}

impl Default for UniformAgeDemographics {
    fn default() -> Self {
        Self {
            male_ratio: 0.5,
            min_age_years: 0,
            max_age_years: 90,
        }
    }
}

impl UniformAgeDemographics {
    pub fn with_age_range(mut self, min_age_years: i64, max_age_years: i64) -> Self {
        self.min_age_years = min_age_years;
        self.max_age_years = max_age_years;
        self
    }

    pub fn with_male_ratio(mut self, male_ratio: f64) -> Self {
        self.male_ratio = male_ratio;
        self
    }
}

impl Demographics for UniformAgeDemographics {
    fn assign(&self, person: &mut Person, config: &PopulationConfig) -> Timestamp {
        let ratio = if self.male_ratio.is_finite() { self.male_ratio.clamp(0.0, 1.0) } else { 0.5 };
        let male = person.rng().gen_bool(ratio);
        person.set_attribute("gender", if male { "M" } else { "F" });

        let low = years(self.min_age_years.max(0));
        let high = years(self.max_age_years).max(low);
        let age = person.rng().gen_range(low..=high);
        person.set_attribute("age_at_start", age / YEAR_MS);

        config.stop - age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_within_range() {
        let demographics = UniformAgeDemographics::default().with_age_range(20, 30);
        let config = PopulationConfig::default();

        for seed in 0..50 {
            let mut person = Person::new(0, seed);
            let birth = demographics.assign(&mut person, &config);
            let age = config.stop - birth;
            assert!(age >= years(20) && age <= years(30));

            let age_years = person.attribute("age_at_start").and_then(|v| v.as_number()).unwrap();
            assert!((20.0..=30.0).contains(&age_years));
            let gender = person.attribute("gender").and_then(|v| v.as_text()).unwrap();
            assert!(gender == "M" || gender == "F");
        }
    }

    #[test]
    fn test_male_ratio_extremes() {
        let config = PopulationConfig::default();
        let all_male = UniformAgeDemographics::default().with_male_ratio(1.0);
        let mut person = Person::new(0, 9);
        all_male.assign(&mut person, &config);
        assert_eq!(person.attribute("gender").and_then(|v| v.as_text()), Some("M"));

        let all_female = UniformAgeDemographics::default().with_male_ratio(0.0);
        let mut person = Person::new(0, 9);
        all_female.assign(&mut person, &config);
        assert_eq!(person.attribute("gender").and_then(|v| v.as_text()), Some("F"));
    }

    #[test]
    fn test_non_finite_male_ratio_reads_as_even() {
        let config = PopulationConfig::default();
        for ratio in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let demographics = UniformAgeDemographics::default().with_male_ratio(ratio);
            let mut odd = Person::new(0, 31);
            let mut even = Person::new(0, 31);
            demographics.assign(&mut odd, &config);
            UniformAgeDemographics::default().assign(&mut even, &config);
            assert_eq!(odd.attributes(), even.attributes());
        }
    }

    #[test]
    fn test_same_seed_same_person() {
        let demographics = UniformAgeDemographics::default();
        let config = PopulationConfig::default();
        let mut a = Person::new(0, 77);
        let mut b = Person::new(0, 77);
        assert_eq!(demographics.assign(&mut a, &config), demographics.assign(&mut b, &config));
        assert_eq!(a.attributes(), b.attributes());
    }
}
