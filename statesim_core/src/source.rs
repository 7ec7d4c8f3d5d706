//! Module definition sources and load-time validation.
//!
//! Modules are JSON documents. Parsing produces a [`ModuleSource`], which
//! [`ModuleSource::build`] validates and converts into an immutable
//! [`Module`]. Any validation failure rejects the whole module.
//!
//! ```text
//! { "name": "example",
//!   "states": {
//!     "Initial": { "type": "Initial", "direct_transition": "Done" },
//!     "Done":    { "type": "Terminal" } } }
//! ```

use crate::attribute::AttributeValue;
use crate::condition::Condition;
use crate::error::GraphValidationError;
use crate::module::{
    ComplexBranch, ConditionalBranch, DelaySpec, Module, State, StateKind, Transition, WeightedBranch, ENTRY_STATE,
};
use crate::time::TimeUnit;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// Parses and validates a single module from JSON text.
pub fn load(text: &str) -> Result<Module, GraphValidationError> {
    ModuleSource::from_json(text)?.build()
}

/// A module as written on disk, before validation.
#[derive(Debug, Deserialize)]
pub struct ModuleSource {
    pub name: String,
    #[serde(default)]
    pub submodule: bool,
    pub states: StateTable,
}

/// State definitions in declaration order.
///
/// Unlike a map, this keeps duplicate names so validation can reject them.
#[derive(Debug, Default)]
pub struct StateTable(pub Vec<(String, StateSource)>);

impl<'de> Deserialize<'de> for StateTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = StateTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of state names to state definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<StateTable, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, state)) = map.next_entry::<String, StateSource>()? {
                    entries.push((name, state));
                }
                Ok(StateTable(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

#[derive(Debug, Deserialize)]
pub struct StateSource {
    #[serde(flatten)]
    pub kind: KindSource,
    #[serde(flatten)]
    pub transition: TransitionFields,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum KindSource {
    Initial,
    Terminal,
    Guard {
        allow: Condition,
    },
    Delay {
        exact: Option<QuantitySource>,
        range: Option<RangeSource>,
        gaussian: Option<GaussianSource>,
        exponential: Option<ExponentialSource>,
    },
    Encounter {
        encounter_class: String,
        #[serde(default)]
        wellness: bool,
    },
    SetAttribute {
        attribute: String,
        #[serde(default)]
        value: Option<AttributeValue>,
    },
    CallSubmodule {
        submodule: String,
    },
    Death,
    Simple,
}

#[derive(Debug, Deserialize)]
pub struct QuantitySource {
    pub quantity: f64,
    pub unit: TimeUnit,
}

#[derive(Debug, Deserialize)]
pub struct RangeSource {
    pub low: f64,
    pub high: f64,
    pub unit: TimeUnit,
}

#[derive(Debug, Deserialize)]
pub struct GaussianSource {
    pub mean: f64,
    pub standard_deviation: f64,
    pub unit: TimeUnit,
}

#[derive(Debug, Deserialize)]
pub struct ExponentialSource {
    pub mean: f64,
    pub unit: TimeUnit,
}

/// The four transition forms; a valid definition sets exactly one.
#[derive(Debug, Default, Deserialize)]
pub struct TransitionFields {
    pub direct_transition: Option<String>,
    pub conditional_transition: Option<Vec<ConditionalSource>>,
    pub distributed_transition: Option<Vec<DistributedSource>>,
    pub complex_transition: Option<Vec<ComplexSource>>,
}

impl TransitionFields {
    fn forms(&self) -> usize {
        [
            self.direct_transition.is_some(),
            self.conditional_transition.is_some(),
            self.distributed_transition.is_some(),
            self.complex_transition.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// Either a state name or a nested transition.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TransitionSource {
    Target(String),
    Nested(TransitionFields),
}

#[derive(Debug, Deserialize)]
pub struct ConditionalSource {
    #[serde(default)]
    pub condition: Option<Condition>,
    pub transition: TransitionSource,
}

#[derive(Debug, Deserialize)]
pub struct DistributedSource {
    pub distribution: f64,
    pub transition: TransitionSource,
}

#[derive(Debug, Deserialize)]
pub struct ComplexSource {
    #[serde(default)]
    pub condition: Option<Condition>,
    pub transition: TransitionSource,
}

/// Module and state names for error reporting.
struct Site<'a> {
    module: &'a str,
    state: &'a str,
}

impl Site<'_> {
    fn missing_transition(&self) -> GraphValidationError {
        GraphValidationError::MissingTransition {
            module: self.module.to_string(),
            state: self.state.to_string(),
        }
    }

    fn ambiguous(&self, reason: &str) -> GraphValidationError {
        GraphValidationError::AmbiguousTransition {
            module: self.module.to_string(),
            state: self.state.to_string(),
            reason: reason.to_string(),
        }
    }

    fn distribution(&self, reason: String) -> GraphValidationError {
        GraphValidationError::InvalidDistribution {
            module: self.module.to_string(),
            state: self.state.to_string(),
            reason,
        }
    }

    fn condition(&self, condition: &Condition) -> Result<(), GraphValidationError> {
        match condition.check() {
            Some(reason) => Err(GraphValidationError::InvalidCondition {
                module: self.module.to_string(),
                state: self.state.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl ModuleSource {
    pub fn from_json(text: &str) -> Result<Self, GraphValidationError> {
        serde_json::from_str(text).map_err(|e| GraphValidationError::Parse(e.to_string()))
    }

    /// Validates the definition and converts it into an immutable module.
    pub fn build(self) -> Result<Module, GraphValidationError> {
        let module_name = self.name;

        let mut declared = HashSet::with_capacity(self.states.0.len());
        for (name, _) in &self.states.0 {
            if !declared.insert(name.clone()) {
                return Err(GraphValidationError::DuplicateState {
                    module: module_name,
                    state: name.clone(),
                });
            }
        }

        if !declared.contains(ENTRY_STATE) {
            return Err(GraphValidationError::MissingEntry {
                module: module_name,
                entry: ENTRY_STATE.to_string(),
            });
        }

        let mut states = Vec::with_capacity(self.states.0.len());
        for (name, source) in self.states.0 {
            let site = Site {
                module: &module_name,
                state: &name,
            };
            let kind = build_kind(&site, source.kind)?;
            let transition = match kind {
                StateKind::Terminal => {
                    if source.transition.forms() > 0 {
                        return Err(GraphValidationError::UnexpectedTransition {
                            module: module_name.clone(),
                            state: name.clone(),
                        });
                    }
                    None
                }
                _ => Some(build_transition(&site, source.transition)?.ok_or_else(|| site.missing_transition())?),
            };

            if let Some(transition) = &transition {
                if let Some(target) = transition.targets().into_iter().find(|t| !declared.contains(*t)) {
                    return Err(GraphValidationError::UndefinedTarget {
                        module: module_name.clone(),
                        state: name.clone(),
                        target: target.to_string(),
                    });
                }
            }

            states.push(State { name, kind, transition });
        }

        Ok(Module::new(module_name, self.submodule, states))
    }
}

fn build_kind(site: &Site<'_>, kind: KindSource) -> Result<StateKind, GraphValidationError> {
    let kind = match kind {
        KindSource::Initial => StateKind::Initial,
        KindSource::Terminal => StateKind::Terminal,
        KindSource::Guard { allow } => {
            site.condition(&allow)?;
            StateKind::Guard { condition: allow }
        }
        KindSource::Delay {
            exact,
            range,
            gaussian,
            exponential,
        } => {
            let mut forms = Vec::new();
            if let Some(q) = exact {
                forms.push(DelaySpec::Exact {
                    quantity: q.quantity,
                    unit: q.unit,
                });
            }
            if let Some(r) = range {
                forms.push(DelaySpec::Range {
                    low: r.low,
                    high: r.high,
                    unit: r.unit,
                });
            }
            if let Some(g) = gaussian {
                forms.push(DelaySpec::Gaussian {
                    mean: g.mean,
                    standard_deviation: g.standard_deviation,
                    unit: g.unit,
                });
            }
            if let Some(e) = exponential {
                forms.push(DelaySpec::Exponential {
                    mean: e.mean,
                    unit: e.unit,
                });
            }
            if forms.len() != 1 {
                return Err(GraphValidationError::InvalidDelay {
                    module: site.module.to_string(),
                    state: site.state.to_string(),
                    reason: "expected exactly one of exact, range, gaussian, exponential".to_string(),
                });
            }
            let duration = forms.remove(0);
            if let Some(reason) = duration.check() {
                return Err(GraphValidationError::InvalidDelay {
                    module: site.module.to_string(),
                    state: site.state.to_string(),
                    reason,
                });
            }
            StateKind::Delay { duration }
        }
        KindSource::Encounter {
            encounter_class,
            wellness,
        } => StateKind::Encounter {
            encounter_type: encounter_class,
            wellness,
        },
        KindSource::SetAttribute { attribute, value } => StateKind::SetAttribute { attribute, value },
        KindSource::CallSubmodule { submodule } => StateKind::CallSubmodule { submodule },
        KindSource::Death => StateKind::Death,
        KindSource::Simple => StateKind::Simple,
    };
    Ok(kind)
}

fn build_transition(site: &Site<'_>, fields: TransitionFields) -> Result<Option<Transition>, GraphValidationError> {
    match fields.forms() {
        0 => return Ok(None),
        1 => {}
        _ => return Err(site.ambiguous("more than one transition form declared")),
    }

    if let Some(target) = fields.direct_transition {
        return Ok(Some(Transition::Direct(target)));
    }

    if let Some(entries) = fields.conditional_transition {
        let last = entries.len().saturating_sub(1);
        let mut branches = Vec::with_capacity(entries.len());
        let mut default = None;
        for (i, entry) in entries.into_iter().enumerate() {
            let transition = build_nested(site, entry.transition)?;
            match entry.condition {
                Some(condition) => {
                    site.condition(&condition)?;
                    branches.push(ConditionalBranch { condition, transition });
                }
                None if i == last => default = Some(transition),
                None => return Err(site.ambiguous("unconditioned default must be the last branch")),
            }
        }
        let default = default.ok_or_else(|| GraphValidationError::MissingDefault {
            module: site.module.to_string(),
            state: site.state.to_string(),
        })?;
        return Ok(Some(Transition::Conditional {
            branches,
            default: Box::new(default),
        }));
    }

    if let Some(entries) = fields.distributed_transition {
        if entries.is_empty() {
            return Err(site.distribution("no branches".to_string()));
        }
        let mut branches = Vec::with_capacity(entries.len());
        let mut total = 0.0;
        for entry in entries {
            if !(entry.distribution.is_finite() && entry.distribution >= 0.0) {
                return Err(site.distribution(format!("weight {} is not a non-negative number", entry.distribution)));
            }
            total += entry.distribution;
            branches.push(WeightedBranch {
                weight: entry.distribution,
                transition: build_nested(site, entry.transition)?,
            });
        }
        if total <= 0.0 {
            return Err(site.distribution("weights sum to zero".to_string()));
        }
        return Ok(Some(Transition::Distributed(branches)));
    }

    if let Some(entries) = fields.complex_transition {
        if entries.is_empty() {
            return Err(site.missing_transition());
        }
        let mut branches = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(condition) = &entry.condition {
                site.condition(condition)?;
            }
            branches.push(ComplexBranch {
                condition: entry.condition,
                transition: build_nested(site, entry.transition)?,
            });
        }
        return Ok(Some(Transition::Complex(branches)));
    }

    Ok(None)
}

fn build_nested(site: &Site<'_>, source: TransitionSource) -> Result<Transition, GraphValidationError> {
    match source {
        TransitionSource::Target(target) => Ok(Transition::Direct(target)),
        TransitionSource::Nested(fields) => build_transition(site, fields)?.ok_or_else(|| site.missing_transition()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load_value(value: serde_json::Value) -> Result<Module, GraphValidationError> {
        load(&value.to_string())
    }

    #[test]
    fn test_load_minimal_module() {
        let module = load_value(json!({
            "name": "minimal",
            "states": {
                "Initial": { "type": "Initial", "direct_transition": "Done" },
                "Done": { "type": "Terminal" }
            }
        }))
        .unwrap();

        assert_eq!(module.name(), "minimal");
        assert!(!module.is_submodule());
        assert_eq!(module.state_names().collect::<Vec<_>>(), vec!["Initial", "Done"]);
        assert!(module.state("Done").unwrap().transition.is_none());
    }

    #[test]
    fn test_dangling_reference_fails() {
        let err = load_value(json!({
            "name": "dangling",
            "states": {
                "Initial": { "type": "Initial", "direct_transition": "Nowhere" },
                "Done": { "type": "Terminal" }
            }
        }))
        .unwrap_err();

        match err {
            GraphValidationError::UndefinedTarget { module, state, target } => {
                assert_eq!(module, "dangling");
                assert_eq!(state, "Initial");
                assert_eq!(target, "Nowhere");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nested_dangling_reference_fails() {
        let err = load_value(json!({
            "name": "nested",
            "states": {
                "Initial": { "type": "Initial", "complex_transition": [
                    { "condition": { "condition_type": "True" },
                      "transition": { "distributed_transition": [
                          { "distribution": 1.0, "transition": "Ghost" } ] } }
                ] },
                "Done": { "type": "Terminal" }
            }
        }))
        .unwrap_err();
        assert!(matches!(err, GraphValidationError::UndefinedTarget { ref target, .. } if target == "Ghost"));
    }

    #[test]
    fn test_missing_entry_fails() {
        let err = load_value(json!({
            "name": "headless",
            "states": { "Done": { "type": "Terminal" } }
        }))
        .unwrap_err();
        assert!(matches!(err, GraphValidationError::MissingEntry { .. }));
    }

    #[test]
    fn test_duplicate_state_fails() {
        let text = r#"{
            "name": "twice",
            "states": {
                "Initial": { "type": "Initial", "direct_transition": "Done" },
                "Done": { "type": "Terminal" },
                "Done": { "type": "Terminal" }
            }
        }"#;
        let err = load(text).unwrap_err();
        assert!(matches!(err, GraphValidationError::DuplicateState { ref state, .. } if state == "Done"));
    }

    #[test]
    fn test_conditional_requires_default() {
        let err = load_value(json!({
            "name": "nodefault",
            "states": {
                "Initial": { "type": "Initial", "conditional_transition": [
                    { "condition": { "condition_type": "True" }, "transition": "Done" }
                ] },
                "Done": { "type": "Terminal" }
            }
        }))
        .unwrap_err();
        assert!(matches!(err, GraphValidationError::MissingDefault { .. }));
    }

    #[test]
    fn test_default_must_be_last() {
        let err = load_value(json!({
            "name": "early_default",
            "states": {
                "Initial": { "type": "Initial", "conditional_transition": [
                    { "transition": "Done" },
                    { "condition": { "condition_type": "True" }, "transition": "Done" }
                ] },
                "Done": { "type": "Terminal" }
            }
        }))
        .unwrap_err();
        assert!(matches!(err, GraphValidationError::AmbiguousTransition { .. }));
    }

    #[test]
    fn test_non_terminal_needs_transition() {
        let err = load_value(json!({
            "name": "stuck",
            "states": {
                "Initial": { "type": "Initial" },
                "Done": { "type": "Terminal" }
            }
        }))
        .unwrap_err();
        assert!(matches!(err, GraphValidationError::MissingTransition { .. }));
    }

    #[test]
    fn test_terminal_rejects_transition() {
        let err = load_value(json!({
            "name": "leaky",
            "states": {
                "Initial": { "type": "Initial", "direct_transition": "Done" },
                "Done": { "type": "Terminal", "direct_transition": "Initial" }
            }
        }))
        .unwrap_err();
        assert!(matches!(err, GraphValidationError::UnexpectedTransition { .. }));
    }

    #[test]
    fn test_zero_weight_distribution_fails() {
        let err = load_value(json!({
            "name": "weightless",
            "states": {
                "Initial": { "type": "Initial", "distributed_transition": [
                    { "distribution": 0.0, "transition": "Done" }
                ] },
                "Done": { "type": "Terminal" }
            }
        }))
        .unwrap_err();
        assert!(matches!(err, GraphValidationError::InvalidDistribution { .. }));
    }

    #[test]
    fn test_delay_needs_one_form() {
        let err = load_value(json!({
            "name": "delays",
            "states": {
                "Initial": { "type": "Initial", "direct_transition": "Wait" },
                "Wait": { "type": "Delay",
                          "exact": { "quantity": 1, "unit": "days" },
                          "range": { "low": 1, "high": 2, "unit": "days" },
                          "direct_transition": "Done" },
                "Done": { "type": "Terminal" }
            }
        }))
        .unwrap_err();
        assert!(matches!(err, GraphValidationError::InvalidDelay { .. }));
    }

    #[test]
    fn test_guard_condition_checked() {
        let err = load_value(json!({
            "name": "guarded",
            "states": {
                "Initial": { "type": "Initial", "direct_transition": "Wait" },
                "Wait": { "type": "Guard",
                          "allow": { "condition_type": "Attribute", "attribute": "a", "operator": ">" },
                          "direct_transition": "Done" },
                "Done": { "type": "Terminal" }
            }
        }))
        .unwrap_err();
        assert!(matches!(err, GraphValidationError::InvalidCondition { .. }));
    }

    #[test]
    fn test_all_state_kinds_parse() {
        let module = load_value(json!({
            "name": "kinds",
            "submodule": true,
            "states": {
                "Initial": { "type": "Initial", "direct_transition": "Set" },
                "Set": { "type": "SetAttribute", "attribute": "flag", "value": "x", "direct_transition": "Wait" },
                "Wait": { "type": "Guard",
                          "allow": { "condition_type": "Attribute", "attribute": "flag", "operator": "==", "value": "x" },
                          "direct_transition": "Pause" },
                "Pause": { "type": "Delay", "range": { "low": 1, "high": 3, "unit": "weeks" }, "direct_transition": "Visit" },
                "Visit": { "type": "Encounter", "encounter_class": "ambulatory", "direct_transition": "Checkup" },
                "Checkup": { "type": "Encounter", "encounter_class": "wellness", "wellness": true, "direct_transition": "Call" },
                "Call": { "type": "CallSubmodule", "submodule": "other", "direct_transition": "Noop" },
                "Noop": { "type": "Simple", "direct_transition": "Die" },
                "Die": { "type": "Death", "direct_transition": "Done" },
                "Done": { "type": "Terminal" }
            }
        }))
        .unwrap();

        assert!(module.is_submodule());
        let labels: Vec<&str> = module.states().map(|s| s.kind.label()).collect();
        assert_eq!(
            labels,
            vec![
                "Initial",
                "SetAttribute",
                "Guard",
                "Delay",
                "Encounter",
                "Encounter",
                "CallSubmodule",
                "Simple",
                "Death",
                "Terminal"
            ]
        );
        assert!(module.state("Checkup").unwrap().kind.is_wellness_encounter());
        assert!(module.state("Pause").unwrap().kind.is_time_bounded());
    }

    #[test]
    fn test_parse_error_reported() {
        assert!(matches!(load("{ not json"), Err(GraphValidationError::Parse(_))));
    }
}
