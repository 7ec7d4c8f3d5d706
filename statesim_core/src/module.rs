//! The immutable module graph: modules, states and transitions.
//!
//! A [`Module`] is built once by the loader (see [`crate::source`]) and is
//! never mutated afterwards. It is shared by every worker through an
//! `Arc<ModuleRegistry>` without synchronization.

use crate::attribute::AttributeValue;
use crate::condition::Condition;
use crate::time::TimeUnit;

use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use std::collections::HashMap;

/// Name of the state every module starts in.
pub const ENTRY_STATE: &str = "Initial";

/// A named state graph.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    submodule: bool,
    states: Vec<State>,
    index: HashMap<String, usize>,
}

impl Module {
    /// Assembles a module from already-validated states.
    pub(crate) fn new(name: String, submodule: bool, states: Vec<State>) -> Self {
        let index = states
            .iter()
            .enumerate()
            .map(|(i, state)| (state.name.clone(), i))
            .collect();
        Self {
            name,
            submodule,
            states,
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submodules only run when another module calls them.
    pub fn is_submodule(&self) -> bool {
        self.submodule
    }

    /// Name of the entry state.
    pub fn entry_state(&self) -> &str {
        ENTRY_STATE
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.index.get(name).map(|&i| &self.states[i])
    }

    /// States in declaration order.
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    /// State names in declaration order.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.name.as_str())
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}

/// One node of a module graph.
#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    pub kind: StateKind,
    /// `None` only for terminal states.
    pub transition: Option<Transition>,
}

/// The closed set of state kinds the interpreter knows how to execute.
#[derive(Debug, Clone)]
pub enum StateKind {
    Initial,
    Terminal,
    Guard {
        condition: Condition,
    },
    Delay {
        duration: DelaySpec,
    },
    Encounter {
        encounter_type: String,
        wellness: bool,
    },
    SetAttribute {
        attribute: String,
        value: Option<AttributeValue>,
    },
    CallSubmodule {
        submodule: String,
    },
    Death,
    Simple,
}

impl StateKind {
    /// Short name of the kind, as written in module sources.
    pub fn label(&self) -> &'static str {
        match self {
            StateKind::Initial => "Initial",
            StateKind::Terminal => "Terminal",
            StateKind::Guard { .. } => "Guard",
            StateKind::Delay { .. } => "Delay",
            StateKind::Encounter { .. } => "Encounter",
            StateKind::SetAttribute { .. } => "SetAttribute",
            StateKind::CallSubmodule { .. } => "CallSubmodule",
            StateKind::Death => "Death",
            StateKind::Simple => "Simple",
        }
    }

    /// Kinds that hold a person across ticks, for which time-in-state is meaningful.
    pub fn is_time_bounded(&self) -> bool {
        matches!(self, StateKind::Guard { .. } | StateKind::Delay { .. })
    }

    pub fn is_wellness_encounter(&self) -> bool {
        matches!(self, StateKind::Encounter { wellness: true, .. })
    }
}

/// How a state picks its successor.
#[derive(Debug, Clone)]
pub enum Transition {
    Direct(String),
    Conditional {
        branches: Vec<ConditionalBranch>,
        default: Box<Transition>,
    },
    Distributed(Vec<WeightedBranch>),
    Complex(Vec<ComplexBranch>),
}

#[derive(Debug, Clone)]
pub struct ConditionalBranch {
    pub condition: Condition,
    pub transition: Transition,
}

#[derive(Debug, Clone)]
pub struct WeightedBranch {
    pub weight: f64,
    pub transition: Transition,
}

#[derive(Debug, Clone)]
pub struct ComplexBranch {
    /// `None` always applies.
    pub condition: Option<Condition>,
    pub transition: Transition,
}

impl Transition {
    /// Every state name this transition can lead to, nested branches included.
    pub fn targets(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_targets(&mut out);
        out
    }

    fn collect_targets<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Transition::Direct(target) => out.push(target),
            Transition::Conditional { branches, default } => {
                for branch in branches {
                    branch.transition.collect_targets(out);
                }
                default.collect_targets(out);
            }
            Transition::Distributed(branches) => {
                for branch in branches {
                    branch.transition.collect_targets(out);
                }
            }
            Transition::Complex(branches) => {
                for branch in branches {
                    branch.transition.collect_targets(out);
                }
            }
        }
    }
}

/// How long a Delay state holds a person.
#[derive(Debug, Clone, PartialEq)]
pub enum DelaySpec {
    Exact {
        quantity: f64,
        unit: TimeUnit,
    },
    /// Uniform over `[low, high]`.
    Range {
        low: f64,
        high: f64,
        unit: TimeUnit,
    },
    /// Normal distribution, clamped at zero.
    Gaussian {
        mean: f64,
        standard_deviation: f64,
        unit: TimeUnit,
    },
    Exponential {
        mean: f64,
        unit: TimeUnit,
    },
}

impl DelaySpec {
    /// Samples a duration in milliseconds from the person's random stream.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        let (quantity, unit) = match self {
            DelaySpec::Exact { quantity, unit } => (*quantity, *unit),
            DelaySpec::Range { low, high, unit } => {
                if high > low {
                    (rng.gen_range(*low..=*high), *unit)
                } else {
                    (*low, *unit)
                }
            }
            DelaySpec::Gaussian {
                mean,
                standard_deviation,
                unit,
            } => {
                let sample = Normal::new(*mean, *standard_deviation)
                    .map(|normal| normal.sample(rng))
                    .unwrap_or(*mean);
                (sample.max(0.0), *unit)
            }
            DelaySpec::Exponential { mean, unit } => {
                let sample = Exp::new(1.0 / *mean)
                    .map(|exp| exp.sample(rng))
                    .unwrap_or(*mean);
                (sample, *unit)
            }
        };
        unit.to_millis(quantity)
    }

    /// Returns a reason this delay cannot be sampled, if any.
    pub(crate) fn check(&self) -> Option<String> {
        match self {
            DelaySpec::Exact { quantity, .. } if !(quantity.is_finite() && *quantity >= 0.0) => {
                Some(format!("exact quantity {} must be a non-negative number", quantity))
            }
            DelaySpec::Range { low, high, .. } if !(*low >= 0.0 && high >= low && high.is_finite()) => {
                Some(format!("range [{}, {}] must satisfy 0 <= low <= high", low, high))
            }
            DelaySpec::Gaussian {
                mean,
                standard_deviation,
                ..
            } if !(mean.is_finite() && *standard_deviation >= 0.0 && standard_deviation.is_finite()) => {
                Some(format!(
                    "gaussian(mean={}, sd={}) needs a finite mean and non-negative sd",
                    mean, standard_deviation
                ))
            }
            DelaySpec::Exponential { mean, .. } if !(mean.is_finite() && *mean > 0.0) => {
                Some(format!("exponential mean {} must be positive", mean))
            }
            _ => None,
        }
    }
}
