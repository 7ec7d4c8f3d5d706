//! The state machine interpreter.
//!
//! [`Interpreter::advance`] runs one module for one person at one tick. It
//! starts at the person's current state for that module and keeps moving
//! until a state holds (a false Guard, a Delay that is not yet due, a
//! wellness encounter without an open window) or a Terminal state is
//! reached. Waiting is never a blocking call: a holding state returns
//! [`Progress::Active`] and is re-evaluated on the next tick.
//!
//! Submodule calls are explicit frames on the person's [`ModuleRun`]
//! (see [`crate::person`]), so a call spanning many ticks resumes exactly
//! where it left off.

use crate::encounter::EncounterManager;
use crate::error::{ExecutionError, RuntimeError};
use crate::module::{State, StateKind, Transition};
use crate::person::{CallFrame, Person};
use crate::registry::ModuleRegistry;
use crate::time::Timestamp;

use rand::Rng;
use tracing::trace;

/// Upper bound on states visited by a single `advance` call.
pub const MAX_STEPS_PER_TICK: usize = 10_000;

/// Outcome of advancing one module for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The module (or a submodule it called) is still running.
    Active,
    /// The module reached a Terminal state.
    Completed,
}

/// What processing the current state asks the interpreter to do next.
enum Step {
    Hold,
    Advance,
    Call(String),
    Terminate,
}

/// Executes modules from a registry against people.
pub struct Interpreter<'a> {
    registry: &'a ModuleRegistry,
    encounters: &'a dyn EncounterManager,
}

impl<'a> Interpreter<'a> {
    pub fn new(registry: &'a ModuleRegistry, encounters: &'a dyn EncounterManager) -> Self {
        Self { registry, encounters }
    }

    /// Advances the top-level `module` for `person` at time `now`.
    pub fn advance(&self, module: &str, person: &mut Person, now: Timestamp) -> Result<Progress, ExecutionError> {
        let mut steps = 0usize;

        loop {
            let active = person.run_mut(module).active.clone();
            let current = self
                .registry
                .get(&active)
                .ok_or_else(|| ExecutionError::new(&active, "", RuntimeError::UnknownModule(active.clone())))?;

            let (state_name, open) = match person.history(&active).and_then(|h| h.current()) {
                Some(entry) => (entry.state.clone(), entry.is_open()),
                None => {
                    person.history_mut(&active).enter(current.entry_state(), now);
                    continue;
                }
            };

            let state = current.state(&state_name).ok_or_else(|| {
                ExecutionError::new(
                    &active,
                    &state_name,
                    RuntimeError::UnknownState {
                        module: active.clone(),
                        state: state_name.clone(),
                    },
                )
            })?;

            if !open {
                // Only a finished Terminal state is ever left closed at index 0.
                return Ok(Progress::Completed);
            }

            steps += 1;
            if steps > MAX_STEPS_PER_TICK {
                return Err(ExecutionError::new(
                    &active,
                    &state_name,
                    RuntimeError::TransitionLoop(MAX_STEPS_PER_TICK),
                ));
            }

            let fail = |e: RuntimeError| ExecutionError::new(&active, &state_name, e);

            match self.process(module, &active, state, person, now).map_err(fail)? {
                Step::Hold => return Ok(Progress::Active),
                Step::Advance => {
                    let next = self.next_state(state, person, &active, now).map_err(fail)?;
                    trace!("{} -> {}/{} at {}", person.index(), active, next, now);
                    person.run_mut(module).wake_at = None;
                    person.history_mut(&active).enter(&next, now);
                }
                Step::Call(submodule) => {
                    let callee = self
                        .registry
                        .get(&submodule)
                        .ok_or_else(|| fail(RuntimeError::UnknownModule(submodule.clone())))?;
                    let run = person.run_mut(module);
                    run.stack.push(CallFrame {
                        module: active.clone(),
                        return_state: state_name.clone(),
                    });
                    run.active = submodule.clone();
                    run.wake_at = None;
                    person.history_mut(&submodule).enter(callee.entry_state(), now);
                }
                Step::Terminate => {
                    person.history_mut(&active).close_current(now);
                    let Some(frame) = person.run_mut(module).stack.pop() else {
                        return Ok(Progress::Completed);
                    };
                    self.resume(module, frame, person, now)?;
                }
            }
        }
    }

    /// Resumes a caller at its CallSubmodule state after the callee terminated.
    fn resume(&self, module: &str, frame: CallFrame, person: &mut Person, now: Timestamp) -> Result<(), ExecutionError> {
        let fail = |e: RuntimeError| ExecutionError::new(&frame.module, &frame.return_state, e);

        let caller = self
            .registry
            .get(&frame.module)
            .ok_or_else(|| fail(RuntimeError::UnknownModule(frame.module.clone())))?;
        let state = caller.state(&frame.return_state).ok_or_else(|| {
            fail(RuntimeError::UnknownState {
                module: frame.module.clone(),
                state: frame.return_state.clone(),
            })
        })?;

        let next = self.next_state(state, person, &frame.module, now).map_err(fail)?;
        let run = person.run_mut(module);
        run.active = frame.module.clone();
        run.wake_at = None;
        person.history_mut(&frame.module).enter(&next, now);
        Ok(())
    }

    fn process(
        &self,
        module: &str,
        active: &str,
        state: &State,
        person: &mut Person,
        now: Timestamp,
    ) -> Result<Step, RuntimeError> {
        let step = match &state.kind {
            StateKind::Initial | StateKind::Simple => Step::Advance,
            StateKind::Terminal => Step::Terminate,
            StateKind::SetAttribute { attribute, value } => {
                match value {
                    Some(value) => person.set_attribute(attribute, value.clone()),
                    None => {
                        person.remove_attribute(attribute);
                    }
                }
                Step::Advance
            }
            StateKind::Death => {
                person.record_death(now);
                Step::Advance
            }
            StateKind::Guard { condition } => {
                if condition.evaluate(person, active, now)? {
                    Step::Advance
                } else {
                    Step::Hold
                }
            }
            StateKind::Delay { duration } => {
                let pending = person.run_mut(module).wake_at;
                let wake_at = match pending {
                    Some(wake_at) => wake_at,
                    None => {
                        let entered = person
                            .history(active)
                            .and_then(|h| h.current())
                            .map_or(now, |entry| entry.entered);
                        let wake_at = entered + duration.sample(person.rng());
                        person.run_mut(module).wake_at = Some(wake_at);
                        wake_at
                    }
                };
                if now >= wake_at {
                    Step::Advance
                } else {
                    Step::Hold
                }
            }
            StateKind::Encounter {
                encounter_type,
                wellness,
            } => {
                if *wellness && person.wellness_window().is_none() {
                    Step::Hold
                } else {
                    self.encounters.record_encounter(person, encounter_type, *wellness, now);
                    Step::Advance
                }
            }
            StateKind::CallSubmodule { submodule } => Step::Call(submodule.clone()),
        };
        Ok(step)
    }

    fn next_state(&self, state: &State, person: &mut Person, module: &str, now: Timestamp) -> Result<String, RuntimeError> {
        match &state.transition {
            Some(transition) => resolve(transition, person, module, now),
            None => Err(RuntimeError::NoTransition),
        }
    }
}

/// Picks the successor state named by `transition`.
///
/// Conditional branches are tried in declaration order with the default last.
/// Distributed branches consume exactly one uniform draw from the person's
/// random stream and select by cumulative weight in declaration order.
pub fn resolve(transition: &Transition, person: &mut Person, module: &str, now: Timestamp) -> Result<String, RuntimeError> {
    match transition {
        Transition::Direct(target) => Ok(target.clone()),
        Transition::Conditional { branches, default } => {
            for branch in branches {
                if branch.condition.evaluate(person, module, now)? {
                    return resolve(&branch.transition, person, module, now);
                }
            }
            resolve(default, person, module, now)
        }
        Transition::Distributed(branches) => {
            let total: f64 = branches.iter().map(|b| b.weight).sum();
            let draw = person.rng().gen::<f64>() * total;
            let mut cumulative = 0.0;
            for branch in branches {
                cumulative += branch.weight;
                if draw < cumulative {
                    return resolve(&branch.transition, person, module, now);
                }
            }
            // Rounding can leave the draw at the very top of the range.
            let last = branches
                .iter()
                .rev()
                .find(|b| b.weight > 0.0)
                .ok_or(RuntimeError::NoTransition)?;
            resolve(&last.transition, person, module, now)
        }
        Transition::Complex(branches) => {
            for branch in branches {
                let applies = match &branch.condition {
                    Some(condition) => condition.evaluate(person, module, now)?,
                    None => true,
                };
                if applies {
                    return resolve(&branch.transition, person, module, now);
                }
            }
            Err(RuntimeError::NoTransition)
        }
    }
}
