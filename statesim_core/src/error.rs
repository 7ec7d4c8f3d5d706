//! Error types for module loading and module execution.

use thiserror::Error;

/// A module graph failed validation while loading.
///
/// Loading is all-or-nothing: any of these aborts construction of the
/// registry.
#[derive(Debug, Error)]
pub enum GraphValidationError {
    /// Source text was not a well-formed module document
    #[error("Module source could not be parsed: {0}")]
    Parse(String),

    /// A transition names a state that the module does not declare
    #[error("Module '{module}': state '{state}' transitions to undefined state '{target}'")]
    UndefinedTarget {
        module: String,
        state: String,
        target: String,
    },

    /// The module has no entry state
    #[error("Module '{module}' declares no '{entry}' state")]
    MissingEntry { module: String, entry: String },

    /// Two states share a name
    #[error("Module '{module}': state '{state}' is declared more than once")]
    DuplicateState { module: String, state: String },

    /// A conditional transition has no unconditioned default branch
    #[error("Module '{module}': conditional transition of state '{state}' has no default")]
    MissingDefault { module: String, state: String },

    /// A non-terminal state has nothing to transition to
    #[error("Module '{module}': state '{state}' has no transition")]
    MissingTransition { module: String, state: String },

    /// A state declares more than one transition form, or a default branch that is not last
    #[error("Module '{module}': state '{state}' has an ambiguous transition: {reason}")]
    AmbiguousTransition {
        module: String,
        state: String,
        reason: String,
    },

    /// A terminal state declares a transition
    #[error("Module '{module}': terminal state '{state}' must not declare a transition")]
    UnexpectedTransition { module: String, state: String },

    /// A condition is structurally incomplete
    #[error("Module '{module}': state '{state}' has invalid condition: {reason}")]
    InvalidCondition {
        module: String,
        state: String,
        reason: String,
    },

    /// Distributed weights are empty, negative or sum to zero
    #[error("Module '{module}': state '{state}' has invalid distribution: {reason}")]
    InvalidDistribution {
        module: String,
        state: String,
        reason: String,
    },

    /// A delay duration cannot be sampled
    #[error("Module '{module}': state '{state}' has invalid delay: {reason}")]
    InvalidDelay {
        module: String,
        state: String,
        reason: String,
    },

    /// A CallSubmodule state targets a module that is not in the registry
    #[error("Module '{module}': state '{state}' calls unknown submodule '{submodule}'")]
    UnknownSubmodule {
        module: String,
        state: String,
        submodule: String,
    },

    /// A CallSubmodule state targets a module not flagged as a submodule
    #[error("Module '{module}': state '{state}' calls '{submodule}', which is not a submodule")]
    NotASubmodule {
        module: String,
        state: String,
        submodule: String,
    },

    /// Submodule calls loop back to a module already on the call path
    #[error("Submodule calls form a cycle: {}", .0.join(" -> "))]
    SubmoduleCycle(Vec<String>),

    /// Two modules share a name
    #[error("Module '{0}' is defined more than once")]
    DuplicateModule(String),

    /// A module file could not be read
    #[error("Failed to read module file {path}: {message}")]
    Io { path: String, message: String },
}

/// A module failed while being executed for a person.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    /// A predicate compared against an attribute the person does not have
    #[error("Attribute '{0}' is not set")]
    MissingAttribute(String),

    /// A predicate compared values of incompatible types
    #[error("Attribute '{attribute}' cannot be compared with '{operator}': {detail}")]
    TypeMismatch {
        attribute: String,
        operator: String,
        detail: String,
    },

    /// A module name could not be resolved in the registry
    #[error("Unknown module '{0}'")]
    UnknownModule(String),

    /// A state name could not be resolved in its module
    #[error("Unknown state '{state}' in module '{module}'")]
    UnknownState { module: String, state: String },

    /// No branch of a complex transition applied
    #[error("No branch of the complex transition applied")]
    NoTransition,

    /// A single call kept moving through states without ever holding
    #[error("Exceeded {0} state transitions in a single tick")]
    TransitionLoop(usize),
}

/// A runtime error with the module and state it occurred in.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("module '{module}', state '{state}': {source}")]
pub struct ExecutionError {
    pub module: String,
    pub state: String,
    #[source]
    pub source: RuntimeError,
}

impl ExecutionError {
    /// Attaches module/state context to a runtime error.
    pub fn new(module: impl Into<String>, state: impl Into<String>, source: RuntimeError) -> Self {
        Self {
            module: module.into(),
            state: state.into(),
            source,
        }
    }
}
