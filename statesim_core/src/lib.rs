//! StateSim Core - Declarative State Machine Execution Engine
//!
//! This library runs people through declaratively defined state graphs:
//! 1. **Modules**: JSON state graphs, validated once into a [`ModuleRegistry`]
//! 2. **Interpreter**: advances one module for one [`Person`] per tick
//! 3. **Metrics**: per-state counters aggregated from finished histories
//!
//! Population scheduling lives in `statesim_sim`.

pub mod attribute;
pub mod condition;
pub mod encounter;
pub mod error;
pub mod interpreter;
pub mod metrics;
pub mod module;
pub mod person;
pub mod registry;
pub mod source;
pub mod time;

// Re-export key types for convenience
pub use attribute::AttributeValue;
pub use condition::{Condition, Operator};
pub use encounter::{EncounterManager, NoEncounters};
pub use error::{ExecutionError, GraphValidationError, RuntimeError};
pub use interpreter::{Interpreter, Progress};
pub use metrics::{MetricSnapshot, MetricsReport, TransitionMetrics};
pub use module::{DelaySpec, Module, State, StateKind, Transition};
pub use person::{CallFrame, HistoryEntry, ModuleHistory, Person};
pub use registry::ModuleRegistry;
pub use time::{TimeUnit, Timestamp};
