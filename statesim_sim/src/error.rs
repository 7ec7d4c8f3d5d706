//! Run-level errors.

use statesim_core::{ExecutionError, GraphValidationError, RuntimeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// The module graphs failed to load
    #[error(transparent)]
    Graph(#[from] GraphValidationError),

    /// A module failed while running for one person
    #[error("person {index}: module '{module}', state '{state}': {source}")]
    Agent {
        index: usize,
        module: String,
        state: String,
        #[source]
        source: RuntimeError,
    },

    /// Only-alive mode gave up regenerating a person
    #[error("person {index}: no living person after {tries} attempts")]
    RetryExhausted { index: usize, tries: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The worker pool could not be built
    #[error("Worker pool error: {0}")]
    Pool(String),
}

impl SimError {
    pub fn agent(index: usize, error: ExecutionError) -> Self {
        SimError::Agent {
            index,
            module: error.module,
            state: error.state,
            source: error.source,
        }
    }
}
