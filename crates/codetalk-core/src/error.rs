//! Error taxonomy for the chat pipeline.
//!
//! Every variant here is caught at a user-facing boundary: turn errors become
//! the fallback reply, render errors become the fallback image.

use thiserror::Error;

/// Failure to turn a raw agent reply into text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    #[error("no valid function response or text found in agent reply")]
    NoContentFound,

    #[error("agent returned error: {0}")]
    AgentError(String),
}

/// Failure of a single chat turn, from request to interpreted reply
#[derive(Error, Debug)]
pub enum TurnError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Interpret(#[from] InterpretError),
}

impl From<reqwest::Error> for TurnError {
    fn from(err: reqwest::Error) -> Self {
        TurnError::Transport(err.to_string())
    }
}

/// Failure of the diagram rendering capability
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to launch renderer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("renderer produced no output")]
    EmptyOutput,

    #[error("renderer I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
