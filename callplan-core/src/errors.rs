// callplan-core/src/errors.rs
use thiserror::Error;

pub use crate::execution::{ExecutionError, ExecutionErrorKind};

/// Errors produced while decoding a call plan from model output.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The JSON decoded but did not have the expected plan shape.
    #[error("invalid JSON structure: {0}")]
    InvalidStructure(String),

    /// The input was not valid JSON at all.
    #[error("error decoding plan JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced while deriving artifacts from a [`crate::tools::ToolSet`].
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("error serializing schema: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A tool definition violates the type-model invariants.
    #[error("invalid tool definition: {0}")]
    InvalidToolSet(String),
}

/// Errors surfaced by the request handler. Any of these fails the whole
/// request; a plan pruned down to nothing is not an error (the handler
/// returns the unprocessable-request fallback instead).
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("error parsing function calls: {0}")]
    Parse(#[from] ParseError),

    /// The plan referenced a tool name that does not resolve.
    #[error("tool {0} not found")]
    MissingTool(String),

    #[error("LLM completion failed: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("schema generation failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("failed to register tools: {0}")]
    Registration(#[source] anyhow::Error),

    #[error("error rendering validation prompt: {0}")]
    Render(#[source] serde_json::Error),

    /// The validator model replied with something other than the verdict
    /// object its schema constrains it to.
    #[error("invalid validator verdict: {0}")]
    InvalidVerdict(#[source] serde_json::Error),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("error on altering result: {0}")]
    AlterResult(#[source] anyhow::Error),
}
