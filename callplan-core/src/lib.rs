// callplan-core/src/lib.rs

//! Turns a natural-language request into a structured, validated, executed
//! plan of tool invocations produced by an LLM.
//!
//! The pipeline has three stages:
//!
//! 1. **Planning**: the model is prompted with a catalog of the registered
//!    tools and constrained (via a JSON Schema derived from the same
//!    [`tools::ToolSet`]) to emit a nested call plan. Wherever an argument of
//!    type `T` is expected, the plan may substitute a call to any function
//!    returning `T`.
//! 2. **Validation**: a second, cheap model pass renders each top-level call
//!    against the subset of tools it uses and asks for a boolean verdict,
//!    pruning plans grounded in hallucinated arguments.
//! 3. **Execution**: the [`execution::Orchestrator`] walks the call tree
//!    depth-first, feeding child results into parent arguments, enforcing
//!    required parameters, memoizing by fingerprint, applying per-call
//!    timeouts, and optionally running top-level calls concurrently.
//!
//! [`handler::RequestHandler`] wires the stages together; [`agent::Agent`] is
//! a thin facade over it.

pub mod agent;
pub mod config;
pub mod errors;
pub mod execution;
pub mod handler;
pub mod llm;
pub mod orderedmap;
pub mod parser;
pub mod progress;
pub mod prompt;
pub mod tools;
mod utils;

#[cfg(test)]
mod handler_tests;

pub use agent::Agent;
pub use errors::{HandlerError, ParseError, SchemaError};
pub use execution::{
    Arg, ExecutedFuncCall, ExecutionError, ExecutionErrorKind, ExecutionResult, FormatFn,
    FuncExecutor, FuncResult, FuncResults, Orchestrator, DEFAULT_SEPARATOR,
};
pub use handler::{
    ProcessingResult, RequestHandler, RequestHandlerConfig, Tools, UNPROCESSABLE_REQUEST_MESSAGE,
};
pub use llm::{Completer, Message};
pub use parser::{parse_plan, ArgValue, PlannedFuncCall};
pub use tools::{FuncDefinition, ToolSet, TypeInfo};

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
