// callplan-core/src/execution/result.rs

//! Result types for executed call trees.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

/// Renders an execution result into user-facing text. A closure rather than
/// a string because formatting may differ from the value used for downstream
/// composition, and because it can explain an absent result.
pub type FormatFn = Arc<dyn Fn() -> Result<String> + Send + Sync>;

/// The outcome of one function execution.
#[derive(Clone, Default)]
pub struct FuncResult {
    /// Whether the execution produced data. `value` is only meaningful when
    /// this is true.
    pub present: bool,
    pub value: Value,
    /// Renders the result for the user. May be set even when `present` is
    /// false, to explain the absence. `None` marks a silent result that is
    /// skipped during formatting.
    pub format_fn: Option<FormatFn>,
    /// Free-form data supplied by the executor.
    pub metadata: Option<Value>,
}

impl FuncResult {
    /// A result carrying data and a formatter.
    pub fn found(value: Value, format_fn: FormatFn) -> Self {
        Self {
            present: true,
            value,
            format_fn: Some(format_fn),
            metadata: None,
        }
    }

    /// A result with no data; the formatter, when given, explains why.
    pub fn not_found(format_fn: Option<FormatFn>) -> Self {
        Self {
            present: false,
            value: Value::Null,
            format_fn,
            metadata: None,
        }
    }

    /// Wraps a closure into a [`FormatFn`].
    pub fn formatter(f: impl Fn() -> Result<String> + Send + Sync + 'static) -> FormatFn {
        Arc::new(f)
    }
}

impl fmt::Debug for FuncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncResult")
            .field("present", &self.present)
            .field("value", &self.value)
            .field("format_fn", &self.format_fn.as_ref().map(|_| "<fn>"))
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// An argument recorded on an executed call: either the literal from the
/// plan or the completed child call that produced it. Children are owned by
/// their parent; the tree is dropped with the top-level result.
#[derive(Debug, Clone, Serialize)]
pub enum Arg {
    #[serde(rename = "value")]
    Value(Value),
    #[serde(rename = "func_call")]
    Call(Box<ExecutedFuncCall>),
}

impl Arg {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Arg::Value(value) => Some(value),
            Arg::Call(_) => None,
        }
    }

    pub fn func_call(&self) -> Option<&ExecutedFuncCall> {
        match self {
            Arg::Call(call) => Some(call),
            Arg::Value(_) => None,
        }
    }
}

/// A completed call, with its arguments as they were resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedFuncCall {
    pub name: String,
    pub purpose: String,
    pub args: HashMap<String, Arg>,
    #[serde(skip)]
    pub result: FuncResult,
}

/// The executed counterpart of a whole plan, in plan order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    pub func_calls: Vec<ExecutedFuncCall>,
}

impl ExecutionResult {
    /// The top-level results, in plan order.
    pub fn main_results(&self) -> FuncResults {
        FuncResults(
            self.func_calls
                .iter()
                .map(|call| call.result.clone())
                .collect(),
        )
    }
}

pub const DEFAULT_SEPARATOR: &str = "\n\n---\n";

/// Top-level execution results ready for rendering.
#[derive(Clone, Default)]
pub struct FuncResults(pub Vec<FuncResult>);

impl FuncResults {
    /// Formats every non-silent result and joins them with `separator`
    /// ([`DEFAULT_SEPARATOR`] when empty). Identical renderings are emitted
    /// once, first occurrence wins; this compensates for multiple top-level
    /// calls narrating the same fact.
    pub fn format(&self, separator: &str) -> Result<String> {
        let separator = if separator.is_empty() {
            DEFAULT_SEPARATOR
        } else {
            separator
        };

        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for result in &self.0 {
            let Some(format_fn) = &result.format_fn else {
                continue; // silent result
            };
            let text = format_fn().context("error formatting result")?;
            if seen.insert(text.clone()) {
                unique.push(text);
            }
        }

        Ok(unique.join(separator))
    }
}
