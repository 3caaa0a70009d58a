// callplan-core/src/parser.rs

//! Decodes the model's JSON plan into a tree of [`PlannedFuncCall`]s.
//!
//! The wire shape is `{"understanding": …, "main_functions": [entry, …]}`
//! where each entry is a single-key object mapping a function name to its
//! `{purpose, args}` details. Inside `args`, a nested call is wrapped as
//! `{"func_call": {"<name>": {…}}}`. The plan is a finite tree: identical
//! subtrees occurring twice are two separate nodes, deduplicated only by
//! memoization at execution time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::errors::ParseError;

/// A parsed call: function name, the planner's stated purpose, and the
/// argument mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedFuncCall {
    pub name: String,
    pub purpose: String,
    pub args: HashMap<String, ArgValue>,
}

/// An argument value: a literal, or a nested call whose result feeds the
/// parent argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Value(Value),
    Call(Box<PlannedFuncCall>),
}

impl PlannedFuncCall {
    /// Names of this call and of every call nested anywhere in its
    /// arguments, depth-first.
    pub fn collect_called_tools(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        for arg in self.args.values() {
            if let ArgValue::Call(nested) = arg {
                names.extend(nested.collect_called_tools());
            }
        }
        names
    }

    /// Re-encodes this call in the on-the-wire plan shape, the inverse of
    /// parsing a `main_functions` entry.
    pub fn to_wire_value(&self) -> Value {
        let mut args = Map::new();
        for (key, value) in &self.args {
            let encoded = match value {
                ArgValue::Value(v) => v.clone(),
                ArgValue::Call(nested) => json!({ "func_call": nested.to_wire_value() }),
            };
            args.insert(key.clone(), encoded);
        }

        let mut entry = Map::new();
        entry.insert(
            self.name.clone(),
            json!({ "purpose": self.purpose, "args": args }),
        );
        Value::Object(entry)
    }
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    main_functions: Vec<Value>,
}

/// Parses the model's plan output. An absent or empty `main_functions` array
/// yields an empty plan, not an error; the `understanding` field is ignored.
pub fn parse_plan(data: &[u8]) -> Result<Vec<PlannedFuncCall>, ParseError> {
    let plan: RawPlan = serde_json::from_slice(data)?;

    if plan.main_functions.is_empty() {
        debug!("main_functions is absent or empty");
        return Ok(Vec::new());
    }

    let mut parsed = Vec::with_capacity(plan.main_functions.len());
    for entry in &plan.main_functions {
        let Some(entry) = entry.as_object() else {
            return Err(ParseError::InvalidStructure(
                "function entry is not an object".to_string(),
            ));
        };
        if entry.len() != 1 {
            return Err(ParseError::InvalidStructure(
                "function entry must contain exactly one key-value pair".to_string(),
            ));
        }
        for (name, details) in entry {
            parsed.push(parse_func_details(name, details)?);
        }
    }

    Ok(parsed)
}

fn parse_func_details(name: &str, details: &Value) -> Result<PlannedFuncCall, ParseError> {
    let Some(details) = details.as_object() else {
        return Err(ParseError::InvalidStructure(format!(
            "details of function '{}' are not an object",
            name
        )));
    };

    let Some(purpose) = details.get("purpose").and_then(Value::as_str) else {
        return Err(ParseError::InvalidStructure(format!(
            "purpose of function '{}' not found or not a string",
            name
        )));
    };

    let Some(args) = details.get("args").and_then(Value::as_object) else {
        return Err(ParseError::InvalidStructure(format!(
            "args of function '{}' not found or not an object",
            name
        )));
    };

    Ok(PlannedFuncCall {
        name: name.to_string(),
        purpose: purpose.to_string(),
        args: parse_args(args)?,
    })
}

fn parse_args(args: &Map<String, Value>) -> Result<HashMap<String, ArgValue>, ParseError> {
    let mut parsed = HashMap::with_capacity(args.len());

    for (key, value) in args {
        match value {
            Value::Object(object) => {
                if let Some(Value::Object(inner)) = object.get("func_call") {
                    let nested = parse_nested_func(inner).map_err(|err| {
                        ParseError::InvalidStructure(format!(
                            "nested function for arg '{}': {}",
                            key, err
                        ))
                    })?;
                    parsed.insert(key.clone(), ArgValue::Call(Box::new(nested)));
                } else {
                    // Not a call wrapper; the tool implementation interprets it.
                    parsed.insert(key.clone(), ArgValue::Value(value.clone()));
                }
            }
            // Empty strings are how the planner leaves an argument blank
            // rather than inventing a value; drop them.
            Value::String(s) if s.is_empty() => {}
            other => {
                parsed.insert(key.clone(), ArgValue::Value(other.clone()));
            }
        }
    }

    Ok(parsed)
}

fn parse_nested_func(func_call: &Map<String, Value>) -> Result<PlannedFuncCall, ParseError> {
    if func_call.len() != 1 {
        return Err(ParseError::InvalidStructure(
            "nested function call must contain exactly one key-value pair".to_string(),
        ));
    }
    // Exactly one entry after the check above.
    let (name, details) = func_call
        .iter()
        .next()
        .ok_or_else(|| ParseError::InvalidStructure("no valid nested function found".to_string()))?;
    parse_func_details(name, details)
}
