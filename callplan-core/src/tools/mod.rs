// callplan-core/src/tools/mod.rs

//! The tool registry and type model.
//!
//! A [`ToolSet`] describes the functions the planner may call, plus a
//! dictionary of named types those functions share. Two artifacts are derived
//! from it: a human-readable catalog injected into the planning prompt
//! ([`ToolSet::to_json_definitions`]) and a draft-07 JSON Schema injected
//! into the model's constrained-decoding channel
//! ([`ToolSet::to_json_schema`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::SchemaError;

mod catalog;
mod schema;

const JSON_PRIMITIVES: &[&str] = &["object", "array", "string", "number", "integer", "boolean"];

/// A schema node describing a parameter or return type. `type` is either a
/// JSON-Schema primitive or the name of an entry in the enclosing
/// [`ToolSet::type_definitions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Item type, set exactly when `type` is `"array"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeInfo>>,
    /// Property types, set exactly when `type` is `"object"`. A `BTreeMap`
    /// keeps every derived artifact deterministic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, TypeInfo>>,
    /// Names of required properties; every entry must appear in `properties`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Permitted string values.
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Regex constraint on string values.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pattern: String,
}

impl TypeInfo {
    /// Whether `type` names a JSON-Schema primitive rather than a
    /// user-defined type.
    pub fn is_primitive(&self) -> bool {
        JSON_PRIMITIVES.contains(&self.type_name.as_str())
    }
}

/// A named, typed operation the planner may invoke. `parameters` must be an
/// object type; `returns` may reference a user-defined type, which makes the
/// function eligible as a nested argument wherever that type is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub parameters: TypeInfo,
    pub returns: TypeInfo,
}

/// The set of functions exposed to the planner plus the named types they
/// reference. Immutable once handed to a handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolSet {
    pub functions: Vec<FuncDefinition>,
    #[serde(default)]
    pub type_definitions: BTreeMap<String, TypeInfo>,
}

impl ToolSet {
    pub fn find_tool(&self, name: &str) -> Option<&FuncDefinition> {
        self.functions.iter().find(|function| function.name == name)
    }

    /// One `name: description` line per function.
    pub fn list_tools(&self) -> String {
        let mut out = String::new();
        for function in &self.functions {
            out.push_str(&format!("{}: {}\n", function.name, function.description));
        }
        out
    }

    /// The draft-07 JSON Schema constraining the shape of a legal call plan,
    /// compacted. Wherever an argument of type `T` is expected the schema
    /// also admits `{"func_call": …}` wrapping any function returning `T`.
    pub fn to_json_schema(&self) -> Result<String, SchemaError> {
        schema::generate(self)
    }

    /// The simplified, human-readable function catalog rendered as pretty
    /// JSON with stable key order, for embedding into the planning prompt.
    pub fn to_json_definitions(&self) -> String {
        catalog::generate(self)
    }

    /// Whether any function takes `type_name` as a parameter, anywhere in
    /// its recursive parameter structure (directly or as an array item).
    pub(crate) fn is_used_as_argument_type(&self, type_name: &str) -> bool {
        self.functions
            .iter()
            .any(|function| type_used_in(type_name, &function.parameters))
    }

    /// Checks the type-model invariants. Called once when a handler is
    /// constructed; definitions are immutable afterwards.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = std::collections::HashSet::new();
        for function in &self.functions {
            if !seen.insert(function.name.as_str()) {
                return Err(SchemaError::InvalidToolSet(format!(
                    "duplicate function name '{}'",
                    function.name
                )));
            }
            if function.parameters.type_name != "object" {
                return Err(SchemaError::InvalidToolSet(format!(
                    "function '{}': parameters must be an object type, got '{}'",
                    function.name, function.parameters.type_name
                )));
            }
            self.validate_type_info(&function.parameters)
                .map_err(|msg| {
                    SchemaError::InvalidToolSet(format!("function '{}': {}", function.name, msg))
                })?;
            self.validate_type_info(&function.returns).map_err(|msg| {
                SchemaError::InvalidToolSet(format!("function '{}': {}", function.name, msg))
            })?;
        }
        for (name, info) in &self.type_definitions {
            self.validate_type_info(info)
                .map_err(|msg| SchemaError::InvalidToolSet(format!("type '{}': {}", name, msg)))?;
        }
        Ok(())
    }

    fn validate_type_info(&self, info: &TypeInfo) -> Result<(), String> {
        if !info.is_primitive() && !self.type_definitions.contains_key(&info.type_name) {
            return Err(format!("unknown type '{}'", info.type_name));
        }
        if info.type_name == "array" && info.items.is_none() {
            return Err("array type without 'items'".to_string());
        }
        if info.type_name != "array" && info.items.is_some() {
            return Err(format!(
                "'items' set on non-array type '{}'",
                info.type_name
            ));
        }
        if info.properties.is_some() && info.type_name != "object" {
            return Err(format!(
                "'properties' set on non-object type '{}'",
                info.type_name
            ));
        }
        if info.type_name == "object" && info.properties.is_none() {
            return Err("object type without 'properties'".to_string());
        }
        if let Some(properties) = &info.properties {
            for name in &info.required {
                if !properties.contains_key(name) {
                    return Err(format!("required property '{}' is not declared", name));
                }
            }
            for property in properties.values() {
                self.validate_type_info(property)?;
            }
        }
        if let Some(items) = &info.items {
            self.validate_type_info(items)?;
        }
        Ok(())
    }
}

fn type_used_in(type_name: &str, info: &TypeInfo) -> bool {
    if info.type_name == type_name {
        return true;
    }
    if info.type_name == "array" {
        if let Some(items) = &info.items {
            if items.type_name == type_name {
                return true;
            }
        }
    }
    if let Some(properties) = &info.properties {
        return properties
            .values()
            .any(|property| type_used_in(type_name, property));
    }
    false
}
