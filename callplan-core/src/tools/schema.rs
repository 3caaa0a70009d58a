// callplan-core/src/tools/schema.rs

//! Draft-07 JSON Schema generation for constrained decoding.
//!
//! The emitted schema describes the legal call-plan shape, including the
//! recursive substitution rule: for every type `T` that appears as an
//! argument somewhere, `$defs/T` also admits `{"func_call": …}` wrapping any
//! function whose return type is `T`. When no function returns `T` the
//! wrapper definition is omitted and `$defs/T` stays the plain base shape.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::errors::SchemaError;

use super::{FuncDefinition, ToolSet, TypeInfo};

pub(super) fn generate(tools: &ToolSet) -> Result<String, SchemaError> {
    let mut defs = Map::new();

    let func_refs: Vec<Value> = tools
        .functions
        .iter()
        .map(|function| def_ref(&function.name))
        .collect();
    defs.insert("func_call".to_string(), json!({ "oneOf": func_refs }));

    for function in &tools.functions {
        defs.insert(function.name.clone(), function_definition(function, tools));
    }

    let producers = producers_by_type(tools);

    for (type_name, type_info) in &tools.type_definitions {
        defs.insert(
            type_name.clone(),
            type_definition(type_name, type_info, tools, &producers),
        );
    }

    for (type_name, function_names) in &producers {
        let refs: Vec<Value> = function_names.iter().map(|name| def_ref(name)).collect();
        defs.insert(
            format!("func_call_returning_{}", type_name),
            json!({
                "type": "object",
                "required": ["func_call"],
                "additionalProperties": false,
                "properties": { "func_call": { "oneOf": refs } },
            }),
        );
    }

    let schema = json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "understanding": { "type": "string" },
            "main_functions": {
                "type": "array",
                "items": { "$ref": "#/$defs/func_call" },
            },
        },
        "required": ["understanding", "main_functions"],
        "additionalProperties": false,
        "$defs": defs,
    });

    Ok(serde_json::to_string(&schema)?)
}

fn def_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/$defs/{}", name) })
}

/// Maps each type name to the functions returning it, restricted to types
/// that are actually used as arguments.
fn producers_by_type(tools: &ToolSet) -> BTreeMap<String, Vec<String>> {
    let mut producers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for function in &tools.functions {
        let return_type = &function.returns.type_name;
        if tools.is_used_as_argument_type(return_type) {
            producers
                .entry(return_type.clone())
                .or_default()
                .push(function.name.clone());
        }
    }
    producers
}

fn function_definition(function: &FuncDefinition, tools: &ToolSet) -> Value {
    let mut inner = Map::new();
    inner.insert("type".to_string(), json!("object"));
    inner.insert("description".to_string(), json!(function.description));
    inner.insert("additionalProperties".to_string(), json!(false));
    inner.insert("required".to_string(), json!(["purpose", "args"]));
    inner.insert(
        "properties".to_string(),
        json!({
            "purpose": { "type": "string" },
            "args": transform_type_info(&function.parameters, tools),
        }),
    );

    let mut properties = Map::new();
    properties.insert(function.name.clone(), Value::Object(inner));

    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [function.name],
        "properties": properties,
    })
}

fn type_definition(
    type_name: &str,
    type_info: &TypeInfo,
    tools: &ToolSet,
    producers: &BTreeMap<String, Vec<String>>,
) -> Value {
    let base = transform_type_info_base(type_info, tools);
    if tools.is_used_as_argument_type(type_name) && producers.contains_key(type_name) {
        return json!({
            "oneOf": [base, def_ref(&format!("func_call_returning_{}", type_name))],
        });
    }
    base
}

/// Transforms a `TypeInfo` into its schema form, carrying every present
/// attribute. References to user-defined types become `$ref`s.
fn transform_type_info(info: &TypeInfo, tools: &ToolSet) -> Value {
    if tools.type_definitions.contains_key(&info.type_name) {
        return def_ref(&info.type_name);
    }
    transform_type_info_base(info, tools)
}

fn transform_type_info_base(info: &TypeInfo, tools: &ToolSet) -> Value {
    let mut out = Map::new();
    out.insert("type".to_string(), json!(info.type_name));
    if !info.description.is_empty() {
        out.insert("description".to_string(), json!(info.description));
    }
    if !info.enum_values.is_empty() {
        out.insert("enum".to_string(), json!(info.enum_values));
    }
    if !info.pattern.is_empty() {
        out.insert("pattern".to_string(), json!(info.pattern));
    }
    if let Some(items) = &info.items {
        out.insert("items".to_string(), transform_type_info(items, tools));
    }
    if let Some(properties) = &info.properties {
        let mut rendered = Map::new();
        for (name, property) in properties {
            rendered.insert(name.clone(), transform_type_info(property, tools));
        }
        out.insert("properties".to_string(), Value::Object(rendered));
        out.insert("additionalProperties".to_string(), json!(false));
        if !info.required.is_empty() {
            out.insert("required".to_string(), json!(info.required));
        }
    }
    Value::Object(out)
}
