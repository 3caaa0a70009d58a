// callplan-core/src/tools/catalog.rs

//! The simplified function catalog embedded into the planning prompt.

use std::collections::BTreeMap;

use serde_json::json;

use crate::orderedmap::{Node, OrderedMap};

use super::{ToolSet, TypeInfo};

pub(super) fn generate(tools: &ToolSet) -> String {
    let mut functions = Vec::with_capacity(tools.functions.len());
    for function in &tools.functions {
        let simplified = OrderedMap::new()
            .entry("name", function.name.as_str())
            .entry("description", function.description.as_str())
            .entry(
                "args",
                simplify(&function.parameters, &tools.type_definitions),
            );
        functions.push(Node::Map(simplified));
    }
    OrderedMap::new().entry("functions", functions).to_json()
}

fn simplify(info: &TypeInfo, definitions: &BTreeMap<String, TypeInfo>) -> OrderedMap {
    // The description is rendered even when empty so every entry has the
    // same shape.
    let mut simplified = OrderedMap::new()
        .entry("type", resolve_type(info, definitions))
        .entry("description", info.description.as_str());

    if let Some(properties) = &info.properties {
        let mut rendered = OrderedMap::new();
        for (name, property) in properties {
            rendered.push(name.as_str(), simplify(property, definitions));
        }
        simplified.push("properties", rendered);
    }

    if !info.required.is_empty() {
        simplified.push("required", Node::Value(json!(info.required)));
    }

    simplified
}

/// Resolves a type to its display name: user-defined object types surface
/// their name, aliases resolve through the dictionary, arrays render as
/// `array of <item>`.
fn resolve_type(info: &TypeInfo, definitions: &BTreeMap<String, TypeInfo>) -> String {
    if let Some(definition) = definitions.get(&info.type_name) {
        if definition.type_name == "object" {
            return info.type_name.clone();
        }
        return resolve_type(definition, definitions);
    }

    if info.type_name == "array" {
        if let Some(items) = &info.items {
            return format!("array of {}", resolve_type(items, definitions));
        }
    }

    info.type_name.clone()
}
