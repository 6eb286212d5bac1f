//! Tool declarations bridged into each protocol's schema dialect

use std::collections::HashSet;

use colloquy_core::ToolDefinition;
use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::protocol::google::{GoogleFunctionDeclaration, GoogleTool};
use crate::protocol::openai::{OpenAiFunction, OpenAiTool};

/// Source of tool declarations
///
/// Execution of the tools is out of scope here; only the declaration surface
/// is needed to advertise them to a provider.
pub trait Toolkit: Send + Sync {
    fn definitions(&self) -> Vec<ToolDefinition>;
}

impl Toolkit for Vec<ToolDefinition> {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.clone()
    }
}

/// JSON Schema keywords the Google API refuses
const GOOGLE_UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$schema",
    "$id",
    "$ref",
    "$defs",
    "$comment",
    "definitions",
    "additionalProperties",
    "default",
    "examples",
    "const",
    "patternProperties",
    "unevaluatedProperties",
];

/// Reject unnamed or duplicate tool declarations
pub fn validate_definitions(definitions: &[ToolDefinition]) -> Result<(), LlmError> {
    let mut seen = HashSet::with_capacity(definitions.len());
    for definition in definitions {
        if definition.name.trim().is_empty() {
            return Err(LlmError::BadParameter("tool name must not be empty".to_owned()));
        }
        if !seen.insert(definition.name.as_str()) {
            return Err(LlmError::Conflict(format!("tool `{}` is declared twice", definition.name)));
        }
    }
    Ok(())
}

/// `[{"type": "function", "function": {...}}]`
pub fn openai_tools(definitions: &[ToolDefinition]) -> Result<Value, LlmError> {
    validate_definitions(definitions)?;

    let tools: Vec<OpenAiTool> = definitions
        .iter()
        .map(|definition| OpenAiTool {
            tool_type: "function".to_owned(),
            function: OpenAiFunction {
                name: definition.name.clone(),
                description: definition.description.clone(),
                parameters: definition.parameters.clone(),
            },
        })
        .collect();

    to_value(&tools)
}

/// `[{"functionDeclarations": [...]}]`, with unsupported schema keywords removed
pub fn google_tools(definitions: &[ToolDefinition]) -> Result<Value, LlmError> {
    validate_definitions(definitions)?;

    let declarations = definitions
        .iter()
        .map(|definition| {
            let parameters = google_schema(&definition.parameters);
            GoogleFunctionDeclaration {
                name: definition.name.clone(),
                description: definition.description.clone(),
                // a schema without properties must be omitted entirely
                parameters: has_properties(&parameters).then_some(parameters),
            }
        })
        .collect();

    to_value(&[GoogleTool {
        function_declarations: declarations,
    }])
}

fn to_value<T: serde::Serialize + ?Sized>(tools: &T) -> Result<Value, LlmError> {
    serde_json::to_value(tools).map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to encode tools: {e}")))
}

fn has_properties(schema: &Value) -> bool {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|properties| !properties.is_empty())
}

/// Copy of `schema` without keywords Google rejects, at any depth
///
/// Keys inside `properties` are user-chosen names and are never stripped.
pub fn google_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(object) => {
            let mut cleaned = Map::with_capacity(object.len());
            for (key, value) in object {
                if GOOGLE_UNSUPPORTED_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                let value = if key == "properties" {
                    match value {
                        Value::Object(properties) => Value::Object(
                            properties
                                .iter()
                                .map(|(name, property)| (name.clone(), google_schema(property)))
                                .collect(),
                        ),
                        other => other.clone(),
                    }
                } else {
                    google_schema(value)
                };
                cleaned.insert(key.clone(), value);
            }
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(google_schema).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn weather() -> ToolDefinition {
        ToolDefinition::new(
            "get_weather",
            "Current weather for a city",
            json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "city": {"type": "string", "default": "Oslo"},
                    "default": {"type": "boolean"},
                    "units": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": {"metric": {"type": "boolean"}}
                    }
                },
                "required": ["city"]
            }),
        )
    }

    #[test]
    fn openai_declarations_keep_schema_verbatim() {
        let tools = openai_tools(&[weather()]).unwrap();
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "get_weather");
        assert_eq!(tools[0]["function"]["parameters"]["additionalProperties"], false);
    }

    #[test]
    fn google_declarations_strip_unsupported_keywords() {
        let tools = google_tools(&[weather()]).unwrap();
        let declaration = &tools[0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], "get_weather");
        assert_eq!(declaration["description"], "Current weather for a city");
        assert_eq!(
            declaration["parameters"],
            json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string"},
                    "default": {"type": "boolean"},
                    "units": {"type": "object", "properties": {"metric": {"type": "boolean"}}}
                },
                "required": ["city"]
            })
        );
    }

    #[test]
    fn google_omits_empty_parameter_schemas() {
        let tools = google_tools(&[ToolDefinition::new("ping", "", json!({"type": "object", "properties": {}}))])
            .unwrap();
        assert!(tools[0]["functionDeclarations"][0].get("parameters").is_none());
    }

    #[test]
    fn duplicate_names_conflict() {
        let err = validate_definitions(&[weather(), weather()]).unwrap_err();
        assert!(matches!(err, LlmError::Conflict(_)));
    }

    #[test]
    fn empty_names_are_bad_parameters() {
        let err = openai_tools(&[ToolDefinition::new(" ", "", json!({}))]).unwrap_err();
        assert!(matches!(err, LlmError::BadParameter(_)));
    }

    #[test]
    fn vec_is_a_toolkit() {
        let toolkit: Box<dyn Toolkit> = Box::new(vec![weather()]);
        assert_eq!(toolkit.definitions().len(), 1);
    }
}
