//! Tool/function calling types

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (function name)
    pub name: String,
    /// Description of what the tool does
    pub description: String,
    /// JSON Schema for the input parameters
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool definition with an empty object schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    /// Set the input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id for this tool call
    pub id: String,
    /// Name of the tool being called
    pub name: String,
    /// Arguments as delivered by the provider (object, or a JSON-encoded string)
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Decode the argument payload into a structured value.
    ///
    /// Providers deliver arguments either as a JSON object or as a string
    /// holding JSON. Anything that fails to decode becomes a diagnostic
    /// object carrying the parse error and the raw text, so the tool still
    /// gets invoked and the model sees what went wrong.
    pub fn parsed_arguments(&self) -> Value {
        match &self.arguments {
            Value::Null => json!({}),
            Value::String(raw) if raw.trim().is_empty() => json!({}),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(value) => value,
                Err(e) => json!({ "_parse_error": e.to_string(), "_raw": raw }),
            },
            other => other.clone(),
        }
    }
}
