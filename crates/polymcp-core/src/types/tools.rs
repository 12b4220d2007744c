//! Tool metadata and typed parameter access.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::content::ContentItem;

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Int,
    Float,
    Bool,
    Object,
    Array,
}

impl ParamKind {
    /// Whether a JSON value satisfies this declared type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Int => value.is_i64() || value.is_u64(),
            ParamKind::Float => value.is_number(),
            ParamKind::Bool => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::Array => value.is_array(),
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParamKind::String => "string",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        };
        write!(f, "{name}")
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Tool definition as advertised by `list_tools`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    /// Tool name (unique identifier)
    pub name: String,

    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared parameters, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            params: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Render the declared parameters as a JSON Schema object, for
    /// interoperability with peers that consume `inputSchema`-style
    /// metadata.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            let schema_type = match param.kind {
                ParamKind::String => "string",
                ParamKind::Int => "integer",
                ParamKind::Float => "number",
                ParamKind::Bool => "boolean",
                ParamKind::Object => "object",
                ParamKind::Array => "array",
            };
            let mut property = Map::new();
            property.insert("type".to_string(), Value::String(schema_type.to_string()));
            if let Some(description) = &param.description {
                property.insert(
                    "description".to_string(),
                    Value::String(description.clone()),
                );
            }
            properties.insert(param.name.clone(), Value::Object(property));
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String("object".to_string()));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        Value::Object(schema)
    }

    /// Validate call arguments against the declared parameters.
    ///
    /// Unknown argument names pass through untouched; only declared names
    /// are checked for presence and type.
    pub fn validate_arguments(&self, arguments: &Value) -> Result<(), String> {
        let empty = Map::new();
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(format!(
                    "arguments must be an object, got {}",
                    json_type_name(other)
                ))
            }
        };

        for param in &self.params {
            match args.get(&param.name) {
                Some(value) => {
                    if !param.kind.accepts(value) {
                        return Err(format!(
                            "parameter '{}' expects {}, got {}",
                            param.name,
                            param.kind,
                            json_type_name(value)
                        ));
                    }
                }
                None if param.required => {
                    return Err(format!("missing required parameter '{}'", param.name));
                }
                None => {}
            }
        }
        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `call_tool` request params.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// `list_tools` result payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListToolsResponse {
    pub tools: Vec<ToolSpec>,
}

/// A tool handler's successful outcome.
pub type ToolOutput = Vec<ContentItem>;

// Typed parameter accessors. Total functions: any shape mismatch is None.

pub fn get_string_param(arguments: &Value, name: &str) -> Option<String> {
    arguments.get(name)?.as_str().map(str::to_string)
}

pub fn get_int_param(arguments: &Value, name: &str) -> Option<i64> {
    arguments.get(name)?.as_i64()
}

pub fn get_float_param(arguments: &Value, name: &str) -> Option<f64> {
    arguments.get(name)?.as_f64()
}

pub fn get_bool_param(arguments: &Value, name: &str) -> Option<bool> {
    arguments.get(name)?.as_bool()
}

pub fn get_object_param<'a>(arguments: &'a Value, name: &str) -> Option<&'a Map<String, Value>> {
    arguments.get(name)?.as_object()
}
