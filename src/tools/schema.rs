//! Parameter schemas and argument validation.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use super::ToolError;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
}

impl ParamKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
        }
    }
}

/// Declaration of one tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<Value>,
    /// Permitted values for string parameters; empty means any.
    pub allowed: &'static [&'static str],
    /// Inclusive lower bound for integer parameters.
    pub minimum: Option<i64>,
    /// Inclusive upper bound for integer parameters.
    pub maximum: Option<i64>,
}

impl ParamSpec {
    fn new(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
            default: None,
            allowed: &[],
            minimum: None,
            maximum: None,
        }
    }

    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Integer, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn min(mut self, minimum: i64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn max(mut self, maximum: i64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub(crate) fn json_schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.as_str(),
            "description": self.description,
        });
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        if !self.allowed.is_empty() {
            schema["enum"] = json!(self.allowed);
        }
        if let Some(minimum) = self.minimum {
            schema["minimum"] = json!(minimum);
        }
        if let Some(maximum) = self.maximum {
            schema["maximum"] = json!(maximum);
        }
        schema
    }

    /// Check one supplied value, normalising integral floats to integers.
    fn check(&self, value: &Value) -> Result<Value, String> {
        match self.kind {
            ParamKind::String => {
                let s = value
                    .as_str()
                    .ok_or_else(|| self.type_error(value))?;
                if !self.allowed.is_empty() && !self.allowed.contains(&s) {
                    return Err(format!(
                        "'{}' must be one of {}, got '{}'",
                        self.name,
                        self.allowed.join(", "),
                        s
                    ));
                }
                Ok(value.clone())
            }
            ParamKind::Integer => {
                let n = match value {
                    Value::Number(n) => n
                        .as_i64()
                        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
                    _ => None,
                }
                .ok_or_else(|| self.type_error(value))?;
                if let Some(minimum) = self.minimum {
                    if n < minimum {
                        return Err(format!(
                            "'{}' must be at least {}, got {}",
                            self.name, minimum, n
                        ));
                    }
                }
                if let Some(maximum) = self.maximum {
                    if n > maximum {
                        return Err(format!(
                            "'{}' must be at most {}, got {}",
                            self.name, maximum, n
                        ));
                    }
                }
                Ok(json!(n))
            }
        }
    }

    fn type_error(&self, value: &Value) -> String {
        format!(
            "'{}' must be of type {}, got {}",
            self.name,
            self.kind.as_str(),
            json_type_name(value)
        )
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Arguments that passed validation, with defaults applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// Deserialize into a typed argument struct.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, ToolError> {
        serde_json::from_value(Value::Object(self.0))
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))
    }
}

/// Validate a raw argument payload against `params`.
///
/// Rejects non-object payloads, unknown keys, missing required parameters,
/// wrong types and out-of-range values. A `null` for an optional parameter
/// is treated as omitted.
pub fn validate(params: &[ParamSpec], raw: &Value) -> Result<ToolArgs, ToolError> {
    let empty = Map::new();
    let supplied = match raw {
        Value::Object(map) => map,
        Value::Null => &empty,
        Value::String(s) if s.trim().is_empty() => &empty,
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "arguments must be a JSON object, got {}",
                json_type_name(other)
            )))
        }
    };

    let mut unknown: Vec<&str> = supplied
        .keys()
        .filter(|k| !params.iter().any(|p| p.name == k.as_str()))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(ToolError::InvalidArguments(format!(
            "unexpected parameter(s): {}",
            unknown.join(", ")
        )));
    }

    let mut problems = Vec::new();
    let mut values = Map::new();
    for param in params {
        match supplied.get(param.name).filter(|v| !v.is_null()) {
            Some(value) => match param.check(value) {
                Ok(v) => {
                    values.insert(param.name.to_string(), v);
                }
                Err(problem) => problems.push(problem),
            },
            None if param.required => {
                problems.push(format!("missing required parameter '{}'", param.name))
            }
            None => {
                if let Some(default) = &param.default {
                    values.insert(param.name.to_string(), default.clone());
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(ToolArgs(values))
    } else {
        Err(ToolError::InvalidArguments(problems.join("; ")))
    }
}
