//! Declared skill parameters and binding of caller-supplied values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;
use talon_core::ExecutionError;
use tracing::debug;

/// Parameter bindings handed to a skill body, keyed by parameter name.
pub type Params = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Json,
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "str" | "text" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "number" | "float" => Ok(Self::Number),
            "boolean" | "bool" => Ok(Self::Boolean),
            "json" | "object" | "any" => Ok(Self::Json),
            other => Err(format!("unknown parameter type '{other}'")),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
        };
        f.write_str(s)
    }
}

/// One declared parameter: name, type, optional default, required flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub default: Option<Value>,
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl ParamSpec {
    /// A required parameter with no default.
    pub fn required(name: &str, kind: ParamType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: None,
            required: true,
            description: None,
        }
    }

    /// An optional parameter; absent values are simply not bound.
    pub fn optional(name: &str, kind: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Parse one `# Parameters` list item:
    ///
    /// ```text
    /// name: type [= default] [(required)|(optional)] [-- description]
    /// ```
    ///
    /// A parameter with no default is required unless marked `(optional)`.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim().trim_start_matches(['-', '*']).trim();

        let (decl, description) = match line.split_once(" -- ") {
            Some((d, desc)) => (d.trim(), Some(desc.trim().to_string())),
            None => (line, None),
        };

        let (name, rest) = decl
            .split_once(':')
            .ok_or_else(|| format!("expected 'name: type', got '{decl}'"))?;
        let name = name.trim().trim_matches('`');
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid parameter name '{name}'"));
        }

        let mut rest = rest.trim().to_string();
        let mut marker = None;
        for flag in ["(required)", "(optional)"] {
            if let Some(stripped) = rest.strip_suffix(flag) {
                marker = Some(flag);
                rest = stripped.trim().to_string();
            }
        }

        let (kind, default) = match rest.split_once('=') {
            Some((k, d)) => (k.trim(), Some(d.trim())),
            None => (rest.as_str(), None),
        };
        let kind: ParamType = kind.parse()?;

        let default = match default {
            Some(raw) => {
                let literal = parse_literal(raw);
                Some(coerce(kind, literal).map_err(|reason| {
                    format!("default for '{name}' is not a {kind}: {reason}")
                })?)
            }
            None => None,
        };

        let required = match marker {
            Some("(required)") => true,
            Some(_) => false,
            None => default.is_none(),
        };

        Ok(Self {
            name: name.to_string(),
            kind,
            default,
            required,
            description,
        })
    }
}

fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return v;
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    Value::String(raw.to_string())
}

/// Convert a supplied value to the declared type, accepting the obvious
/// textual spellings (`"5"` for an integer, `"yes"` for a boolean).
pub fn coerce(kind: ParamType, value: Value) -> Result<Value, String> {
    match (kind, value) {
        (ParamType::Json, Value::String(s)) => {
            Ok(serde_json::from_str(&s).unwrap_or(Value::String(s)))
        }
        (ParamType::Json, v) => Ok(v),

        (ParamType::String, Value::String(s)) => Ok(Value::String(s)),
        (ParamType::String, v @ (Value::Number(_) | Value::Bool(_))) => {
            Ok(Value::String(v.to_string()))
        }
        (ParamType::String, v) => Err(format!("expected text, got {}", type_name(&v))),

        (ParamType::Integer, Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(Value::from(f as i64))
                    }
                    _ => Err(format!("{n} is not a whole number")),
                }
            }
        }
        (ParamType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("'{s}' is not a whole number")),

        (ParamType::Number, Value::Number(n)) => Ok(Value::Number(n)),
        (ParamType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("'{s}' is not a number")),

        (ParamType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (ParamType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("'{s}' is not true or false")),
        },
        (ParamType::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(format!("{n} is not true or false")),
        },

        (kind, v) => Err(format!("expected {kind}, got {}", type_name(&v))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Bind `supplied` onto the declared parameter list.
///
/// Declared order is preserved in the result. Defaults fill gaps, `null`
/// counts as absent, and undeclared names are dropped.
pub fn bind(skill: &str, specs: &[ParamSpec], mut supplied: Params) -> Result<Params, ExecutionError> {
    let mut bound = Params::new();

    for spec in specs {
        let value = match supplied.remove(&spec.name) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        };

        match (value, &spec.default) {
            (Some(v), _) => {
                let v = coerce(spec.kind, v).map_err(|reason| ExecutionError::InvalidParameter {
                    skill: skill.to_string(),
                    name: spec.name.clone(),
                    reason,
                })?;
                bound.insert(spec.name.clone(), v);
            }
            (None, Some(default)) => {
                bound.insert(spec.name.clone(), default.clone());
            }
            (None, None) if spec.required => {
                return Err(ExecutionError::MissingParameter {
                    skill: skill.to_string(),
                    name: spec.name.clone(),
                });
            }
            (None, None) => {}
        }
    }

    for extra in supplied.keys() {
        debug!(skill, parameter = %extra, "dropping undeclared parameter");
    }

    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn parse_spec_variants() {
        let p = ParamSpec::parse("- zone: string (required)").unwrap();
        assert_eq!(p.name, "zone");
        assert_eq!(p.kind, ParamType::String);
        assert!(p.required);
        assert!(p.default.is_none());

        let p = ParamSpec::parse("- format: string = \"%H:%M\"").unwrap();
        assert_eq!(p.default, Some(json!("%H:%M")));
        assert!(!p.required);

        let p = ParamSpec::parse("- limit: integer = 10 -- maximum entries").unwrap();
        assert_eq!(p.default, Some(json!(10)));
        assert_eq!(p.description.as_deref(), Some("maximum entries"));

        let p = ParamSpec::parse("- verbose: boolean (optional)").unwrap();
        assert!(!p.required);
        assert!(p.default.is_none());

        let p = ParamSpec::parse("- path: string").unwrap();
        assert!(p.required, "no default means required");
    }

    #[test]
    fn parse_spec_rejects_bad_lines() {
        assert!(ParamSpec::parse("- just words").is_err());
        assert!(ParamSpec::parse("- x: tensor").is_err());
        assert!(ParamSpec::parse("- n: integer = lots").is_err());
        assert!(ParamSpec::parse("- bad name: string").is_err());
    }

    #[test]
    fn coerce_textual_values() {
        assert_eq!(coerce(ParamType::Integer, json!("5")).unwrap(), json!(5));
        assert_eq!(coerce(ParamType::Integer, json!(5.0)).unwrap(), json!(5));
        assert!(coerce(ParamType::Integer, json!(5.5)).is_err());
        assert_eq!(coerce(ParamType::Number, json!("2.5")).unwrap(), json!(2.5));
        assert_eq!(coerce(ParamType::Boolean, json!("yes")).unwrap(), json!(true));
        assert_eq!(coerce(ParamType::String, json!(42)).unwrap(), json!("42"));
        assert_eq!(coerce(ParamType::Json, json!("[1,2]")).unwrap(), json!([1, 2]));
        assert!(coerce(ParamType::String, json!({"a": 1})).is_err());
    }

    #[test]
    fn bind_fills_defaults_and_drops_extras() {
        let specs = vec![
            ParamSpec::required("path", ParamType::String),
            ParamSpec::optional("limit", ParamType::Integer).with_default(json!(10)),
        ];
        let bound = bind("ls", &specs, params(json!({"path": "/tmp", "colour": "red"}))).unwrap();
        assert_eq!(bound.get("path"), Some(&json!("/tmp")));
        assert_eq!(bound.get("limit"), Some(&json!(10)));
        assert!(bound.get("colour").is_none());
    }

    #[test]
    fn bind_missing_required_is_error() {
        let specs = vec![ParamSpec::required("path", ParamType::String)];
        let err = bind("ls", &specs, Params::new()).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::MissingParameter {
                skill: "ls".into(),
                name: "path".into()
            }
        );

        // null counts as absent
        let err = bind("ls", &specs, params(json!({"path": null}))).unwrap_err();
        assert!(matches!(err, ExecutionError::MissingParameter { .. }));
    }

    #[test]
    fn bind_wrong_type_is_invalid_parameter() {
        let specs = vec![ParamSpec::required("count", ParamType::Integer)];
        let err = bind("n", &specs, params(json!({"count": "many"}))).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidParameter { ref name, .. } if name == "count"));
    }
}
