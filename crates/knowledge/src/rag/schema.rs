//! Declarative answer schemas.
//!
//! A schema is declared once and used twice: rendered to JSON Schema for the
//! provider's output constraint, and checked against whatever comes back.
//! Provider output is never trusted to conform.

use serde_json::{json, Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Boolean,
    /// String restricted to a closed set of values
    Enum(Vec<String>),
    StringList,
}

impl FieldType {
    fn label(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Enum(_) => "enum",
            FieldType::StringList => "list of strings",
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            FieldType::String => json!({"type": "string"}),
            FieldType::Boolean => json!({"type": "boolean"}),
            FieldType::Enum(values) => json!({"type": "string", "enum": values}),
            FieldType::StringList => json!({"type": "array", "items": {"type": "string"}}),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String | FieldType::Enum(_) => value.is_string(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: Option<String>,
}

/// One reason a response did not conform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    NotJson(String),
    NotObject,
    UnknownField(String),
    MissingField(String),
    WrongType {
        field: String,
        expected: &'static str,
    },
    NotInEnum {
        field: String,
        value: String,
        allowed: Vec<String>,
    },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaViolation::NotJson(e) => write!(f, "response is not valid JSON ({})", e),
            SchemaViolation::NotObject => f.write_str("response must be a JSON object"),
            SchemaViolation::UnknownField(name) => write!(f, "unknown field \"{}\"", name),
            SchemaViolation::MissingField(name) => {
                write!(f, "missing required field \"{}\"", name)
            }
            SchemaViolation::WrongType { field, expected } => {
                write!(f, "field \"{}\" must be a {}", field, expected)
            }
            SchemaViolation::NotInEnum {
                field,
                value,
                allowed,
            } => write!(
                f,
                "field \"{}\" has value \"{}\", expected one of: {}",
                field,
                value,
                allowed.join(", ")
            ),
        }
    }
}

/// A closed set of named, typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnswerSchema {
    fields: Vec<FieldSpec>,
}

impl AnswerSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. A later field with the same name replaces the earlier one.
    pub fn field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        required: bool,
        description: Option<&str>,
    ) -> Self {
        let spec = FieldSpec {
            name: name.into(),
            field_type,
            required,
            description: description.map(str::to_string),
        };
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Schema for grounded answers.
    pub fn answer_default() -> Self {
        Self::new()
            .field(
                "answer",
                FieldType::String,
                true,
                Some("Direct answer to the question, based only on the documents"),
            )
            .field(
                "reasoning",
                FieldType::String,
                true,
                Some("Which document facts support the answer"),
            )
            .field(
                "cited_sources",
                FieldType::StringList,
                true,
                Some("Exact source filenames relied on"),
            )
            .field(
                "policy_allows_remote",
                FieldType::Boolean,
                false,
                Some("For remote-work questions: whether the current policy allows it"),
            )
            .field("confidence", confidence_levels(), false, None)
    }

    /// Schema for LLM intent classification.
    pub fn intent() -> Self {
        Self::new()
            .field(
                "intent",
                FieldType::Enum(
                    ["policy", "menu", "memo", "general"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                true,
                None,
            )
            .field("reasoning", FieldType::String, true, None)
            .field("confidence", confidence_levels(), false, None)
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.fields {
            let mut property = spec.field_type.to_json_schema();
            if let (Some(description), Some(obj)) = (&spec.description, property.as_object_mut())
            {
                obj.insert("description".to_string(), json!(description));
            }
            properties.insert(spec.name.clone(), property);
        }

        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Every way `value` fails to conform. Empty means valid.
    pub fn validate(&self, value: &Value) -> Vec<SchemaViolation> {
        let Some(object) = value.as_object() else {
            return vec![SchemaViolation::NotObject];
        };

        let mut violations = Vec::new();

        for name in object.keys() {
            if self.spec(name).is_none() {
                violations.push(SchemaViolation::UnknownField(name.clone()));
            }
        }

        for spec in &self.fields {
            match object.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    violations.push(SchemaViolation::MissingField(spec.name.clone()));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.field_type.accepts(value) => {
                    violations.push(SchemaViolation::WrongType {
                        field: spec.name.clone(),
                        expected: spec.field_type.label(),
                    });
                }
                Some(value) => {
                    if let (FieldType::Enum(allowed), Some(s)) = (&spec.field_type, value.as_str())
                    {
                        if !allowed.iter().any(|a| a == s) {
                            violations.push(SchemaViolation::NotInEnum {
                                field: spec.name.clone(),
                                value: s.to_string(),
                                allowed: allowed.clone(),
                            });
                        }
                    }
                }
            }
        }

        violations
    }

    /// Parse raw model output and validate it.
    ///
    /// Surrounding whitespace and a Markdown code fence are tolerated. Null
    /// optional fields are removed from the returned object.
    pub fn parse(&self, raw: &str) -> Result<Map<String, Value>, Vec<SchemaViolation>> {
        let value: Value = serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| vec![SchemaViolation::NotJson(e.to_string())])?;

        let violations = self.validate(&value);
        if !violations.is_empty() {
            return Err(violations);
        }

        match value {
            Value::Object(mut object) => {
                object.retain(|_, v| !v.is_null());
                Ok(object)
            }
            _ => Err(vec![SchemaViolation::NotObject]),
        }
    }
}

fn confidence_levels() -> FieldType {
    FieldType::Enum(
        ["high", "medium", "low"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    )
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().trim_end_matches("```").trim()
}

/// Bullet list of violations for a correction prompt.
pub fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("- {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}
