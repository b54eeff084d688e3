//! Declarative input schemas for the tool registry.
//!
//! A schema both renders the JSON Schema advertised to the model and checks
//! incoming tool input before it is decoded into a typed request.

use capplan_core::domain::worklog::parse_date;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    StringArray,
    /// `YYYY-MM-DD` calendar date.
    Date,
    Enum(&'static [&'static str]),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldType,
    pub required: bool,
    pub description: &'static str,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldType, description: &'static str) -> Self {
        Self { name, kind, required: true, description }
    }

    pub const fn optional(name: &'static str, kind: FieldType, description: &'static str) -> Self {
        Self { name, kind, required: false, description }
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        let name = self.name;
        match self.kind {
            FieldType::String if value.is_string() => Ok(()),
            FieldType::String => Err(format!("`{name}` must be a string")),
            FieldType::Integer if value.is_i64() || value.is_u64() => Ok(()),
            FieldType::Integer => Err(format!("`{name}` must be an integer")),
            FieldType::Number if value.is_number() => Ok(()),
            FieldType::Number => Err(format!("`{name}` must be a number")),
            FieldType::Boolean if value.is_boolean() => Ok(()),
            FieldType::Boolean => Err(format!("`{name}` must be a boolean")),
            FieldType::StringArray => match value.as_array() {
                Some(items) if items.iter().all(Value::is_string) => Ok(()),
                _ => Err(format!("`{name}` must be an array of strings")),
            },
            FieldType::Date => match value.as_str() {
                Some(raw) => parse_date(name, raw).map(|_| ()).map_err(|error| error.to_string()),
                None => Err(format!("`{name}` must be a YYYY-MM-DD string")),
            },
            FieldType::Enum(allowed) => match value.as_str() {
                Some(raw) if allowed.contains(&raw) => Ok(()),
                _ => Err(format!("`{name}` must be one of: {}", allowed.join(", "))),
            },
        }
    }

    fn to_json_schema(&self) -> Value {
        let mut property = match self.kind {
            FieldType::String => json!({"type": "string"}),
            FieldType::Integer => json!({"type": "integer"}),
            FieldType::Number => json!({"type": "number"}),
            FieldType::Boolean => json!({"type": "boolean"}),
            FieldType::StringArray => json!({"type": "array", "items": {"type": "string"}}),
            FieldType::Date => json!({"type": "string", "format": "date"}),
            FieldType::Enum(allowed) => json!({"type": "string", "enum": allowed}),
        };
        property["description"] = Value::String(self.description.to_string());
        property
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSchema {
    pub fields: &'static [FieldSpec],
}

impl InputSchema {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    /// Rejects non-object input, missing required fields and mistyped
    /// fields. Unknown fields are tolerated; a `null` optional field counts as
    /// absent.
    pub fn validate(&self, input: &Value) -> Result<(), String> {
        let object = input.as_object().ok_or_else(|| "input must be a JSON object".to_string())?;

        for field in self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!("missing required field `{}`", field.name));
                }
                None | Some(Value::Null) => {}
                Some(value) => field.check(value)?,
            }
        }
        Ok(())
    }

    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.to_string(), field.to_json_schema()))
            .collect();
        let required: Vec<&str> =
            self.fields.iter().filter(|field| field.required).map(|field| field.name).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
