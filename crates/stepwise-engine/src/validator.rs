use jsonschema::{Draft, JSONSchema};
use serde_json::{Map, Value};

use stepwise_core::traits::{SchemaValidator, ValidationFailure};

/// JSON Schema validator backed by the `jsonschema` crate.
///
/// Missing properties that declare a `default` are filled in before
/// validation, so `{"type": "object", "properties": {"n": {"default": 0}}}`
/// turns `{}` into `{"n": 0}`.
#[derive(Debug, Clone)]
pub struct JsonSchemaValidator {
    draft: Draft,
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self {
            draft: Draft::Draft7,
        }
    }

    pub fn with_draft(draft: Draft) -> Self {
        Self { draft }
    }
}

impl Default for JsonSchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, value: &Value, schema: &Value) -> Result<Value, ValidationFailure> {
        let compiled = JSONSchema::options()
            .with_draft(self.draft)
            .compile(schema)
            .map_err(|e| ValidationFailure::single(format!("invalid schema: {}", e)))?;

        let mut value = value.clone();
        apply_defaults(&mut value, schema);

        let issues: Vec<String> = match compiled.validate(&value) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{} at {}", e, path)
                    }
                })
                .collect(),
        };

        if issues.is_empty() {
            Ok(value)
        } else {
            Err(ValidationFailure::new(issues))
        }
    }
}

/// Fill in `default` values declared under `properties`, recursively.
fn apply_defaults(value: &mut Value, schema: &Value) {
    let (Some(obj), Some(props)) = (
        value.as_object_mut(),
        schema.get("properties").and_then(Value::as_object),
    ) else {
        return;
    };

    for (key, prop_schema) in props {
        match obj.get_mut(key) {
            Some(existing) => apply_defaults(existing, prop_schema),
            None => {
                if let Some(default) = prop_schema.get("default") {
                    let mut default = default.clone();
                    apply_defaults(&mut default, prop_schema);
                    obj.insert(key.clone(), default);
                }
            }
        }
    }
}

/// The part of the state a step schema talks about.
///
/// Schemas that list `properties` see only those keys; any other schema sees
/// the whole state.
pub(crate) fn state_slice(state: &Map<String, Value>, schema: &Value) -> Value {
    match schema.get("properties").and_then(Value::as_object) {
        Some(props) => Value::Object(
            props
                .keys()
                .filter_map(|k| state.get(k).map(|v| (k.clone(), v.clone())))
                .collect(),
        ),
        None => Value::Object(state.clone()),
    }
}
