use serde_json::Value;

use crate::domain::schema::{ArraySchema, IntegerSchema, NumberSchema, ObjectSchema, StringSchema};
use crate::domain::{SchemaNode, ValidationError};

/// Checks payloads against resolved schemas.
///
/// Every violation in the payload is reported; validation never stops at the
/// first error. Properties the schema does not declare are accepted.
pub struct RequestValidator;

impl RequestValidator {
    pub fn validate(payload: &Value, node: &SchemaNode) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check(payload, node, "", &mut errors);
        errors
    }

    pub fn is_valid(payload: &Value, node: &SchemaNode) -> bool {
        Self::validate(payload, node).is_empty()
    }
}

fn check(value: &Value, node: &SchemaNode, field: &str, errors: &mut Vec<ValidationError>) {
    match node {
        SchemaNode::String(schema) => check_string(value, schema, field, errors),
        SchemaNode::Integer(schema) => check_integer(value, schema, field, errors),
        SchemaNode::Number(schema) => check_number(value, schema, field, errors),
        SchemaNode::Boolean => {
            if !value.is_boolean() {
                errors.push(ValidationError::mismatch(field, "boolean", json_type(value)));
            }
        }
        SchemaNode::Array(schema) => check_array(value, schema, field, errors),
        SchemaNode::Object(schema) => check_object(value, schema, field, errors),
        SchemaNode::Reference(_) | SchemaNode::Unconstrained => {}
    }
}

fn check_string(value: &Value, schema: &StringSchema, field: &str, errors: &mut Vec<ValidationError>) {
    let Some(text) = value.as_str() else {
        errors.push(ValidationError::mismatch(field, "string", json_type(value)));
        return;
    };
    if let Some(allowed) = &schema.enumeration {
        if !allowed.iter().any(|a| a == text) {
            errors.push(ValidationError::constraint(
                field,
                format!("'{}' is not one of [{}]", text, allowed.join(", ")),
            ));
        }
    }
}

fn check_integer(value: &Value, schema: &IntegerSchema, field: &str, errors: &mut Vec<ValidationError>) {
    let Some(number) = as_integer(value) else {
        errors.push(ValidationError::mismatch(field, "integer", json_type(value)));
        return;
    };
    if let Some(min) = schema.minimum {
        if number < min as f64 {
            errors.push(ValidationError::constraint(field, format!("{} is below minimum {}", number, min)));
        }
    }
    if let Some(max) = schema.maximum {
        if number > max as f64 {
            errors.push(ValidationError::constraint(field, format!("{} is above maximum {}", number, max)));
        }
    }
}

fn check_number(value: &Value, schema: &NumberSchema, field: &str, errors: &mut Vec<ValidationError>) {
    let Some(number) = value.as_f64() else {
        errors.push(ValidationError::mismatch(field, "number", json_type(value)));
        return;
    };
    if let Some(min) = schema.minimum {
        if number < min {
            errors.push(ValidationError::constraint(field, format!("{} is below minimum {}", number, min)));
        }
    }
    if let Some(max) = schema.maximum {
        if number > max {
            errors.push(ValidationError::constraint(field, format!("{} is above maximum {}", number, max)));
        }
    }
}

fn check_array(value: &Value, schema: &ArraySchema, field: &str, errors: &mut Vec<ValidationError>) {
    let Some(items) = value.as_array() else {
        errors.push(ValidationError::mismatch(field, "array", json_type(value)));
        return;
    };
    if let Some(min) = schema.min_items {
        if items.len() < min {
            errors.push(ValidationError::constraint(
                field,
                format!("{} items, at least {} required", items.len(), min),
            ));
        }
    }
    if let Some(max) = schema.max_items {
        if items.len() > max {
            errors.push(ValidationError::constraint(
                field,
                format!("{} items, at most {} allowed", items.len(), max),
            ));
        }
    }
    for (index, item) in items.iter().enumerate() {
        check(item, &schema.items, &format!("{}[{}]", field, index), errors);
    }
}

fn check_object(value: &Value, schema: &ObjectSchema, field: &str, errors: &mut Vec<ValidationError>) {
    let Some(map) = value.as_object() else {
        errors.push(ValidationError::mismatch(field, "object", json_type(value)));
        return;
    };
    for (name, property) in &schema.properties {
        let path = child_path(field, name);
        match map.get(name) {
            Some(child) => check(child, property, &path, errors),
            None if schema.required.contains(name) => errors.push(ValidationError::missing(path)),
            None => {}
        }
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

/// Integral value of a JSON number; `3.0` counts as an integer
fn as_integer(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => n.as_f64(),
        Value::Number(n) => n.as_f64().filter(|f| f.fract() == 0.0),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationErrorKind;
    use serde_json::json;

    fn parse(schema: Value) -> SchemaNode {
        SchemaNode::from_json(&schema).unwrap()
    }

    #[test]
    fn test_missing_required_field() {
        let node = parse(json!({ "required": ["name"], "properties": { "name": { "type": "string" } } }));
        let errors = RequestValidator::validate(&json!({}), &node);
        assert_eq!(errors, vec![ValidationError::missing("name")]);
        assert_eq!(errors[0].to_string(), "MissingField: name (required property is missing)");
    }

    #[test]
    fn test_all_errors_are_collected() {
        let node = parse(json!({
            "type": "object",
            "required": ["name", "age", "email"],
            "properties": {
                "name": { "type": "string" },
                "age": { "type": "integer" },
                "email": { "type": "string" },
                "active": { "type": "boolean" }
            }
        }));
        let errors = RequestValidator::validate(&json!({ "name": 5, "active": "yes" }), &node);

        assert_eq!(errors.len(), 4);
        let kinds: Vec<_> = errors.iter().map(|e| (e.field.as_str(), e.kind)).collect();
        assert!(kinds.contains(&("name", ValidationErrorKind::TypeMismatch)));
        assert!(kinds.contains(&("age", ValidationErrorKind::MissingField)));
        assert!(kinds.contains(&("email", ValidationErrorKind::MissingField)));
        assert!(kinds.contains(&("active", ValidationErrorKind::TypeMismatch)));
    }

    #[test]
    fn test_unknown_properties_are_accepted() {
        let node = parse(json!({ "type": "object", "properties": { "name": { "type": "string" } } }));
        assert!(RequestValidator::is_valid(&json!({ "name": "Rex", "color": "brown" }), &node));
    }

    #[test]
    fn test_array_errors_carry_index() {
        let node = parse(json!({
            "type": "object",
            "properties": {
                "pets": {
                    "type": "array",
                    "items": { "type": "object", "required": ["name"], "properties": { "name": { "type": "string" } } }
                }
            }
        }));
        let errors = RequestValidator::validate(
            &json!({ "pets": [{ "name": "Rex" }, {}, { "name": 1 }] }),
            &node,
        );
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "pets[1].name");
        assert_eq!(errors[0].kind, ValidationErrorKind::MissingField);
        assert_eq!(errors[1].field, "pets[2].name");
        assert_eq!(errors[1].kind, ValidationErrorKind::TypeMismatch);
    }

    #[test]
    fn test_root_type_mismatch() {
        let node = parse(json!({ "type": "object" }));
        let errors = RequestValidator::validate(&json!([1, 2]), &node);
        assert_eq!(errors, vec![ValidationError::mismatch("", "object", "array")]);
    }

    #[test]
    fn test_integer_accepts_integral_floats() {
        let node = parse(json!({ "type": "integer" }));
        assert!(RequestValidator::is_valid(&json!(3), &node));
        assert!(RequestValidator::is_valid(&json!(3.0), &node));
        assert!(!RequestValidator::is_valid(&json!(3.5), &node));
        assert!(!RequestValidator::is_valid(&json!("3"), &node));
    }

    #[test]
    fn test_constraint_violations() {
        let node = parse(json!({
            "type": "object",
            "properties": {
                "status": { "enum": ["available", "sold"] },
                "age": { "type": "integer", "minimum": 0, "maximum": 30 },
                "score": { "type": "number", "maximum": 1.5 },
                "tags": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
            }
        }));
        let errors = RequestValidator::validate(
            &json!({ "status": "lost", "age": 31, "score": 2, "tags": [] }),
            &node,
        );
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().all(|e| e.kind == ValidationErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_unconstrained_accepts_anything() {
        let node = parse(json!({}));
        assert!(RequestValidator::is_valid(&json!(null), &node));
        assert!(RequestValidator::is_valid(&json!({ "a": [1, "b"] }), &node));
    }
}
