//! Typed schema tree.
//!
//! Schema documents arrive as JSON (JSON Schema subset). They are parsed once,
//! at registration time, into [`SchemaNode`]; the engine never inspects raw
//! schema JSON afterwards.
//!
//! ```yaml
//! type: object
//! required: [name]
//! properties:
//!   name: { type: string }
//!   email: { type: string, format: email }
//!   tags:
//!     type: array
//!     items: { type: string, enum: [a, b] }
//!     maxItems: 4
//!   owner: { $ref: "#/definitions/Owner" }
//! ```

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::error::SchemaError;

/// Type names understood in the `type` keyword
pub const SCHEMA_TYPES: &[&str] = &["string", "integer", "number", "boolean", "array", "object"];

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    String(StringSchema),
    Integer(IntegerSchema),
    Number(NumberSchema),
    Boolean,
    Array(ArraySchema),
    Object(ObjectSchema),
    /// Unexpanded `$ref`; never present after resolution
    Reference(String),
    Unconstrained,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringSchema {
    pub format: Option<StringFormat>,
    pub enumeration: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntegerSchema {
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NumberSchema {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub items: Box<SchemaNode>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

/// Object node. Every name in `required` is also a key of `properties`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    pub properties: BTreeMap<String, SchemaNode>,
    pub required: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringFormat {
    DateTime,
    Date,
    Email,
    Uuid,
    Uri,
    Name,
    Other(String),
}

impl StringFormat {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "date-time" => StringFormat::DateTime,
            "date" => StringFormat::Date,
            "email" => StringFormat::Email,
            "uuid" => StringFormat::Uuid,
            "uri" | "url" => StringFormat::Uri,
            "name" => StringFormat::Name,
            other => StringFormat::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StringFormat::DateTime => "date-time",
            StringFormat::Date => "date",
            StringFormat::Email => "email",
            StringFormat::Uuid => "uuid",
            StringFormat::Uri => "uri",
            StringFormat::Name => "name",
            StringFormat::Other(tag) => tag,
        }
    }
}

impl SchemaNode {
    /// Parse a schema document. `$ref` nodes are kept as [`SchemaNode::Reference`].
    pub fn from_json(value: &Value) -> Result<Self, SchemaError> {
        parse_node(value, "#")
    }

    /// Whether a registration payload should be read as a schema rather than a literal.
    pub fn looks_like_schema(value: &Value) -> bool {
        let Some(map) = value.as_object() else {
            return false;
        };
        let typed = map
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| SCHEMA_TYPES.contains(&t));
        typed
            || map.get("$ref").is_some_and(Value::is_string)
            || map.get("properties").is_some_and(Value::is_object)
            || map.get("items").is_some_and(Value::is_object)
            || map.get("required").is_some_and(Value::is_array)
            || map.get("enum").is_some_and(Value::is_array)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SchemaNode::String(_) => "string",
            SchemaNode::Integer(_) => "integer",
            SchemaNode::Number(_) => "number",
            SchemaNode::Boolean => "boolean",
            SchemaNode::Array(_) => "array",
            SchemaNode::Object(_) => "object",
            SchemaNode::Reference(_) => "reference",
            SchemaNode::Unconstrained => "any",
        }
    }

    pub fn contains_reference(&self) -> bool {
        match self {
            SchemaNode::Reference(_) => true,
            SchemaNode::Array(array) => array.items.contains_reference(),
            SchemaNode::Object(object) => object.properties.values().any(SchemaNode::contains_reference),
            _ => false,
        }
    }

    /// Render back to a JSON Schema document
    pub fn to_json(&self) -> Value {
        match self {
            SchemaNode::String(s) => {
                let mut map = Map::new();
                map.insert("type".into(), json!("string"));
                if let Some(format) = &s.format {
                    map.insert("format".into(), json!(format.as_str()));
                }
                if let Some(values) = &s.enumeration {
                    map.insert("enum".into(), json!(values));
                }
                Value::Object(map)
            }
            SchemaNode::Integer(i) => {
                let mut map = Map::new();
                map.insert("type".into(), json!("integer"));
                if let Some(min) = i.minimum {
                    map.insert("minimum".into(), json!(min));
                }
                if let Some(max) = i.maximum {
                    map.insert("maximum".into(), json!(max));
                }
                Value::Object(map)
            }
            SchemaNode::Number(n) => {
                let mut map = Map::new();
                map.insert("type".into(), json!("number"));
                if let Some(min) = n.minimum {
                    map.insert("minimum".into(), json!(min));
                }
                if let Some(max) = n.maximum {
                    map.insert("maximum".into(), json!(max));
                }
                Value::Object(map)
            }
            SchemaNode::Boolean => json!({ "type": "boolean" }),
            SchemaNode::Array(a) => {
                let mut map = Map::new();
                map.insert("type".into(), json!("array"));
                map.insert("items".into(), a.items.to_json());
                if let Some(min) = a.min_items {
                    map.insert("minItems".into(), json!(min));
                }
                if let Some(max) = a.max_items {
                    map.insert("maxItems".into(), json!(max));
                }
                Value::Object(map)
            }
            SchemaNode::Object(o) => {
                let properties: Map<String, Value> = o
                    .properties
                    .iter()
                    .map(|(name, node)| (name.clone(), node.to_json()))
                    .collect();
                let mut map = Map::new();
                map.insert("type".into(), json!("object"));
                map.insert("properties".into(), Value::Object(properties));
                if !o.required.is_empty() {
                    map.insert("required".into(), json!(o.required));
                }
                Value::Object(map)
            }
            SchemaNode::Reference(target) => json!({ "$ref": target }),
            SchemaNode::Unconstrained => json!({}),
        }
    }
}

fn parse_node(value: &Value, at: &str) -> Result<SchemaNode, SchemaError> {
    let map = match value {
        Value::Object(map) => map,
        Value::Bool(true) => return Ok(SchemaNode::Unconstrained),
        _ => return Err(SchemaError::malformed(at, "schema must be an object")),
    };

    if let Some(target) = map.get("$ref") {
        return match target {
            Value::String(target) => Ok(SchemaNode::Reference(target.clone())),
            _ => Err(SchemaError::malformed(at, "$ref must be a string")),
        };
    }

    let type_name = match map.get("type") {
        Some(Value::String(t)) => t.as_str(),
        Some(_) => return Err(SchemaError::malformed(at, "type must be a string")),
        None => infer_type(map),
    };

    match type_name {
        "string" => parse_string(map, at),
        "integer" => parse_integer(map, at),
        "number" => parse_number(map, at),
        "boolean" => Ok(SchemaNode::Boolean),
        "array" => parse_array(map, at),
        "object" => parse_object(map, at),
        "" => Ok(SchemaNode::Unconstrained),
        other => Err(SchemaError::malformed(at, format!("unsupported type '{}'", other))),
    }
}

fn infer_type(map: &Map<String, Value>) -> &'static str {
    if map.contains_key("properties") || map.contains_key("required") {
        "object"
    } else if map.contains_key("items") {
        "array"
    } else if map
        .get("enum")
        .and_then(Value::as_array)
        .is_some_and(|values| values.iter().all(Value::is_string))
    {
        "string"
    } else {
        ""
    }
}

fn parse_string(map: &Map<String, Value>, at: &str) -> Result<SchemaNode, SchemaError> {
    let format = map.get("format").and_then(Value::as_str).map(StringFormat::parse);
    let enumeration = match map.get("enum") {
        None => None,
        Some(Value::Array(values)) => {
            let strings: Option<Vec<String>> = values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect();
            match strings {
                Some(strings) if !strings.is_empty() => Some(strings),
                Some(_) => return Err(SchemaError::malformed(at, "enum must not be empty")),
                None => return Err(SchemaError::malformed(at, "string enum must only contain strings")),
            }
        }
        Some(_) => return Err(SchemaError::malformed(at, "enum must be an array")),
    };
    Ok(SchemaNode::String(StringSchema { format, enumeration }))
}

fn bound(map: &Map<String, Value>, key: &str, at: &str) -> Result<Option<f64>, SchemaError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| SchemaError::malformed(at, format!("{} must be a number", key))),
    }
}

fn parse_integer(map: &Map<String, Value>, at: &str) -> Result<SchemaNode, SchemaError> {
    let minimum = bound(map, "minimum", at)?.map(|m| m.ceil() as i64);
    let maximum = bound(map, "maximum", at)?.map(|m| m.floor() as i64);
    if let (Some(min), Some(max)) = (minimum, maximum) {
        if min > max {
            return Err(SchemaError::malformed(at, "minimum is greater than maximum"));
        }
    }
    Ok(SchemaNode::Integer(IntegerSchema { minimum, maximum }))
}

fn parse_number(map: &Map<String, Value>, at: &str) -> Result<SchemaNode, SchemaError> {
    let minimum = bound(map, "minimum", at)?;
    let maximum = bound(map, "maximum", at)?;
    if let (Some(min), Some(max)) = (minimum, maximum) {
        if min > max {
            return Err(SchemaError::malformed(at, "minimum is greater than maximum"));
        }
    }
    Ok(SchemaNode::Number(NumberSchema { minimum, maximum }))
}

fn count(map: &Map<String, Value>, key: &str, at: &str) -> Result<Option<usize>, SchemaError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| SchemaError::malformed(at, format!("{} must be a non-negative integer", key))),
    }
}

fn parse_array(map: &Map<String, Value>, at: &str) -> Result<SchemaNode, SchemaError> {
    let items = match map.get("items") {
        Some(items) => parse_node(items, &format!("{}/items", at))?,
        None => SchemaNode::Unconstrained,
    };
    let min_items = count(map, "minItems", at)?;
    let max_items = count(map, "maxItems", at)?;
    if let (Some(min), Some(max)) = (min_items, max_items) {
        if min > max {
            return Err(SchemaError::malformed(at, "minItems is greater than maxItems"));
        }
    }
    Ok(SchemaNode::Array(ArraySchema {
        items: Box::new(items),
        min_items,
        max_items,
    }))
}

fn parse_object(map: &Map<String, Value>, at: &str) -> Result<SchemaNode, SchemaError> {
    let mut properties = BTreeMap::new();
    match map.get("properties") {
        None | Some(Value::Null) => {}
        Some(Value::Object(props)) => {
            for (name, schema) in props {
                let node = parse_node(schema, &format!("{}/properties/{}", at, name))?;
                properties.insert(name.clone(), node);
            }
        }
        Some(_) => return Err(SchemaError::malformed(at, "properties must be an object")),
    }

    let mut required = BTreeSet::new();
    match map.get("required") {
        None | Some(Value::Null) => {}
        Some(Value::Array(names)) => {
            for name in names {
                let name = name
                    .as_str()
                    .ok_or_else(|| SchemaError::malformed(at, "required must only contain strings"))?;
                // A required name without a declaration accepts any value
                properties
                    .entry(name.to_string())
                    .or_insert(SchemaNode::Unconstrained);
                required.insert(name.to_string());
            }
        }
        Some(_) => return Err(SchemaError::malformed(at, "required must be an array")),
    }

    Ok(SchemaNode::Object(ObjectSchema { properties, required }))
}
