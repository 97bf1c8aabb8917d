//! OpenAPI 3 (and Swagger 2 body parameter) import.

use serde_json::{Map, Value};

use crate::domain::{HttpMethod, MockError, RegisterCommand, RequestKind, ResponseKind};

const JSON_MEDIA_TYPE: &str = "application/json";

/// One registration per path and operation.
///
/// `components` (and Swagger `definitions`) travel with every command so that
/// `#/components/schemas/...` references resolve.
pub fn to_commands(document: &Value) -> Result<Vec<RegisterCommand>, MockError> {
    let paths = document
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| MockError::MalformedInput("OpenAPI document has no 'paths' object".to_string()))?;

    let mut definitions = Map::new();
    for key in ["components", "definitions"] {
        if let Some(section) = document.get(key) {
            definitions.insert(key.to_string(), section.clone());
        }
    }

    let mut commands = Vec::new();
    for (path, item) in paths {
        let Some(operations) = item.as_object() else {
            continue;
        };
        for (name, operation) in operations {
            // Path items also carry `parameters`, `summary` and friends
            let Ok(method) = name.parse::<HttpMethod>() else {
                continue;
            };

            let mut command = RegisterCommand::new(path.clone(), method, Value::Null, Value::Null)
                .with_definitions(definitions.clone());

            if let Some(schema) = request_schema(operation) {
                command.request = schema.clone();
                command.request_kind = Some(RequestKind::Schema);
            }

            let (status, response, kind) = response_body(operation);
            command.response = response;
            command.response_kind = Some(kind);
            command.status = status;

            commands.push(command);
        }
    }
    Ok(commands)
}

/// Parse a document given as JSON or YAML text
pub fn parse_document(raw: &[u8]) -> Result<Value, MockError> {
    serde_json::from_slice::<Value>(raw)
        .or_else(|_| serde_yaml::from_slice::<Value>(raw))
        .map_err(|e| MockError::MalformedInput(format!("OpenAPI document is neither JSON nor YAML: {}", e)))
}

fn request_schema(operation: &Value) -> Option<&Value> {
    operation
        .pointer("/requestBody/content")
        .and_then(|content| content.get(JSON_MEDIA_TYPE))
        .and_then(|media| media.get("schema"))
        .or_else(|| {
            operation
                .get("parameters")
                .and_then(Value::as_array)?
                .iter()
                .find(|p| p.get("in").and_then(Value::as_str) == Some("body"))
                .and_then(|p| p.get("schema"))
        })
}

/// Pick the documented success response: 200, then 201, then any other 2xx,
/// then `default`.
fn response_body(operation: &Value) -> (Option<u16>, Value, ResponseKind) {
    let Some(responses) = operation.get("responses").and_then(Value::as_object) else {
        return (None, Value::Object(Map::new()), ResponseKind::Literal);
    };

    let mut success: Vec<&String> = responses
        .keys()
        .filter(|code| code.len() == 3 && code.starts_with('2') && code.parse::<u16>().is_ok())
        .collect();
    success.sort_by_key(|code| match code.as_str() {
        "200" => (0, String::new()),
        "201" => (1, String::new()),
        other => (2, other.to_string()),
    });

    let chosen = success
        .first()
        .map(|code| (code.parse::<u16>().ok(), &responses[code.as_str()]))
        .or_else(|| responses.get("default").map(|r| (None, r)));

    let Some((status, response)) = chosen else {
        return (None, Value::Object(Map::new()), ResponseKind::Literal);
    };

    let media = response
        .get("content")
        .and_then(|content| content.get(JSON_MEDIA_TYPE));
    if let Some(schema) = media.and_then(|m| m.get("schema")) {
        return (status, schema.clone(), ResponseKind::Schema);
    }
    if let Some(example) = media.and_then(|m| m.get("example")) {
        return (status, example.clone(), ResponseKind::Literal);
    }
    if let Some(schema) = response.get("schema") {
        return (status, schema.clone(), ResponseKind::Schema);
    }
    (status, Value::Object(Map::new()), ResponseKind::Literal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_yaml_document() {
        let raw = "openapi: 3.0.0\npaths:\n  /ping:\n    get:\n      responses:\n        '200':\n          content:\n            application/json:\n              example:\n                ok: true\n";
        let document = parse_document(raw.as_bytes()).unwrap();
        assert_eq!(document["openapi"], "3.0.0");

        let commands = to_commands(&document).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].response, json!({ "ok": true }));
    }

    #[test]
    fn test_parse_json_document() {
        let document = parse_document(br#"{"paths": {}}"#).unwrap();
        assert!(to_commands(&document).unwrap().is_empty());
        assert!(parse_document(b"{ unbalanced: [").is_err());
    }

    fn petstore() -> Value {
        json!({
            "openapi": "3.0.0",
            "info": { "title": "Petstore", "version": "1.0.0" },
            "paths": {
                "/pets": {
                    "summary": "Pets",
                    "get": {
                        "responses": {
                            "200": {
                                "description": "A list of pets",
                                "content": {
                                    "application/json": {
                                        "schema": { "type": "array", "items": { "$ref": "#/components/schemas/Pet" } }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "requestBody": {
                            "content": {
                                "application/json": { "schema": { "$ref": "#/components/schemas/NewPet" } }
                            }
                        },
                        "responses": {
                            "default": { "description": "error" },
                            "201": {
                                "description": "created",
                                "content": { "application/json": { "example": { "created": true } } }
                            }
                        }
                    }
                },
                "/pets/{petId}": {
                    "delete": { "responses": { "204": { "description": "deleted" } } }
                }
            },
            "components": {
                "schemas": {
                    "Pet": { "type": "object", "required": ["id"], "properties": { "id": { "type": "integer" } } },
                    "NewPet": { "type": "object", "required": ["name"], "properties": { "name": { "type": "string" } } }
                }
            }
        })
    }

    #[test]
    fn test_operations_become_commands() {
        let commands = to_commands(&petstore()).unwrap();
        assert_eq!(commands.len(), 3);

        let get = commands.iter().find(|c| c.path == "/pets" && c.method == HttpMethod::Get).unwrap();
        assert_eq!(get.request, Value::Null);
        assert_eq!(get.response_kind, Some(ResponseKind::Schema));
        assert_eq!(get.status, Some(200));
        assert!(get.definitions.contains_key("components"));

        let post = commands.iter().find(|c| c.method == HttpMethod::Post).unwrap();
        assert_eq!(post.request, json!({ "$ref": "#/components/schemas/NewPet" }));
        assert_eq!(post.request_kind, Some(RequestKind::Schema));
        assert_eq!(post.response, json!({ "created": true }));
        assert_eq!(post.response_kind, Some(ResponseKind::Literal));
        assert_eq!(post.status, Some(201));

        let delete = commands.iter().find(|c| c.method == HttpMethod::Delete).unwrap();
        assert_eq!(delete.path, "/pets/{petId}");
        assert_eq!(delete.status, Some(204));
        assert_eq!(delete.response, json!({}));
    }

    #[test]
    fn test_swagger_body_parameter() {
        let document = json!({
            "swagger": "2.0",
            "paths": {
                "/orders": {
                    "post": {
                        "parameters": [
                            { "in": "query", "name": "dry_run", "type": "boolean" },
                            { "in": "body", "name": "order", "schema": { "$ref": "#/definitions/Order" } }
                        ],
                        "responses": { "200": { "schema": { "$ref": "#/definitions/Order" } } }
                    }
                }
            },
            "definitions": { "Order": { "type": "object", "properties": { "qty": { "type": "integer" } } } }
        });
        let commands = to_commands(&document).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].request, json!({ "$ref": "#/definitions/Order" }));
        assert_eq!(commands[0].response_kind, Some(ResponseKind::Schema));
        assert!(commands[0].definitions.contains_key("definitions"));
    }

    #[test]
    fn test_document_without_paths_is_malformed() {
        let err = to_commands(&json!({ "openapi": "3.0.0" })).unwrap_err();
        assert!(matches!(err, MockError::MalformedInput(_)));
    }
}
