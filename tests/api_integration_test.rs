use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use proteus::adapters::api_handler::AppState;
use proteus::adapters::file_store::MemoryStore;
use proteus::application::{ContractRegistry, RegistryOptions, SchemaResolver, ValueSynthesizer};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

fn app() -> Router {
    let registry = Arc::new(ContractRegistry::new(
        Arc::new(MemoryStore::new()),
        SchemaResolver::default(),
        ValueSynthesizer::default(),
        RegistryOptions::default(),
    ));
    let state = AppState::new(registry).unwrap();
    proteus::create_app(state, "/__admin")
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes, _) = send_raw(app, method, uri, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>, axum::http::HeaderMap) {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec(), headers)
}

fn pet_contract() -> Value {
    json!({
        "method": "POST",
        "request": {
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        },
        "response": {
            "type": "object",
            "required": ["id", "name"],
            "properties": {
                "id": { "type": "integer" },
                "name": { "type": "string" }
            }
        }
    })
}

#[tokio::test]
async fn test_register_validate_and_synthesize() {
    let app = app();

    let (status, body) = send(&app, "POST", "/__admin/contracts/pet", Some(pet_contract())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert!(body["data"]["id"].as_str().is_some());

    // Missing required field
    let (status, body) = send(&app, "POST", "/pet", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "name");
    assert_eq!(body["details"][0]["kind"], "missing_field");

    // Valid request gets a synthesized body
    let (status, body) = send(&app, "POST", "/pet", Some(json!({ "name": "Rex" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["id"].is_i64());
    assert!(body["name"].is_string());
}

#[tokio::test]
async fn test_identical_registration_conflicts() {
    let app = app();

    let (status, _) = send(&app, "POST", "/__admin/contracts/pet", Some(pet_contract())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "POST", "/__admin/contracts/pet", Some(pet_contract())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert!(body["details"]["existing"].is_string());
}

#[tokio::test]
async fn test_path_parameters_and_method_mismatch() {
    let app = app();

    let registration = json!({ "method": "GET", "response": { "name": "Ada" } });
    let (status, body) = send(&app, "POST", "/__admin/contracts/users/%7Bid%7D", Some(registration)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/users/42", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "name": "Ada" }));

    let (status, _, headers) = send_raw(&app, "DELETE", "/users/42", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers[header::ALLOW], "GET");

    let (status, _) = send(&app, "GET", "/users/42/orders", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Deleting the only instance removes the contract
    let uri = format!("/__admin/contracts/users/%7Bid%7D/{}", id);
    let (status, body) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["contracts_removed"], 1);

    let (status, _) = send(&app, "GET", "/users/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_traffic_is_recorded_with_bindings() {
    let app = app();

    let registration = json!({ "method": "POST", "response": { "ok": true } });
    let (status, _) = send(&app, "POST", "/__admin/contracts/users/%7Bid%7D/orders", Some(registration)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "POST", "/users/42/orders?source=web", Some(json!({ "item": "book" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "ok": true }));

    let (status, body) = send(&app, "GET", "/__admin/contracts/users/%7Bid%7D/orders", None).await;
    assert_eq!(status, StatusCode::OK);
    let instances = body["data"][0]["instances"].as_array().unwrap();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[1]["origin"], "recorded");
    assert_eq!(instances[1]["request"], json!({ "item": "book" }));
    assert_eq!(instances[1]["params"]["id"], "42");
    assert_eq!(instances[1]["params"]["source"], "web");
}

#[tokio::test]
async fn test_instance_fetch_and_patch() {
    let app = app();

    let (_, body) = send(&app, "POST", "/__admin/contracts/pet", Some(pet_contract())).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/__admin/contracts/pet/{}", id);

    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["data"]["request_kind"], "schema");

    let (status, body) = send(&app, "PUT", &uri, Some(json!({ "status": 202 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], 202);
    assert!(body["data"]["updated_at"].is_string());

    let (status, _) = send(&app, "POST", "/pet", Some(json!({ "name": "Rex" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&app, "PUT", &uri, Some(json!({ "status": 42 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let (_, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(body["data"]["status"], 202);

    let (status, _) = send(&app, "PUT", "/__admin/contracts/pet", Some(json!({ "status": 200 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_contracts_and_delete_path() {
    let app = app();

    send(&app, "POST", "/__admin/contracts/pet", Some(pet_contract())).await;
    send(&app, "POST", "/__admin/contracts", Some(json!({ "path": "/pet", "method": "GET", "response": [] }))).await;

    let (status, body) = send(&app, "GET", "/__admin/contracts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, "DELETE", "/__admin/contracts/pet?method=GET", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["contracts_removed"], 1);

    let (status, body) = send(&app, "DELETE", "/__admin/contracts/pet", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["contracts_removed"], 1);

    let (status, _) = send(&app, "DELETE", "/__admin/contracts/pet", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_registration() {
    let app = app();

    let (status, body) = send(&app, "POST", "/__admin/contracts/pet", Some(json!({ "method": "TRACE", "response": {} }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let broken = json!({
        "method": "GET",
        "response": { "$ref": "#/definitions/Missing" }
    });
    let (status, _) = send(&app, "POST", "/__admin/contracts/pet", Some(broken)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/pet", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_openapi_import() {
    let app = app();

    let document = json!({
        "openapi": "3.0.0",
        "info": { "title": "Petstore", "version": "1.0.0" },
        "paths": {
            "/pets": {
                "get": {
                    "responses": {
                        "200": {
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "array",
                                        "items": { "$ref": "#/components/schemas/Pet" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Pet": {
                    "type": "object",
                    "required": ["id"],
                    "properties": { "id": { "type": "integer" } }
                }
            }
        }
    });

    let (status, body) = send(&app, "POST", "/__admin/import/openapi", Some(document)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["registered"].as_array().unwrap().len(), 1);

    let (status, body) = send(&app, "GET", "/pets", None).await;
    assert_eq!(status, StatusCode::OK);
    let pets = body.as_array().unwrap();
    assert!(!pets.is_empty());
    assert!(pets.iter().all(|pet| pet["id"].is_i64()));
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = app();

    send(&app, "POST", "/__admin/contracts/pet", Some(pet_contract())).await;
    send(&app, "POST", "/pet", Some(json!({}))).await;

    let (status, body) = send(&app, "GET", "/__admin/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["contracts"], 1);

    let (status, bytes, _) = send_raw(&app, "GET", "/__admin/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("proteus_registrations_total 1"));
    assert!(text.contains("proteus_validation_rejections_total 1"));
    assert!(text.contains("proteus_contracts 1"));
}
