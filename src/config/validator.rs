use std::collections::HashMap;
use thiserror::Error;

use crate::application::SchemaResolver;
use crate::config::{schema, LLMConfig, LLMProvider, SchemaConfig, ServerSettings, Settings, StoreBackend};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Cross-reference error: {0}")]
    CrossReference(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

pub struct ConfigValidator;

impl ConfigValidator {
    /// Collects every problem in the settings instead of stopping at the first.
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        Self::validate_server(&settings.server, &mut errors);
        Self::validate_admin(&settings.admin.prefix, &mut errors);
        Self::validate_store(settings, &mut errors);
        Self::validate_synthesis(settings, &mut errors);
        if let Some(llm) = &settings.llm {
            Self::validate_llm(llm, &mut errors);
        }
        Self::validate_schemas(&settings.schemas, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server(server: &ServerSettings, errors: &mut Vec<ValidationError>) {
        if server.host.is_empty() {
            errors.push(ValidationError::MissingField("server.host".to_string()));
        }

        if server.port == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "server.port".to_string(),
                reason: "Port must be greater than 0".to_string(),
            });
        }
    }

    fn validate_admin(prefix: &str, errors: &mut Vec<ValidationError>) {
        let trimmed = prefix.trim_end_matches('/');
        if !prefix.starts_with('/') || trimmed.is_empty() {
            errors.push(ValidationError::InvalidValue {
                field: "admin.prefix".to_string(),
                reason: "Prefix must start with '/' and name at least one segment".to_string(),
            });
        }
    }

    fn validate_store(settings: &Settings, errors: &mut Vec<ValidationError>) {
        if settings.store.backend != StoreBackend::Memory && settings.store.path.trim().is_empty() {
            errors.push(ValidationError::MissingField("store.path".to_string()));
        }
    }

    fn validate_synthesis(settings: &Settings, errors: &mut Vec<ValidationError>) {
        let synthesis = &settings.synthesis;
        if synthesis.integer_range.0 > synthesis.integer_range.1 {
            errors.push(ValidationError::InvalidValue {
                field: "synthesis.integer_range".to_string(),
                reason: "Lower bound exceeds upper bound".to_string(),
            });
        }
        if synthesis.number_range.0 > synthesis.number_range.1 {
            errors.push(ValidationError::InvalidValue {
                field: "synthesis.number_range".to_string(),
                reason: "Lower bound exceeds upper bound".to_string(),
            });
        }
        if synthesis.array_items.0 > synthesis.array_items.1 {
            errors.push(ValidationError::InvalidValue {
                field: "synthesis.array_items".to_string(),
                reason: "Lower bound exceeds upper bound".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&synthesis.optional_property_probability) {
            errors.push(ValidationError::InvalidValue {
                field: "synthesis.optional_property_probability".to_string(),
                reason: "Probability must be between 0 and 1".to_string(),
            });
        }
    }

    fn validate_llm(llm: &LLMConfig, errors: &mut Vec<ValidationError>) {
        if llm.model.is_empty() {
            errors.push(ValidationError::MissingField("llm.model".to_string()));
        }
        match &llm.api_key_env {
            None => errors.push(ValidationError::MissingField("llm.api_key_env".to_string())),
            Some(var) if var.is_empty() => {
                errors.push(ValidationError::MissingField("llm.api_key_env".to_string()))
            }
            Some(_) => {}
        }
        if let Some(temperature) = llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                errors.push(ValidationError::InvalidValue {
                    field: "llm.temperature".to_string(),
                    reason: "Temperature must be between 0 and 2".to_string(),
                });
            }
        }
        if let Some(max_tokens) = llm.max_tokens {
            if max_tokens == 0 {
                errors.push(ValidationError::InvalidValue {
                    field: "llm.max_tokens".to_string(),
                    reason: "Token limit must be positive".to_string(),
                });
            } else if matches!(llm.provider, LLMProvider::OpenAI) && max_tokens > u32::from(u16::MAX) {
                errors.push(ValidationError::InvalidValue {
                    field: "llm.max_tokens".to_string(),
                    reason: format!("OpenAI accepts at most {} tokens", u16::MAX),
                });
            }
        }
    }

    fn validate_schemas(schemas: &[SchemaConfig], errors: &mut Vec<ValidationError>) {
        let mut seen_names = HashMap::new();
        for (idx, schema) in schemas.iter().enumerate() {
            if schema.name.is_empty() {
                errors.push(ValidationError::MissingField(format!("schemas[{}].name", idx)));
            }
            if let Some(prev_idx) = seen_names.insert(&schema.name, idx) {
                errors.push(ValidationError::Duplicate(format!(
                    "Schema name '{}' appears at indices {} and {}",
                    schema.name, prev_idx, idx
                )));
            }
        }

        // Every schema must resolve against the catalog it belongs to
        let resolver = SchemaResolver::new(schema::catalog(schemas));
        for schema in schemas {
            if let Err(e) = resolver.resolve_document(&schema::make_schema_ref(&schema.name), &schema.schema) {
                errors.push(ValidationError::CrossReference(format!(
                    "Schema '{}': {}",
                    schema.name, e
                )));
            }
        }
    }
}
