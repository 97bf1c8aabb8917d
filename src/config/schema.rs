//! Shared named schemas.
//!
//! Files under `config/schemas/` each define one schema that contracts can
//! reference by name:
//!
//! ```yaml
//! name: UserInput
//! description: Standard user information schema
//! schema:
//!   type: object
//!   properties:
//!     name:
//!       type: string
//!     email:
//!       type: string
//!       format: email
//!   required:
//!     - name
//!     - email
//! ```
//!
//! A registration then uses `request: { $ref: UserInput }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::SchemaCatalog;

/// Configuration for a reusable JSON schema definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Unique name for this schema (used in $ref references)
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub schema: Value,
}

/// Index schemas by name. Later definitions win over earlier ones.
pub fn catalog(schemas: &[SchemaConfig]) -> SchemaCatalog {
    schemas
        .iter()
        .map(|s| (s.name.clone(), s.schema.clone()))
        .collect()
}

/// Create a schema reference value
pub fn make_schema_ref(name: &str) -> Value {
    serde_json::json!({ "$ref": name })
}
