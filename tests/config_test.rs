use proteus::config::{Settings, StoreBackend};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_external_configs() -> anyhow::Result<()> {
    // Create a temporary directory
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();

    // Create config directories
    fs::create_dir_all(root.join("config/schemas"))?;

    // Create proteus.toml
    let proteus_toml = r#"
[server]
host = "127.0.0.1"
port = 4010

[store]
backend = "json"
path = "data/contracts.json"

[synthesis]
seed = 7
"#;
    fs::write(root.join("proteus.toml"), proteus_toml)?;

    // Create a schema in JSON
    let address_json = r#"
{
    "name": "Address",
    "description": "A postal address",
    "schema": {
        "type": "object",
        "required": ["street"],
        "properties": { "street": { "type": "string" } }
    }
}
"#;
    fs::write(root.join("config/schemas/address.json"), address_json)?;

    // Create a schema in YAML referencing the first one
    let customer_yaml = r#"
name: Customer
schema:
  type: object
  properties:
    name:
      type: string
    address:
      $ref: Address
"#;
    fs::write(root.join("config/schemas/customer.yaml"), customer_yaml)?;

    // Files with other extensions are ignored
    fs::write(root.join("config/schemas/README.md"), "# Schemas")?;

    // Load settings
    let settings = Settings::from_root(root.to_str().unwrap())?;

    assert_eq!(settings.server.port, 4010);
    assert_eq!(settings.store.backend, StoreBackend::Json);
    assert_eq!(settings.store.path, "data/contracts.json");
    assert_eq!(settings.synthesis.seed, Some(7));
    assert_eq!(settings.registry_options().seed, Some(7));
    assert_eq!(settings.admin.prefix, "/__admin");

    // Verify schemas
    assert_eq!(settings.schemas.len(), 2);
    assert!(settings.schemas.iter().any(|s| s.name == "Address"));
    assert!(settings.schemas.iter().any(|s| s.name == "Customer"));

    Ok(())
}

#[test]
fn test_defaults_without_config_file() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let settings = Settings::from_root(temp_dir.path().to_str().unwrap())?;

    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 3000);
    assert_eq!(settings.store.backend, StoreBackend::Yaml);
    assert!(settings.registry.record_traffic);
    assert!(settings.llm.is_none());
    assert!(settings.schemas.is_empty());

    Ok(())
}

#[test]
fn test_unresolvable_schema_reference_fails_validation() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    fs::create_dir_all(root.join("config/schemas"))?;

    let order_yaml = r#"
name: Order
schema:
  type: object
  properties:
    customer:
      $ref: Customer
"#;
    fs::write(root.join("config/schemas/order.yaml"), order_yaml)?;

    let err = Settings::from_root(root.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("Configuration validation failed"));

    Ok(())
}

#[test]
fn test_invalid_values_are_reported_together() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();

    let proteus_toml = r#"
[server]
host = ""
port = 3000

[admin]
prefix = "admin"

[synthesis]
optional_property_probability = 2.0
"#;
    fs::write(root.join("proteus.toml"), proteus_toml)?;

    let message = Settings::from_root(root.to_str().unwrap()).unwrap_err().to_string();
    assert!(message.contains("server.host"));
    assert!(message.contains("admin.prefix"));
    assert!(message.contains("optional_property_probability"));

    Ok(())
}
