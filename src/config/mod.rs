use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod schema;
pub mod validator;

pub use schema::SchemaConfig;

use crate::application::{RegistryOptions, SynthesisOptions, OPTIONAL_PROPERTY_PROBABILITY};
use crate::cli::Cli;

#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub admin: AdminSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub synthesis: SynthesisSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    /// Optional language model used to produce schema responses
    #[serde(default)]
    pub llm: Option<LLMConfig>,
    /// OpenAPI document imported at startup
    #[serde(default)]
    pub openapi: Option<String>,
    /// Named schemas, loaded from `config/schemas/`
    #[serde(default)]
    pub schemas: Vec<SchemaConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminSettings {
    /// Path prefix of the administrative routes
    #[serde(default = "default_admin_prefix")]
    pub prefix: String,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            prefix: default_admin_prefix(),
        }
    }
}

fn default_admin_prefix() -> String {
    "/__admin".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Yaml,
    Json,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Yaml
}

fn default_store_path() -> String {
    "contracts.yaml".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub integer_range: (i64, i64),
    pub number_range: (f64, f64),
    pub array_items: (usize, usize),
    pub optional_property_probability: f64,
    /// Fixed seed for reproducible responses
    pub seed: Option<u64>,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        let options = SynthesisOptions::default();
        Self {
            integer_range: options.integer_range,
            number_range: options.number_range,
            array_items: options.array_items,
            optional_property_probability: OPTIONAL_PROPERTY_PROBABILITY,
            seed: None,
        }
    }
}

impl SynthesisSettings {
    pub fn options(&self) -> SynthesisOptions {
        SynthesisOptions {
            integer_range: self.integer_range,
            number_range: self.number_range,
            array_items: self.array_items,
            optional_property_probability: self.optional_property_probability,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistrySettings {
    #[serde(default = "default_record_traffic")]
    pub record_traffic: bool,
    #[serde(default = "default_max_recorded")]
    pub max_recorded_instances: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            record_traffic: default_record_traffic(),
            max_recorded_instances: default_max_recorded(),
        }
    }
}

fn default_record_traffic() -> bool {
    true
}

fn default_max_recorded() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Anthropic,
}

impl Settings {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::from_root(".")
    }

    /// Create settings from CLI arguments (config file, then CLI overrides)
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let config_path = &cli.config;
        let root = config_path
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
            .unwrap_or(".");

        let mut settings = Self::build(File::from(config_path.clone()).required(false))?;

        // CLI > env vars > config file
        settings.apply_cli_overrides(cli);
        settings.load_external_configs(root)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_root(root: &str) -> Result<Self, anyhow::Error> {
        let config_path = Path::new(root).join("proteus");
        let mut settings = Self::build(File::from(config_path).required(false))?;
        settings.load_external_configs(root)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Registry options assembled from the `synthesis` and `registry` sections
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            record_traffic: self.registry.record_traffic,
            max_recorded_instances: self.registry.max_recorded_instances,
            seed: self.synthesis.seed,
        }
    }

    fn build<S>(source: S) -> Result<Self, anyhow::Error>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let s = Config::builder()
            .add_source(source)
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .build()?;
        Ok(s.try_deserialize()?)
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(path) = &cli.store {
            self.store.path = path.clone();
        }
        if let Some(backend) = cli.store_backend {
            self.store.backend = backend;
        }
        if let Some(openapi) = &cli.openapi {
            self.openapi = Some(openapi.clone());
        }
        if let Some(seed) = cli.seed {
            self.synthesis.seed = Some(seed);
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        validator::ConfigValidator::validate(self).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!(
                "Configuration validation failed:\n{}",
                error_messages.join("\n")
            )
        })
    }

    fn load_external_configs(&mut self, root: &str) -> Result<(), anyhow::Error> {
        self.load_schemas_from_dir(&format!("{}/config/schemas", root))
    }

    fn load_schemas_from_dir(&mut self, path: &str) -> Result<(), anyhow::Error> {
        let pattern = format!("{}/*", path);
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(path) => {
                    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                        continue;
                    };
                    if !matches!(ext, "json" | "yaml" | "yml" | "toml") {
                        continue;
                    }
                    let content = std::fs::read_to_string(&path)?;
                    let schema: SchemaConfig = match ext {
                        "json" => serde_json::from_str(&content)?,
                        "toml" => toml::from_str(&content)?,
                        _ => serde_yaml::from_str(&content)?,
                    };
                    tracing::debug!(name = %schema.name, file = %path.display(), "Loaded named schema");
                    self.schemas.push(schema);
                }
                Err(e) => tracing::warn!("Failed to read glob entry: {}", e),
            }
        }
        Ok(())
    }
}
