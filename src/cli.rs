use clap::Parser;
use std::path::PathBuf;

use crate::config::StoreBackend;

/// Schema-driven mock API server
#[derive(Parser, Debug, Clone)]
#[command(name = "proteus", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "PROTEUS_CONFIG", default_value = "proteus.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "PROTEUS_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "PROTEUS_PORT")]
    pub port: Option<u16>,

    /// File the contract registry is persisted to
    #[arg(long, env = "PROTEUS_STORE")]
    pub store: Option<String>,

    /// Storage format of the contract registry
    #[arg(long, env = "PROTEUS_STORE_BACKEND", value_parser = parse_backend)]
    pub store_backend: Option<StoreBackend>,

    /// OpenAPI document (JSON or YAML) to import at startup
    #[arg(long, env = "PROTEUS_OPENAPI")]
    pub openapi: Option<String>,

    /// Seed for reproducible synthesized responses
    #[arg(long, env = "PROTEUS_SEED")]
    pub seed: Option<u64>,
}

fn parse_backend(value: &str) -> Result<StoreBackend, String> {
    match value.to_ascii_lowercase().as_str() {
        "yaml" | "yml" => Ok(StoreBackend::Yaml),
        "json" => Ok(StoreBackend::Json),
        "memory" => Ok(StoreBackend::Memory),
        other => Err(format!("unknown store backend '{}' (expected yaml, json or memory)", other)),
    }
}
