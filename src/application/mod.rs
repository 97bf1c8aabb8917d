//! The mock engine: reference resolution, synthesis, validation, routing and
//! the registry tying them together.

pub mod matcher;
pub mod openapi;
pub mod registry;
pub mod resolver;
pub mod synthesizer;
pub mod validator;

pub use matcher::{normalize_path, PathMatcher, PathTemplate, RouteKey, RouteMatch};
pub use registry::{ContractRegistry, DeleteOutcome, ImportReport, RegistryOptions};
pub use resolver::{SchemaCatalog, SchemaResolver};
pub use synthesizer::{SynthesisOptions, ValueSynthesizer, OPTIONAL_PROPERTY_PROBABILITY};
pub use validator::RequestValidator;
