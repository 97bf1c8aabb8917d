pub mod api_handler;
pub mod file_store;
pub mod health_handler;
pub mod llm_generator;
pub mod metrics_handler;
