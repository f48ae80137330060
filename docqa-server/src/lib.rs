//! docqa server: HTTP boundary, configuration and document loading for the
//! `docqa-rag` pipeline.

pub mod config;
pub mod loader;
pub mod server;
pub mod telemetry;

pub use config::{AnswerFormat, ServerConfig};
pub use loader::load_documents;
pub use server::{AppState, ErrorPayload, app_router, run_server};
pub use telemetry::init_tracing;
