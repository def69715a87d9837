//! CarbonAtlas Library
//!
//! Core modules for the CarbonAtlas question-answering service: a
//! warehouse-backed tool surface, an LLM orchestrator that drives it, and
//! the assembly of grounded answers with quality attribution.

use std::sync::Arc;

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use services::{
    BaselineProvider, Catalog, EntityResolver, IntentClassifier, Orchestrator, QueryEngine,
    ResponseAssembler, ToolSurface, WarehouseGateway,
};
pub use utils::{ApiError, ApiResult};

/// Application shared state
///
/// Rust's type system is the DI container: every service is constructed
/// once in `main`, wrapped in `Arc` for cheap cloning, and handed to the
/// router. The immutable registries (catalog, alias book, baseline
/// knowledge) live behind the same `Arc`s, never behind ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    pub catalog: Arc<Catalog>,
    pub resolver: Arc<EntityResolver>,
    pub gateway: Arc<WarehouseGateway>,
    pub engine: Arc<QueryEngine>,
    pub tool_surface: Arc<ToolSurface>,

    pub baseline: Arc<BaselineProvider>,
    pub orchestrator: Arc<Orchestrator>,
    pub assembler: Arc<ResponseAssembler>,
}

#[cfg(test)]
mod tests;
