//! pinbot-engine: Agent cycle execution.
//!
//! Provides:
//! - Ports to the content platform, oracle, action backends and token provider
//! - The closed command set and the chaining command pipeline
//! - The paginated content-selection loop
//! - The per-cycle action executor and the relationship recorder
//! - The administrative agent service and the worker pool that drains fired jobs

pub mod backend;
pub mod command;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod recorder;
pub mod selection;
pub mod service;
pub mod slots;
pub mod token;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    ActionBackend, Backends, BackendError, BearerToken, ContentSource, CreatePayload,
    GenerationPurpose, GenerationRequest, Oracle, TokenProvider,
};
pub use command::{CommandKind, compile_pipeline};
pub use error::{EngineError, Result};
pub use executor::{ActionExecutor, CycleReport};
pub use service::AgentService;
pub use token::TokenCache;
