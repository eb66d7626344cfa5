//! pinbot-hooks: Status and log sink.
//!
//! The engine publishes agent status changes and free-text agent logs as
//! events on named channels; subscribers (the CLI log mirror, a dashboard
//! bridge) register handlers per channel and are invoked fire-and-forget.

pub mod events;
pub mod registry;

pub use events::StatusEvent;
pub use registry::{StatusHandler, StatusRegistry};
