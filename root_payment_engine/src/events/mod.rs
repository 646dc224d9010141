//! Lifecycle events published by the engine.
//!
//! Interested components register a hook in [`EventHooks`], the engine turns each hook into an [`EventHandler`] task,
//! and the publishing side holds cheap [`EventProducers`] clones.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
