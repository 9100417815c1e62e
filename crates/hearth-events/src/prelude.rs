//! Prelude module - commonly used types for convenient import.
//!
//! Use `use hearth_events::prelude::*;` to import all essential types.

// Errors
pub use crate::{EventError, EventResult};

// Events
pub use crate::{Cancellation, Event, SharedEvent};

// Handlers
pub use crate::{
    AsyncHandler, AsyncHandlerOptions, FnAsyncHandler, FnHandler, Handler, HandlerOptions,
    Priority,
};

// Registry
pub use crate::{BusConfig, DispatchSummary, EventManager, Severity};

pub use crate::async_trait;
