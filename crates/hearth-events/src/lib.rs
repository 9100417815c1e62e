//! Hearth Events - Typed publish/subscribe event bus.
//!
//! This crate provides:
//! - [`Event`], the trait every raisable value implements, with one-way
//!   [`Cancellation`]
//! - Synchronous [`Handler`]s dispatched in [`Priority`] order on the
//!   publisher's thread
//! - [`AsyncHandler`]s launched as detached Tokio tasks
//! - Per-handler fault isolation: errors and panics are logged, never
//!   propagated to the publisher
//! - [`EventManager`], which indexes one [`Collection`] per event type
//!
//! # Example
//!
//! ```rust
//! use hearth_events::prelude::*;
//! use hearth_telemetry::Logger;
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Serialize)]
//! struct BlockBreak {
//!     x: i32,
//!     y: i32,
//!     cancellation: Cancellation,
//! }
//!
//! impl Event for BlockBreak {
//!     fn cancellation(&self) -> &Cancellation {
//!         &self.cancellation
//!     }
//!
//!     fn cancellation_mut(&mut self) -> &mut Cancellation {
//!         &mut self.cancellation
//!     }
//! }
//!
//! let bus = EventManager::new();
//! let logger = Logger::new("spawn-protection");
//!
//! let guard = FnHandler::new("spawn-guard", |event: &mut BlockBreak| {
//!     if event.x.abs() < 10 && event.y.abs() < 10 {
//!         event.cancel_with("spawn is protected");
//!     }
//!     Ok(())
//! })
//! .with_priority(Priority::High);
//! bus.register_handler(Arc::new(guard), &logger)?;
//!
//! let event = SharedEvent::new(BlockBreak { x: 3, y: 4, cancellation: Cancellation::new() });
//! let summary = bus.raise(&event, &logger)?;
//!
//! assert_eq!(summary.invoked, 1);
//! assert!(event.is_canceled());
//! # Ok::<(), EventError>(())
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod collection;
mod config;
mod error;
mod event;
mod handler;
mod manager;
mod registration;
mod severity;

pub use collection::{Collection, DispatchSummary};
pub use config::BusConfig;
pub use error::{ConfigError, ConfigResult, EventError, EventResult};
pub use event::{Cancellation, Event, SharedEvent};
pub use handler::{
    AsyncHandler, AsyncHandlerOptions, FnAsyncHandler, FnHandler, Handler, HandlerKey,
    HandlerOptions, Priority,
};
pub use manager::EventManager;
pub use registration::RegistrationInfo;
pub use severity::Severity;

/// Re-exported so that [`AsyncHandler`] can be implemented without a direct dependency.
pub use async_trait::async_trait;
