//! Resolved per-handler dispatch records.

use std::sync::Arc;

use crate::error::{EventError, EventResult};
use crate::event::Event;
use crate::handler::{
    AsyncHandler, AsyncHandlerOptions, Handler, HandlerKey, HandlerOptions, Priority,
};

/// A stored synchronous subscription.
pub(crate) struct Registration<E: Event> {
    pub(crate) key: HandlerKey,
    pub(crate) name: String,
    pub(crate) priority: Priority,
    pub(crate) ignore_canceled: bool,
    pub(crate) handler: Arc<dyn Handler<E>>,
}

impl<E: Event> Registration<E> {
    pub(crate) fn new<H: Handler<E>>(
        handler: Arc<H>,
        options: HandlerOptions,
    ) -> EventResult<Self> {
        let name = resolve_name(options.name, handler.name())?;
        Ok(Self {
            key: HandlerKey::of(&handler),
            name,
            priority: options.priority,
            ignore_canceled: options.ignore_canceled,
            handler,
        })
    }

    pub(crate) fn skips(&self, canceled: bool) -> bool {
        canceled && self.ignore_canceled
    }

    pub(crate) fn info(&self) -> RegistrationInfo {
        RegistrationInfo {
            name: self.name.clone(),
            priority: Some(self.priority),
            ignore_canceled: self.ignore_canceled,
        }
    }
}

/// A stored asynchronous subscription.
pub(crate) struct AsyncRegistration<E: Event> {
    pub(crate) key: HandlerKey,
    pub(crate) name: String,
    pub(crate) ignore_canceled: bool,
    pub(crate) handler: Arc<dyn AsyncHandler<E>>,
}

impl<E: Event> AsyncRegistration<E> {
    pub(crate) fn new<H: AsyncHandler<E>>(
        handler: Arc<H>,
        options: AsyncHandlerOptions,
    ) -> EventResult<Self> {
        let name = resolve_name(options.name, handler.name())?;
        Ok(Self {
            key: HandlerKey::of(&handler),
            name,
            ignore_canceled: options.ignore_canceled,
            handler,
        })
    }

    pub(crate) fn skips(&self, canceled: bool) -> bool {
        canceled && self.ignore_canceled
    }

    pub(crate) fn info(&self) -> RegistrationInfo {
        RegistrationInfo {
            name: self.name.clone(),
            priority: None,
            ignore_canceled: self.ignore_canceled,
        }
    }
}

/// Read-only view of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    /// Resolved display name.
    pub name: String,
    /// Dispatch tier; `None` for asynchronous handlers.
    pub priority: Option<Priority>,
    /// Whether the handler is skipped once the event is canceled.
    pub ignore_canceled: bool,
}

impl RegistrationInfo {
    /// Whether this is an asynchronous registration.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.priority.is_none()
    }
}

fn resolve_name(configured: Option<String>, own: &str) -> EventResult<String> {
    let name = configured.unwrap_or_else(|| own.to_owned());
    if name.trim().is_empty() {
        return Err(EventError::InvalidArgument {
            argument: "name",
            message: "handler display name must not be empty".to_string(),
        });
    }
    Ok(name)
}
