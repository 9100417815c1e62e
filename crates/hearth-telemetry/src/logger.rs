//! Component loggers handed to the event bus.

use std::sync::Arc;
use tracing::Span;
use uuid::Uuid;

/// A component-scoped logging handle.
///
/// Every bus operation takes a `Logger` so that the records it emits are
/// attributed to the plugin or subsystem that made the call. The logger owns
/// a `component` span; work done on the caller's behalf runs inside it, and
/// detached work is instrumented with it.
///
/// Cloning is cheap and yields a handle to the same span.
#[derive(Debug, Clone)]
pub struct Logger {
    id: Uuid,
    parent_id: Option<Uuid>,
    component: Arc<str>,
    span: Span,
}

impl Logger {
    /// Create a logger for a top-level component.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        let component: Arc<str> = Arc::from(component.into());
        let id = Uuid::new_v4();
        let span = tracing::info_span!(
            "component",
            name = %component,
            logger_id = %id,
        );
        Self {
            id,
            parent_id: None,
            component,
            span,
        }
    }

    /// Create a logger for a sub-component, nested under this one.
    #[must_use]
    pub fn child(&self, component: impl Into<String>) -> Self {
        let component: Arc<str> = Arc::from(component.into());
        let id = Uuid::new_v4();
        let span = tracing::info_span!(
            parent: &self.span,
            "component",
            name = %component,
            logger_id = %id,
        );
        Self {
            id,
            parent_id: Some(self.id),
            component,
            span,
        }
    }

    /// A logger whose span is disabled. Records still reach the subscriber,
    /// just without component context.
    #[must_use]
    pub fn detached(component: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            component: Arc::from(component.into()),
            span: Span::none(),
        }
    }

    /// Unique identifier of this logger.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Identifier of the logger this one was derived from.
    #[must_use]
    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    /// Component name.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// The component span.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run `f` inside the component span.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        self.span.in_scope(f)
    }

    /// First eight characters of the logger id.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("unknown")
    }
}
