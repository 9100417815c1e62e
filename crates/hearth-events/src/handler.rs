//! Handler traits, dispatch metadata, and closure adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::event::{Event, SharedEvent};

/// Dispatch tier for synchronous handlers.
///
/// Tiers run from `Highest` to `Lowest`. Handlers sharing a tier run in
/// registration order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Runs first.
    Highest,
    /// Runs before `Normal`.
    High,
    /// The default tier.
    #[default]
    Normal,
    /// Runs after `Normal`.
    Low,
    /// Runs last, and so has the final say on mutable fields.
    Lowest,
}

impl Priority {
    /// All tiers in dispatch order.
    pub const ALL: [Self; 5] = [
        Self::Highest,
        Self::High,
        Self::Normal,
        Self::Low,
        Self::Lowest,
    ];

    /// Position in dispatch order, `0` for `Highest`.
    #[must_use]
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Lowest => "lowest",
        })
    }
}

/// Registration metadata for a synchronous handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOptions {
    /// Display name. Defaults to the handler's own name.
    pub name: Option<String>,
    /// Dispatch tier.
    pub priority: Priority,
    /// Skip this handler once the event has been canceled.
    pub ignore_canceled: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            name: None,
            priority: Priority::Normal,
            ignore_canceled: true,
        }
    }
}

impl HandlerOptions {
    /// Defaults: own name, `Normal` priority, skipped when canceled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the dispatch tier.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Keep running after the event has been canceled.
    #[must_use]
    pub fn receive_canceled(mut self) -> Self {
        self.ignore_canceled = false;
        self
    }
}

/// Registration metadata for an asynchronous handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncHandlerOptions {
    /// Display name. Defaults to the handler's own name.
    pub name: Option<String>,
    /// Skip launching this handler once the event has been canceled.
    pub ignore_canceled: bool,
}

impl Default for AsyncHandlerOptions {
    fn default() -> Self {
        Self {
            name: None,
            ignore_canceled: true,
        }
    }
}

impl AsyncHandlerOptions {
    /// Defaults: own name, skipped when canceled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Keep launching after the event has been canceled.
    #[must_use]
    pub fn receive_canceled(mut self) -> Self {
        self.ignore_canceled = false;
        self
    }
}

/// Synchronous subscriber logic for one event type.
///
/// Handlers run inline on the publisher's thread, one at a time, in
/// priority order. A returned error or a panic is logged and dispatch moves
/// on to the next handler.
pub trait Handler<E: Event>: Send + Sync + 'static {
    /// Handle the event. Mutations are visible to later handlers and the publisher.
    ///
    /// # Errors
    ///
    /// Any error is logged by the dispatcher and otherwise ignored.
    fn handle(&self, event: &mut E) -> anyhow::Result<()>;

    /// Identifying name, used when no display name is configured.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Declared registration metadata.
    fn options(&self) -> HandlerOptions {
        HandlerOptions::default()
    }
}

/// Asynchronous subscriber logic for one event type.
///
/// Each raise spawns one detached task per handler: the publisher never
/// waits for it, tasks are unordered relative to each other, and faults are
/// only logged.
#[async_trait]
pub trait AsyncHandler<E: Event>: Send + Sync + 'static {
    /// Handle the event.
    ///
    /// # Errors
    ///
    /// Any error is logged by the dispatcher and otherwise ignored.
    async fn handle(&self, event: SharedEvent<E>) -> anyhow::Result<()>;

    /// Identifying name, used when no display name is configured.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Declared registration metadata.
    fn options(&self) -> AsyncHandlerOptions {
        AsyncHandlerOptions::default()
    }
}

/// Identity of a registered handler: the address of its `Arc` allocation.
///
/// Two `Arc`s compare equal exactly when they point at the same handler
/// instance, which is what deregistration keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerKey(usize);

impl HandlerKey {
    /// Key for the handler behind `handler`.
    #[must_use]
    pub fn of<T: ?Sized>(handler: &Arc<T>) -> Self {
        Self(Arc::as_ptr(handler).cast::<()>().addr())
    }
}

/// A synchronous handler backed by a closure.
pub struct FnHandler<E, F> {
    name: String,
    options: HandlerOptions,
    handler: F,
    _event: PhantomData<fn(&mut E)>,
}

impl<E, F> FnHandler<E, F>
where
    E: Event,
    F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
{
    /// Create a named closure handler with default options.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            options: HandlerOptions::default(),
            handler,
            _event: PhantomData,
        }
    }

    /// Set the dispatch tier.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    /// Keep running after the event has been canceled.
    #[must_use]
    pub fn receive_canceled(mut self) -> Self {
        self.options.ignore_canceled = false;
        self
    }
}

impl<E, F> Handler<E> for FnHandler<E, F>
where
    E: Event,
    F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, event: &mut E) -> anyhow::Result<()> {
        (self.handler)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> HandlerOptions {
        self.options.clone()
    }
}

impl<E, F> fmt::Debug for FnHandler<E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// An asynchronous handler backed by a closure returning a future.
pub struct FnAsyncHandler<E, F> {
    name: String,
    options: AsyncHandlerOptions,
    handler: F,
    _event: PhantomData<fn(SharedEvent<E>)>,
}

impl<E, F, Fut> FnAsyncHandler<E, F>
where
    E: Event,
    F: Fn(SharedEvent<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    /// Create a named closure handler with default options.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            options: AsyncHandlerOptions::default(),
            handler,
            _event: PhantomData,
        }
    }

    /// Keep launching after the event has been canceled.
    #[must_use]
    pub fn receive_canceled(mut self) -> Self {
        self.options.ignore_canceled = false;
        self
    }
}

#[async_trait]
impl<E, F, Fut> AsyncHandler<E> for FnAsyncHandler<E, F>
where
    E: Event,
    F: Fn(SharedEvent<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: SharedEvent<E>) -> anyhow::Result<()> {
        (self.handler)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> AsyncHandlerOptions {
        self.options.clone()
    }
}

impl<E, F> fmt::Debug for FnAsyncHandler<E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAsyncHandler")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Cancellation;
    use serde::Serialize;

    #[derive(Debug, Default, Serialize)]
    struct Ping {
        cancellation: Cancellation,
    }

    impl Event for Ping {
        fn cancellation(&self) -> &Cancellation {
            &self.cancellation
        }

        fn cancellation_mut(&mut self) -> &mut Cancellation {
            &mut self.cancellation
        }
    }

    struct Unnamed;

    impl Handler<Ping> for Unnamed {
        fn handle(&self, _event: &mut Ping) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_priority_order() {
        let mut shuffled = vec![
            Priority::Low,
            Priority::Highest,
            Priority::Lowest,
            Priority::Normal,
            Priority::High,
        ];
        shuffled.sort();
        assert_eq!(shuffled, Priority::ALL.to_vec());
        assert_eq!(Priority::Highest.ordinal(), 0);
        assert_eq!(Priority::Lowest.ordinal(), 4);
    }

    #[test]
    fn test_priority_default_and_display() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(Priority::High.to_string(), "high");
    }

    #[test]
    fn test_handler_options_defaults() {
        let options = HandlerOptions::new();
        assert!(options.name.is_none());
        assert_eq!(options.priority, Priority::Normal);
        assert!(options.ignore_canceled);

        let async_options = AsyncHandlerOptions::new();
        assert!(async_options.ignore_canceled);
    }

    #[test]
    fn test_handler_options_builder() {
        let options = HandlerOptions::new()
            .named("audit")
            .with_priority(Priority::Lowest)
            .receive_canceled();
        assert_eq!(options.name.as_deref(), Some("audit"));
        assert_eq!(options.priority, Priority::Lowest);
        assert!(!options.ignore_canceled);
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert!(Handler::<Ping>::name(&Unnamed).ends_with("Unnamed"));
        assert_eq!(Handler::<Ping>::options(&Unnamed), HandlerOptions::default());
    }

    #[test]
    fn test_fn_handler() {
        let handler = FnHandler::new("veto", |ping: &mut Ping| {
            ping.cancel();
            Ok(())
        })
        .with_priority(Priority::High);

        let mut ping = Ping::default();
        handler.handle(&mut ping).unwrap();

        assert!(ping.is_canceled());
        assert_eq!(Handler::name(&handler), "veto");
        assert_eq!(Handler::options(&handler).priority, Priority::High);
    }

    #[test]
    fn test_handler_key_identity() {
        let a = Arc::new(Unnamed);
        let b = Arc::new(Unnamed);
        let a_again = Arc::clone(&a);
        let a_dyn: Arc<dyn Handler<Ping>> = a.clone();

        assert_eq!(HandlerKey::of(&a), HandlerKey::of(&a_again));
        assert_eq!(HandlerKey::of(&a), HandlerKey::of(&a_dyn));
        assert_ne!(HandlerKey::of(&a), HandlerKey::of(&b));
    }

    #[tokio::test]
    async fn test_fn_async_handler() {
        let handler = FnAsyncHandler::new("async-veto", |event: SharedEvent<Ping>| async move {
            event.with(|ping| ping.cancel_with("later"));
            Ok(())
        });

        let event = SharedEvent::new(Ping::default());
        handler.handle(event.clone()).await.unwrap();

        assert_eq!(event.cancellation_reason().as_deref(), Some("later"));
        assert_eq!(AsyncHandler::name(&handler), "async-veto");
    }
}
