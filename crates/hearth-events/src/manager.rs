//! The process-wide registry of event collections.

use dashmap::DashMap;
use hearth_telemetry::Logger;
use std::any::TypeId;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::collection::{Collection, DispatchSummary, ErasedCollection};
use crate::config::BusConfig;
use crate::error::EventResult;
use crate::event::{Event, SharedEvent};
use crate::handler::{AsyncHandler, AsyncHandlerOptions, Handler, HandlerOptions};

static GLOBAL: OnceLock<EventManager> = OnceLock::new();

/// Indexes one [`Collection`] per event type.
///
/// A collection is created the first time its event type is registered
/// against or raised, and lives until [`EventManager::clear`]. Every
/// operation is safe to call from any thread.
///
/// Most programs use the shared [`EventManager::global`] instance; tests and
/// embedded hosts can create independent managers.
///
/// ```rust
/// use hearth_events::{Cancellation, Event, EventManager, FnHandler, SharedEvent};
/// use hearth_telemetry::Logger;
/// use serde::Serialize;
/// use std::sync::Arc;
///
/// #[derive(Debug, Serialize)]
/// struct Chat {
///     text: String,
///     cancellation: Cancellation,
/// }
///
/// impl Event for Chat {
///     fn cancellation(&self) -> &Cancellation {
///         &self.cancellation
///     }
///
///     fn cancellation_mut(&mut self) -> &mut Cancellation {
///         &mut self.cancellation
///     }
/// }
///
/// let bus = EventManager::new();
/// let logger = Logger::new("chat-filter");
///
/// bus.register_handler(
///     Arc::new(FnHandler::new("no-shouting", |chat: &mut Chat| {
///         if chat.text.chars().all(|c| !c.is_lowercase()) {
///             chat.cancel_with("shouting");
///         }
///         Ok(())
///     })),
///     &logger,
/// )?;
///
/// let chat = SharedEvent::new(Chat { text: "HELLO".into(), cancellation: Cancellation::new() });
/// bus.raise(&chat, &logger)?;
/// assert_eq!(chat.cancellation_reason().as_deref(), Some("shouting"));
/// # Ok::<(), hearth_events::EventError>(())
/// ```
pub struct EventManager {
    config: BusConfig,
    collections: DashMap<TypeId, Arc<dyn ErasedCollection>>,
}

impl EventManager {
    /// Create an empty manager with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BusConfig::default(),
            collections: DashMap::new(),
        }
    }

    /// Create an empty manager with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Config`](crate::EventError::Config) if the
    /// configuration fails validation.
    pub fn with_config(config: BusConfig) -> EventResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            collections: DashMap::new(),
        })
    }

    /// The process-wide manager, created with default configuration on first use.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Configuration applied to newly created collections.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// The collection for `E`, created if absent.
    pub fn collection<E: Event>(&self) -> Arc<Collection<E>> {
        let key = TypeId::of::<E>();
        if let Some(existing) = self.collections.get(&key).map(|entry| Arc::clone(&*entry))
            && let Ok(collection) = existing.into_any().downcast::<Collection<E>>()
        {
            return collection;
        }

        let mut slot = self.collections.entry(key).or_insert_with(|| {
            let created: Arc<dyn ErasedCollection> = Arc::new(Collection::<E>::new(&self.config));
            debug!(event = %created.event_name(), "Event collection created");
            created
        });

        match Arc::clone(&*slot).into_any().downcast::<Collection<E>>() {
            Ok(collection) => collection,
            Err(_) => {
                // TypeId keys make this unreachable; replace rather than panic.
                warn!("Event collection had an unexpected type and was replaced");
                let collection = Arc::new(Collection::<E>::new(&self.config));
                *slot = Arc::clone(&collection) as Arc<dyn ErasedCollection>;
                collection
            },
        }
    }

    /// The collection for `E`, if one has been created.
    fn existing<E: Event>(&self) -> Option<Arc<Collection<E>>> {
        let existing = self
            .collections
            .get(&TypeId::of::<E>())
            .map(|entry| Arc::clone(&*entry))?;
        existing.into_any().downcast::<Collection<E>>().ok()
    }

    /// Subscribe a synchronous handler to `E` with its declared options.
    ///
    /// # Errors
    ///
    /// See [`Collection::register_with`].
    pub fn register_handler<E, H>(&self, handler: Arc<H>, logger: &Logger) -> EventResult<()>
    where
        E: Event,
        H: Handler<E>,
    {
        self.collection::<E>().register(handler, logger)
    }

    /// Subscribe a synchronous handler to `E` with explicit options.
    ///
    /// # Errors
    ///
    /// See [`Collection::register_with`].
    pub fn register_handler_with<E, H>(
        &self,
        handler: Arc<H>,
        options: HandlerOptions,
        logger: &Logger,
    ) -> EventResult<()>
    where
        E: Event,
        H: Handler<E>,
    {
        self.collection::<E>()
            .register_with(handler, options, logger)
    }

    /// Subscribe an asynchronous handler to `E` with its declared options.
    ///
    /// # Errors
    ///
    /// See [`Collection::register_async_with`].
    pub fn register_async_handler<E, H>(&self, handler: Arc<H>, logger: &Logger) -> EventResult<()>
    where
        E: Event,
        H: AsyncHandler<E>,
    {
        self.collection::<E>().register_async(handler, logger)
    }

    /// Subscribe an asynchronous handler to `E` with explicit options.
    ///
    /// # Errors
    ///
    /// See [`Collection::register_async_with`].
    pub fn register_async_handler_with<E, H>(
        &self,
        handler: Arc<H>,
        options: AsyncHandlerOptions,
        logger: &Logger,
    ) -> EventResult<()>
    where
        E: Event,
        H: AsyncHandler<E>,
    {
        self.collection::<E>()
            .register_async_with(handler, options, logger)
    }

    /// Remove a synchronous handler from `E`. Returns whether it was registered.
    pub fn deregister_handler<E, H>(&self, handler: &Arc<H>, logger: &Logger) -> bool
    where
        E: Event,
        H: Handler<E> + ?Sized,
    {
        self.existing::<E>()
            .is_some_and(|collection| collection.deregister(handler, logger))
    }

    /// Remove an asynchronous handler from `E`. Returns whether it was registered.
    pub fn deregister_async_handler<E, H>(&self, handler: &Arc<H>, logger: &Logger) -> bool
    where
        E: Event,
        H: AsyncHandler<E> + ?Sized,
    {
        self.existing::<E>()
            .is_some_and(|collection| collection.deregister_async(handler, logger))
    }

    /// Dispatch `event` to the subscribers of `E`.
    ///
    /// # Errors
    ///
    /// See [`Collection::raise`].
    pub fn raise<E: Event>(
        &self,
        event: &SharedEvent<E>,
        logger: &Logger,
    ) -> EventResult<DispatchSummary> {
        self.collection::<E>().raise(event, logger)
    }

    /// Drop every registration and every collection.
    pub fn clear(&self) {
        let drained: Vec<_> = self
            .collections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.collections.clear();
        for collection in &drained {
            collection.clear_handlers();
        }
        debug!(collections = drained.len(), "Event manager cleared");
    }

    /// Drop every registration for `E`. The collection itself is kept.
    pub fn clear_event<E: Event>(&self) {
        if let Some(collection) = self.existing::<E>() {
            collection.clear();
        }
    }

    /// Number of event types with a collection.
    #[must_use]
    pub fn event_type_count(&self) -> usize {
        self.collections.len()
    }

    /// Display names of every event type with a collection, sorted.
    #[must_use]
    pub fn event_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .collections
            .iter()
            .map(|entry| entry.value().event_name())
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("config", &self.config)
            .field("event_types", &self.collections.len())
            .finish()
    }
}
