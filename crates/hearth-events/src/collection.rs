//! Per-event-type subscriber sets and the dispatch algorithm.

use futures::FutureExt;
use hearth_telemetry::Logger;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::instrument::WithSubscriber;
use tracing::{Instrument, debug, error, trace};

use crate::config::BusConfig;
use crate::error::{EventError, EventResult};
use crate::event::{Event, SharedEvent, Snapshot, display_name};
use crate::handler::{
    AsyncHandler, AsyncHandlerOptions, Handler, HandlerKey, HandlerOptions, Priority,
};
use crate::registration::{AsyncRegistration, Registration, RegistrationInfo};
use crate::severity::{Severity, log_at};

/// What one [`Collection::raise`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Synchronous handlers invoked, faulted ones included.
    pub invoked: usize,
    /// Handlers of either kind skipped because the event was canceled.
    pub skipped: usize,
    /// Synchronous handlers that returned an error or panicked.
    pub faulted: usize,
    /// Asynchronous handlers launched as detached tasks.
    pub spawned: usize,
}

impl DispatchSummary {
    /// Whether no handler was invoked or launched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invoked == 0 && self.spawned == 0
    }
}

/// Sort key for synchronous registrations. The sequence number keeps
/// equal-priority registrations distinct and in registration order.
type SyncSlot = (Priority, u64);

struct Handlers<E: Event> {
    ordered: BTreeMap<SyncSlot, Arc<Registration<E>>>,
    slots: HashMap<HandlerKey, SyncSlot>,
    asynchronous: HashMap<HandlerKey, Arc<AsyncRegistration<E>>>,
    next_sequence: u64,
}

impl<E: Event> Default for Handlers<E> {
    fn default() -> Self {
        Self {
            ordered: BTreeMap::new(),
            slots: HashMap::new(),
            asynchronous: HashMap::new(),
            next_sequence: 0,
        }
    }
}

/// All subscriptions for the event type `E`, and the dispatch routine.
///
/// Obtained from [`EventManager::collection`](crate::EventManager::collection).
/// Registration state is behind a read-write lock, so handlers may be
/// registered and deregistered from any thread, including from inside a
/// handler. A raise works on a snapshot taken when it starts: changes made
/// during a dispatch apply to the next one.
pub struct Collection<E: Event> {
    name: &'static str,
    severity: Severity,
    log_snapshots: bool,
    async_permits: Option<Arc<Semaphore>>,
    handlers: RwLock<Handlers<E>>,
}

impl<E: Event> Collection<E> {
    pub(crate) fn new(config: &BusConfig) -> Self {
        let name = display_name::<E>();
        Self {
            name,
            severity: config.severity_for(name, E::SEVERITY),
            log_snapshots: config.log_snapshots,
            async_permits: config
                .max_concurrent_async
                .map(|limit| Arc::new(Semaphore::new(limit))),
            handlers: RwLock::new(Handlers::default()),
        }
    }

    /// Display name of the event type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Severity of raise and cancellation records.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Number of synchronous registrations.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.read().ordered.len()
    }

    /// Number of asynchronous registrations.
    #[must_use]
    pub fn async_handler_count(&self) -> usize {
        self.read().asynchronous.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let handlers = self.read();
        handlers.ordered.is_empty() && handlers.asynchronous.is_empty()
    }

    /// Synchronous registrations in dispatch order, then asynchronous ones.
    #[must_use]
    pub fn registrations(&self) -> Vec<RegistrationInfo> {
        let handlers = self.read();
        handlers
            .ordered
            .values()
            .map(|registration| registration.info())
            .chain(
                handlers
                    .asynchronous
                    .values()
                    .map(|registration| registration.info()),
            )
            .collect()
    }

    /// Register a synchronous handler with its declared options.
    ///
    /// # Errors
    ///
    /// See [`Collection::register_with`].
    pub fn register<H: Handler<E>>(&self, handler: Arc<H>, logger: &Logger) -> EventResult<()> {
        let options = handler.options();
        self.register_with(handler, options, logger)
    }

    /// Register a synchronous handler with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidArgument`] if the resolved display name is
    /// empty, and [`EventError::AlreadyRegistered`] if this handler instance is
    /// already registered as a synchronous handler for `E`.
    pub fn register_with<H: Handler<E>>(
        &self,
        handler: Arc<H>,
        options: HandlerOptions,
        logger: &Logger,
    ) -> EventResult<()> {
        let registration = Registration::new(handler, options)?;
        let name = registration.name.clone();
        let priority = registration.priority;

        {
            let mut handlers = self.write();
            if handlers.slots.contains_key(&registration.key) {
                return Err(EventError::AlreadyRegistered {
                    handler: name,
                    event: self.name,
                });
            }
            let slot = (priority, handlers.next_sequence);
            handlers.next_sequence = handlers.next_sequence.wrapping_add(1);
            handlers.slots.insert(registration.key, slot);
            handlers.ordered.insert(slot, Arc::new(registration));
        }

        logger.in_scope(|| {
            debug!(
                handler = %name,
                event = %self.name,
                priority = %priority,
                "Handler registered"
            );
        });
        Ok(())
    }

    /// Register an asynchronous handler with its declared options.
    ///
    /// # Errors
    ///
    /// See [`Collection::register_async_with`].
    pub fn register_async<H: AsyncHandler<E>>(
        &self,
        handler: Arc<H>,
        logger: &Logger,
    ) -> EventResult<()> {
        let options = handler.options();
        self.register_async_with(handler, options, logger)
    }

    /// Register an asynchronous handler with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidArgument`] if the resolved display name is
    /// empty, and [`EventError::AlreadyRegistered`] if this handler instance is
    /// already registered as an asynchronous handler for `E`.
    pub fn register_async_with<H: AsyncHandler<E>>(
        &self,
        handler: Arc<H>,
        options: AsyncHandlerOptions,
        logger: &Logger,
    ) -> EventResult<()> {
        let registration = AsyncRegistration::new(handler, options)?;
        let name = registration.name.clone();

        {
            let mut handlers = self.write();
            if handlers.asynchronous.contains_key(&registration.key) {
                return Err(EventError::AlreadyRegistered {
                    handler: name,
                    event: self.name,
                });
            }
            handlers
                .asynchronous
                .insert(registration.key, Arc::new(registration));
        }

        logger.in_scope(|| {
            debug!(handler = %name, event = %self.name, "Async handler registered");
        });
        Ok(())
    }

    /// Remove a synchronous handler by instance.
    ///
    /// Returns whether it was registered. Unknown handlers are a no-op.
    pub fn deregister<H: Handler<E> + ?Sized>(&self, handler: &Arc<H>, logger: &Logger) -> bool {
        let key = HandlerKey::of(handler);
        let removed = {
            let mut handlers = self.write();
            handlers
                .slots
                .remove(&key)
                .and_then(|slot| handlers.ordered.remove(&slot))
        };

        // Dropped outside the lock: a handler's destructor may call back into the bus.
        let Some(registration) = removed else {
            return false;
        };
        logger.in_scope(|| {
            debug!(handler = %registration.name, event = %self.name, "Handler deregistered");
        });
        true
    }

    /// Remove an asynchronous handler by instance.
    ///
    /// Returns whether it was registered. Unknown handlers are a no-op.
    pub fn deregister_async<H: AsyncHandler<E> + ?Sized>(
        &self,
        handler: &Arc<H>,
        logger: &Logger,
    ) -> bool {
        let key = HandlerKey::of(handler);
        let removed = self.write().asynchronous.remove(&key);

        let Some(registration) = removed else {
            return false;
        };
        logger.in_scope(|| {
            debug!(
                handler = %registration.name,
                event = %self.name,
                "Async handler deregistered"
            );
        });
        true
    }

    /// Drop every registration for `E`.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.write());
        if !drained.ordered.is_empty() || !drained.asynchronous.is_empty() {
            debug!(
                event = %self.name,
                handlers = drained.ordered.len(),
                async_handlers = drained.asynchronous.len(),
                "Event handlers cleared"
            );
        }
    }

    /// Dispatch `event` to every current subscriber.
    ///
    /// 1. Synchronous handlers run inline, in priority order. A handler whose
    ///    registration ignores canceled events is skipped if the event is
    ///    canceled by the time its turn comes. Errors and panics are logged
    ///    and dispatch continues.
    /// 2. Asynchronous handlers not skipped by the same rule are launched
    ///    as detached tasks on the current Tokio runtime. This call does not
    ///    wait for them. Their faults are logged when they finish.
    /// 3. If the event ended the synchronous phase canceled, the cancellation
    ///    is logged with its reason.
    ///
    /// The publisher reads the outcome off `event` afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::NoRuntime`] before running any handler if
    /// asynchronous handlers are registered and no Tokio runtime is available.
    /// Handler faults are never returned.
    pub fn raise(&self, event: &SharedEvent<E>, logger: &Logger) -> EventResult<DispatchSummary> {
        let (synchronous, asynchronous) = self.snapshot();
        let runtime = if asynchronous.is_empty() {
            None
        } else {
            Some(Handle::try_current().map_err(|_| EventError::NoRuntime { event: self.name })?)
        };

        let _entered = logger.span().enter();
        let mut summary = DispatchSummary::default();

        {
            let guard = event.lock();
            if self.log_snapshots {
                log_at!(
                    self.severity,
                    event = %self.name,
                    snapshot = %Snapshot(&*guard),
                    "Raising event"
                );
            } else {
                log_at!(self.severity, event = %self.name, "Raising event");
            }
        }

        for registration in &synchronous {
            let mut guard = event.lock();
            if registration.skips(guard.is_canceled()) {
                trace!(
                    handler = %registration.name,
                    event = %self.name,
                    "Skipped canceled event"
                );
                summary.skipped = summary.skipped.saturating_add(1);
                continue;
            }

            let outcome =
                catch_unwind(AssertUnwindSafe(|| registration.handler.handle(&mut guard)));
            drop(guard);
            summary.invoked = summary.invoked.saturating_add(1);

            match HandlerFault::from_outcome(outcome) {
                None => trace!(
                    handler = %registration.name,
                    event = %self.name,
                    "Handler completed"
                ),
                Some(fault) => {
                    summary.faulted = summary.faulted.saturating_add(1);
                    log_fault(self.name, &registration.name, &fault);
                },
            }
        }

        // Outcome of the synchronous phase. Spawned tasks may cancel afterwards.
        let settled = event.cancellation();

        if let Some(runtime) = runtime {
            for registration in asynchronous {
                if registration.skips(settled.is_canceled()) {
                    trace!(
                        handler = %registration.name,
                        event = %self.name,
                        "Skipped canceled event"
                    );
                    summary.skipped = summary.skipped.saturating_add(1);
                    continue;
                }
                self.spawn(&runtime, registration, event.clone(), logger);
                summary.spawned = summary.spawned.saturating_add(1);
            }
        }

        if settled.is_canceled() {
            log_at!(
                self.severity,
                event = %self.name,
                reason = settled.reason().unwrap_or("none given"),
                "Event canceled"
            );
        }

        Ok(summary)
    }

    /// Launch one asynchronous handler as a detached task.
    fn spawn(
        &self,
        runtime: &Handle,
        registration: Arc<AsyncRegistration<E>>,
        event: SharedEvent<E>,
        logger: &Logger,
    ) {
        let event_name = self.name;
        let permits = self.async_permits.clone();

        let task = async move {
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            let outcome = AssertUnwindSafe(registration.handler.handle(event))
                .catch_unwind()
                .await;

            match HandlerFault::from_outcome(outcome) {
                None => trace!(
                    handler = %registration.name,
                    event = %event_name,
                    "Async handler completed"
                ),
                Some(fault) => log_fault(event_name, &registration.name, &fault),
            }
        };

        // Detached: the JoinHandle is dropped and nobody awaits the task.
        runtime.spawn(task.instrument(logger.span().clone()).with_current_subscriber());
    }

    fn snapshot(&self) -> (Vec<Arc<Registration<E>>>, Vec<Arc<AsyncRegistration<E>>>) {
        let handlers = self.read();
        (
            handlers.ordered.values().cloned().collect(),
            handlers.asynchronous.values().cloned().collect(),
        )
    }

    fn read(&self) -> RwLockReadGuard<'_, Handlers<E>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Handlers<E>> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Event> fmt::Debug for Collection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.read();
        f.debug_struct("Collection")
            .field("event", &self.name)
            .field("severity", &self.severity)
            .field("handlers", &handlers.ordered.len())
            .field("async_handlers", &handlers.asynchronous.len())
            .finish_non_exhaustive()
    }
}

/// Why a handler did not complete normally.
enum HandlerFault {
    Failed(anyhow::Error),
    Panicked(String),
}

impl HandlerFault {
    fn from_outcome(outcome: Result<anyhow::Result<()>, Box<dyn Any + Send>>) -> Option<Self> {
        match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(Self::Failed(e)),
            Err(payload) => Some(Self::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{e:#}"),
            Self::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

fn log_fault(event: &str, handler: &str, fault: &HandlerFault) {
    error!(
        handler = %handler,
        event = %event,
        error = %fault,
        "Event handler failed"
    );
}

/// Type-erased view the manager stores.
pub(crate) trait ErasedCollection: Send + Sync {
    fn event_name(&self) -> &'static str;
    fn clear_handlers(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Event> ErasedCollection for Collection<E> {
    fn event_name(&self) -> &'static str {
        self.name
    }

    fn clear_handlers(&self) {
        self.clear();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
