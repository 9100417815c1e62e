//! Event values and their cancellation state.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::severity::Severity;

/// One-way veto flag carried by every event.
///
/// There is no way to clear the flag, and a reason can only be recorded
/// as part of canceling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cancellation {
    canceled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl Cancellation {
    /// A live (not canceled) state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the event has been canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Reason given by the last handler that canceled with one.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Cancel without a reason. An earlier reason is kept.
    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    /// Cancel and record why. Replaces an earlier reason.
    pub fn cancel_with(&mut self, reason: impl Into<String>) {
        self.canceled = true;
        self.reason = Some(reason.into());
    }

    /// Copy this cancellation (and its reason) onto `target`.
    ///
    /// Does nothing if `self` is live. Returns whether `target` was canceled.
    pub fn forward_to(&self, target: &mut Self) -> bool {
        if !self.canceled {
            return false;
        }
        match &self.reason {
            Some(reason) => target.cancel_with(reason.clone()),
            None => target.cancel(),
        }
        true
    }
}

/// A domain occurrence that can be raised on the bus.
///
/// Implementors embed a [`Cancellation`] and expose it; everything else is
/// provided. `NAME` and `SEVERITY` are the event type's declarative
/// metadata, read once when the type's collection is created.
///
/// ```rust
/// use hearth_events::{Cancellation, Event, Severity};
/// use serde::Serialize;
///
/// #[derive(Debug, Serialize)]
/// struct TileEdit {
///     x: i32,
///     y: i32,
///     cancellation: Cancellation,
/// }
///
/// impl Event for TileEdit {
///     const NAME: Option<&'static str> = Some("tile-edit");
///     const SEVERITY: Option<Severity> = Some(Severity::Trace);
///
///     fn cancellation(&self) -> &Cancellation {
///         &self.cancellation
///     }
///
///     fn cancellation_mut(&mut self) -> &mut Cancellation {
///         &mut self.cancellation
///     }
/// }
///
/// let mut edit = TileEdit { x: 1, y: 2, cancellation: Cancellation::new() };
/// edit.cancel_with("protected region");
/// assert!(edit.is_canceled());
/// assert_eq!(edit.cancellation_reason(), Some("protected region"));
/// ```
pub trait Event: Serialize + Send + 'static {
    /// Display name. Defaults to the type's own name.
    const NAME: Option<&'static str> = None;

    /// Severity for raise/cancel records. Defaults to the bus default.
    const SEVERITY: Option<Severity> = None;

    /// The event's cancellation state.
    fn cancellation(&self) -> &Cancellation;

    /// Mutable access to the event's cancellation state.
    fn cancellation_mut(&mut self) -> &mut Cancellation;

    /// Whether a handler has canceled this event.
    fn is_canceled(&self) -> bool {
        self.cancellation().is_canceled()
    }

    /// Reason recorded with the cancellation, if any.
    fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation().reason()
    }

    /// Cancel without a reason.
    fn cancel(&mut self) {
        self.cancellation_mut().cancel();
    }

    /// Cancel with a reason.
    fn cancel_with(&mut self, reason: impl Into<String>)
    where
        Self: Sized,
    {
        self.cancellation_mut().cancel_with(reason);
    }

    /// Propagate this event's cancellation onto a broader event being handled.
    ///
    /// Returns whether `target` was canceled.
    fn forward_cancellation<T>(&self, target: &mut T) -> bool
    where
        Self: Sized,
        T: Event,
    {
        self.cancellation().forward_to(target.cancellation_mut())
    }
}

/// Display name of an event type, from `NAME` or the type's short name.
pub(crate) fn display_name<E: Event>() -> &'static str {
    E::NAME.unwrap_or_else(|| short_type_name(std::any::type_name::<E>()))
}

/// Strip the module path from a type name, keeping generic arguments.
fn short_type_name(full: &'static str) -> &'static str {
    let generics = full.find('<').unwrap_or(full.len());
    let start = full[..generics]
        .rfind("::")
        .map_or(0, |index| index.saturating_add(2));
    &full[start..]
}

/// The object a publisher raises.
///
/// Synchronous handlers get `&mut E` while the dispatcher holds the lock, so
/// they observe a linear history. Asynchronous handlers receive a clone of
/// this handle and run after [`raise`](crate::EventManager::raise) may
/// already have returned. Their reads and writes can race with each other
/// and with the publisher. Keep their lock scopes short and never hold the
/// guard across an `.await`.
pub struct SharedEvent<E> {
    inner: Arc<Mutex<E>>,
}

impl<E: Event> SharedEvent<E> {
    /// Wrap a freshly constructed event.
    #[must_use]
    pub fn new(event: E) -> Self {
        Self {
            inner: Arc::new(Mutex::new(event)),
        }
    }

    /// Lock the event.
    ///
    /// A lock poisoned by a panicking handler is recovered; the panic has
    /// already been logged by the dispatcher.
    pub fn lock(&self) -> MutexGuard<'_, E> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the event locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut self.lock())
    }

    /// Whether the event has been canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.lock().is_canceled()
    }

    /// Reason recorded with the cancellation, if any.
    #[must_use]
    pub fn cancellation_reason(&self) -> Option<String> {
        self.lock().cancellation_reason().map(str::to_owned)
    }

    /// A copy of the current cancellation state.
    #[must_use]
    pub fn cancellation(&self) -> Cancellation {
        self.lock().cancellation().clone()
    }

    /// Take the event back once no asynchronous handler holds a clone.
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged while other clones are alive.
    pub fn into_inner(self) -> Result<E, Self> {
        Arc::try_unwrap(self.inner)
            .map(|mutex| mutex.into_inner().unwrap_or_else(PoisonError::into_inner))
            .map_err(|inner| Self { inner })
    }
}

impl<E> Clone for SharedEvent<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Event> From<E> for SharedEvent<E> {
    fn from(event: E) -> Self {
        Self::new(event)
    }
}

impl<E: fmt::Debug> fmt::Debug for SharedEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Ok(event) => f.debug_tuple("SharedEvent").field(&*event).finish(),
            Err(_) => f.debug_tuple("SharedEvent").field(&"<locked>").finish(),
        }
    }
}

/// Lazily serialized view of an event for log records.
pub(crate) struct Snapshot<'a, E>(pub(crate) &'a E);

impl<E: Serialize> fmt::Display for Snapshot<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self.0) {
            Ok(json) => f.write_str(&json),
            Err(e) => write!(f, "<unserializable: {e}>"),
        }
    }
}
