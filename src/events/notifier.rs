//! Publish/subscribe fan-out of status events.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{unbounded, Receiver};
use parking_lot::RwLock;

use super::StatusEvent;

/// Receiver of status events.
///
/// Called synchronously on the thread that completed the mutation, after
/// the cache lock has been released. Implementations that touch UI state
/// must redispatch themselves.
pub trait StatusListener: Send + Sync {
    fn on_event(&self, event: &StatusEvent);
}

impl<F> StatusListener for F
where
    F: Fn(&StatusEvent) + Send + Sync,
{
    fn on_event(&self, event: &StatusEvent) {
        self(event);
    }
}

/// Handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

#[derive(Clone)]
struct Registration {
    id: u64,
    scope: Option<PathBuf>,
    listener: Arc<dyn StatusListener>,
}

impl Registration {
    fn accepts(&self, event: &StatusEvent) -> bool {
        self.scope
            .as_deref()
            .map_or(true, |scope| event.path().starts_with(scope))
    }
}

#[derive(Default)]
struct NotifierInner {
    next_id: AtomicU64,
    registrations: RwLock<Vec<Registration>>,
}

/// Fan-out of [`StatusEvent`]s to registered listeners.
///
/// Cheap to clone; clones share the listener list.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event.
    pub fn subscribe(&self, listener: impl StatusListener + 'static) -> Subscription {
        self.register(None, Arc::new(listener))
    }

    /// Register a listener for events at or under `root`.
    ///
    /// Removed by [`ChangeNotifier::close_repository`] or
    /// [`ChangeNotifier::unsubscribe`].
    pub fn subscribe_repository(
        &self,
        root: impl Into<PathBuf>,
        listener: impl StatusListener + 'static,
    ) -> Subscription {
        self.register(Some(root.into()), Arc::new(listener))
    }

    /// Register a channel that receives a copy of every event.
    ///
    /// The registration removes itself on the first event published after
    /// the receiver is dropped.
    #[must_use]
    pub fn subscribe_channel(&self) -> (Subscription, Receiver<StatusEvent>) {
        let (tx, rx) = unbounded();
        let id = self.next_id();
        let inner: Weak<NotifierInner> = Arc::downgrade(&self.inner);
        let listener = move |event: &StatusEvent| {
            if tx.send(event.clone()).is_err() {
                if let Some(inner) = inner.upgrade() {
                    inner.registrations.write().retain(|r| r.id != id);
                    tracing::trace!(id, "Dropped channel listener with closed receiver");
                }
            }
        };
        (self.push(id, None, Arc::new(listener)), rx)
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn register(&self, scope: Option<PathBuf>, listener: Arc<dyn StatusListener>) -> Subscription {
        self.push(self.next_id(), scope, listener)
    }

    fn push(
        &self,
        id: u64,
        scope: Option<PathBuf>,
        listener: Arc<dyn StatusListener>,
    ) -> Subscription {
        self.inner.registrations.write().push(Registration {
            id,
            scope,
            listener,
        });
        tracing::trace!(id, "Listener subscribed");
        Subscription(id)
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut registrations = self.inner.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.id != subscription.0);
        before != registrations.len()
    }

    /// Drop every listener scoped to `root`. Returns how many were removed.
    pub fn close_repository(&self, root: &Path) -> usize {
        let mut registrations = self.inner.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.scope.as_deref() != Some(root));
        let removed = before - registrations.len();
        if removed > 0 {
            tracing::debug!(root = %root.display(), removed, "Closed repository subscriptions");
        }
        removed
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.registrations.read().len()
    }

    /// Deliver one event to every interested listener.
    pub fn publish(&self, event: &StatusEvent) {
        let registrations = self.snapshot();
        for registration in registrations.iter().filter(|r| r.accepts(event)) {
            registration.listener.on_event(event);
        }
    }

    /// Deliver events in order.
    pub fn publish_all(&self, events: impl IntoIterator<Item = StatusEvent>) {
        let registrations = self.snapshot();
        if registrations.is_empty() {
            return;
        }
        for event in events {
            for registration in registrations.iter().filter(|r| r.accepts(&event)) {
                registration.listener.on_event(&event);
            }
        }
    }

    // listeners may subscribe or unsubscribe from inside a callback
    fn snapshot(&self) -> Vec<Registration> {
        self.inner.registrations.read().clone()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
