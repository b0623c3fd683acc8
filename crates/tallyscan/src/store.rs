//! Observable in-memory state containers.
//!
//! A [`Store`] owns one value and a list of listeners. Mutation and
//! notification are separate steps so that a coordinator can change several
//! stores before any listener observes any of them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::trace;

/// Handle returned by [`Store::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// An observable state container.
pub struct Store<S> {
    name: &'static str,
    state: RwLock<S>,
    listeners: Mutex<Vec<(ListenerId, Listener<S>)>>,
    next_listener: AtomicU64,
    version: AtomicU64,
}

impl<S> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("version", &self.version())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl<S> Store<S> {
    /// Create a store holding `initial`.
    #[must_use]
    pub fn new(name: &'static str, initial: S) -> Self {
        Self {
            name,
            state: RwLock::new(initial),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            version: AtomicU64::new(0),
        }
    }

    /// The store's name, used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of mutations applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Run `f` against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Mutate the state without notifying listeners.
    ///
    /// Callers must follow up with [`Store::notify`] once every related
    /// store has been mutated.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut guard);
        self.version.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Register a listener that runs after every notification.
    pub fn subscribe(&self, listener: impl Fn(&S) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<S: Clone> Store<S> {
    /// Clone the current state.
    #[must_use]
    pub fn snapshot(&self) -> S {
        self.read(S::clone)
    }

    /// Mutate the state, then notify listeners.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let result = self.mutate(f);
        self.notify();
        result
    }

    /// Deliver the current state to every listener.
    ///
    /// Listeners run with no lock held and may read any store.
    pub fn notify(&self) {
        let listeners: Vec<Listener<S>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }

        let state = self.snapshot();
        trace!(store = self.name, listeners = listeners.len(), "notifying");
        for listener in listeners {
            listener(&state);
        }
    }
}
