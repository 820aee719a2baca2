//! Listener registries for the three event categories.
//!
//! Listeners are shared `Arc` callbacks. Identity is the `Arc` pointer, so
//! registering the same handle twice keeps one entry and the handle given
//! to `subscribe` is the one to pass to `unsubscribe`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use mukstagram_models::message::{ChatMessageFrame, TypingFrame};
use mukstagram_models::notification::NotificationFrame;
use mukstagram_models::presence::OnlineStatus;
use parking_lot::RwLock;

pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Wrap a closure as a listener handle.
pub fn listener<T, F>(f: F) -> Listener<T>
where
    F: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Events delivered to chat listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Message(ChatMessageFrame),
    Typing(TypingFrame),
}

pub struct ListenerSet<T> {
    listeners: RwLock<Vec<Listener<T>>>,
}

impl<T> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: &Listener<T>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, listener)) {
            listeners.push(Arc::clone(listener));
        }
    }

    /// Returns `false` when the listener was not registered.
    pub fn unsubscribe(&self, listener: &Listener<T>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Invoke every listener registered at the time of the call.
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self.listeners.read().clone();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!("realtime listener panicked; continuing with remaining listeners");
            }
        }
    }
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct ListenerRegistry {
    pub notifications: ListenerSet<NotificationFrame>,
    pub chat: ListenerSet<ChatEvent>,
    pub presence: ListenerSet<OnlineStatus>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}
