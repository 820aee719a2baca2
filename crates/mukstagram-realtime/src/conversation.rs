use std::sync::Arc;

use parking_lot::RwLock;

use crate::listeners::{Listener, ListenerSet};

/// The conversation currently on screen, if any.
///
/// Chat toasts for this conversation are suppressed. Change listeners run
/// after the lock is released, so they may read the gate again.
#[derive(Default)]
pub struct ActiveConversation {
    current: RwLock<Option<String>>,
    changes: ListenerSet<Option<String>>,
}

impl ActiveConversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, conversation_id: Option<String>) {
        let changed = {
            let mut current = self.current.write();
            if *current == conversation_id {
                false
            } else {
                *current = conversation_id.clone();
                true
            }
        };
        if changed {
            self.changes.emit(&conversation_id);
        }
    }

    pub fn get(&self) -> Option<String> {
        self.current.read().clone()
    }

    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.current.read().as_deref() == Some(conversation_id)
    }

    pub fn clear(&self) {
        self.set(None);
    }

    /// Mark `conversation_id` active until the guard is dropped.
    pub fn enter(self: &Arc<Self>, conversation_id: impl Into<String>) -> ConversationGuard {
        let conversation_id = conversation_id.into();
        self.set(Some(conversation_id.clone()));
        ConversationGuard {
            gate: Arc::clone(self),
            conversation_id,
        }
    }

    pub fn on_change(&self, listener: &Listener<Option<String>>) {
        self.changes.subscribe(listener);
    }

    pub fn off_change(&self, listener: &Listener<Option<String>>) -> bool {
        self.changes.unsubscribe(listener)
    }
}

/// Clears the active conversation on drop unless another one was entered
/// in the meantime.
pub struct ConversationGuard {
    gate: Arc<ActiveConversation>,
    conversation_id: String,
}

impl ConversationGuard {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        let still_current = {
            let mut current = self.gate.current.write();
            if current.as_deref() == Some(self.conversation_id.as_str()) {
                *current = None;
                true
            } else {
                false
            }
        };
        if still_current {
            self.gate.changes.emit(&None);
        }
    }
}
