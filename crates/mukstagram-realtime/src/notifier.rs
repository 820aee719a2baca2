//! User-facing toasts.
//!
//! The router decides *whether* and *what* to show; a [`Notifier`] decides
//! how. [`TracingNotifier`] writes to the log, [`ToastQueue`] keeps a list
//! of visible toasts for a UI to render.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Error,
}

/// What to do when the user clicks a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToastAction {
    OpenConversation {
        conversation_id: String,
        username: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub message: String,
    pub kind: ToastKind,
    pub duration: Duration,
    pub action: Option<ToastAction>,
}

impl Toast {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ToastKind::Info,
            duration: DEFAULT_TOAST_DURATION,
            action: None,
        }
    }

    pub fn with_kind(mut self, kind: ToastKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_action(mut self, action: ToastAction) -> Self {
        self.action = Some(action);
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, toast: Toast) {
        (**self).notify(toast)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        match toast.kind {
            ToastKind::Error => tracing::warn!(message = %toast.message, "toast"),
            _ => tracing::info!(
                message = %toast.message,
                duration_ms = toast.duration.as_millis() as u64,
                "toast"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedToast {
    pub id: Uuid,
    pub toast: Toast,
    pub expires_at: Instant,
}

/// Toasts waiting to be rendered. Expired entries are dropped lazily.
#[derive(Debug, Default)]
pub struct ToastQueue {
    toasts: Mutex<Vec<QueuedToast>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, toast: Toast) -> Uuid {
        let id = Uuid::new_v4();
        let now = Instant::now();
        let expires_at = now + toast.duration;
        let mut toasts = self.toasts.lock();
        toasts.retain(|t| t.expires_at > now);
        toasts.push(QueuedToast {
            id,
            toast,
            expires_at,
        });
        id
    }

    pub fn visible(&self) -> Vec<QueuedToast> {
        self.visible_at(Instant::now())
    }

    pub fn visible_at(&self, now: Instant) -> Vec<QueuedToast> {
        let mut toasts = self.toasts.lock();
        toasts.retain(|t| t.expires_at > now);
        toasts.clone()
    }

    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut toasts = self.toasts.lock();
        let before = toasts.len();
        toasts.retain(|t| t.id != id);
        toasts.len() != before
    }

    /// Dismiss the toast and hand back its click action.
    pub fn click(&self, id: Uuid) -> Option<ToastAction> {
        let mut toasts = self.toasts.lock();
        let index = toasts.iter().position(|t| t.id == id)?;
        toasts.remove(index).toast.action
    }

    pub fn len(&self) -> usize {
        self.toasts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.lock().is_empty()
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, toast: Toast) {
        self.push(toast);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toasts_expire_after_their_duration() {
        let queue = ToastQueue::new();
        queue.push(Toast::info("short").with_duration(Duration::from_millis(100)));
        queue.push(Toast::info("long"));
        let later = Instant::now() + Duration::from_millis(500);
        let visible = queue.visible_at(later);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].toast.message, "long");
    }

    #[test]
    fn push_drops_expired_toasts() {
        let queue = ToastQueue::new();
        for _ in 0..10 {
            queue.push(Toast::info("gone").with_duration(Duration::ZERO));
        }
        std::thread::sleep(Duration::from_millis(1));
        queue.push(Toast::info("kept"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn click_returns_action_and_dismisses() {
        let queue = ToastQueue::new();
        let action = ToastAction::OpenConversation {
            conversation_id: "c1".into(),
            username: Some("alice".into()),
        };
        let id = queue.push(Toast::info("hi").with_action(action.clone()));
        assert_eq!(queue.click(id), Some(action));
        assert!(queue.is_empty());
        assert_eq!(queue.click(id), None);
    }

    #[test]
    fn dismiss_unknown_id_is_false() {
        let queue = ToastQueue::new();
        queue.push(Toast::info("x"));
        assert!(!queue.dismiss(Uuid::new_v4()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn default_toast_is_info_for_three_seconds() {
        let toast = Toast::info("x");
        assert_eq!(toast.kind, ToastKind::Info);
        assert_eq!(toast.duration, DEFAULT_TOAST_DURATION);
        assert_eq!(toast.with_kind(ToastKind::Error).kind, ToastKind::Error);
    }
}
