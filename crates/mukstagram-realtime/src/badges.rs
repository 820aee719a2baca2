use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use mukstagram_models::notification::NotificationFrame;

use crate::listeners::{listener, ChatEvent, Listener};
use crate::router::{is_unseen_chat, MessageRouter};

#[derive(Debug, Default)]
struct Flags {
    notification: AtomicBool,
    message: AtomicBool,
}

/// "New notification" / "new message" indicators for an app header.
///
/// Subscribes to the router on creation and unsubscribes when dropped.
pub struct ActivityBadges {
    flags: Arc<Flags>,
    router: Arc<MessageRouter>,
    on_notification: Listener<NotificationFrame>,
    on_chat: Listener<ChatEvent>,
    on_focus: Listener<Option<String>>,
}

impl ActivityBadges {
    pub fn attach(router: &Arc<MessageRouter>) -> Self {
        let flags = Arc::new(Flags::default());

        let f = Arc::clone(&flags);
        let on_notification = listener(move |_: &NotificationFrame| {
            f.notification.store(true, Ordering::Relaxed);
        });

        let f = Arc::clone(&flags);
        let weak: Weak<MessageRouter> = Arc::downgrade(router);
        let on_chat = listener(move |event: &ChatEvent| {
            let ChatEvent::Message(frame) = event else {
                return;
            };
            let Some(router) = weak.upgrade() else {
                return;
            };
            let active = router.active_conversation().get();
            let local = router.local_user_id();
            if is_unseen_chat(frame, active.as_deref(), local.as_deref()) {
                f.message.store(true, Ordering::Relaxed);
            }
        });

        let f = Arc::clone(&flags);
        let on_focus = listener(move |active: &Option<String>| {
            if active.is_some() {
                f.message.store(false, Ordering::Relaxed);
            }
        });

        router.listeners().notifications.subscribe(&on_notification);
        router.listeners().chat.subscribe(&on_chat);
        router.active_conversation().on_change(&on_focus);

        Self {
            flags,
            router: Arc::clone(router),
            on_notification,
            on_chat,
            on_focus,
        }
    }

    pub fn has_new_notification(&self) -> bool {
        self.flags.notification.load(Ordering::Relaxed)
    }

    pub fn has_new_message(&self) -> bool {
        self.flags.message.load(Ordering::Relaxed)
    }

    pub fn clear_notification(&self) {
        self.flags.notification.store(false, Ordering::Relaxed);
    }

    pub fn clear_message(&self) {
        self.flags.message.store(false, Ordering::Relaxed);
    }
}

impl Drop for ActivityBadges {
    fn drop(&mut self) {
        self.router.listeners().notifications.unsubscribe(&self.on_notification);
        self.router.listeners().chat.unsubscribe(&self.on_chat);
        self.router.active_conversation().off_change(&self.on_focus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::TracingNotifier;

    fn router() -> Arc<MessageRouter> {
        Arc::new(MessageRouter::new(Arc::new(TracingNotifier)))
    }

    const ALICE_IN_C1: &str = r#"{"type":"new_message","conversation_id":"c1","message":{"content":"hi","sender":{"id":"u2","username":"alice"},"is_own":false}}"#;

    #[test]
    fn notification_sets_badge() {
        let router = router();
        let badges = ActivityBadges::attach(&router);
        router.handle_text(r#"{"type":"notification","notification_type":"follow"}"#);
        assert!(badges.has_new_notification());
        badges.clear_notification();
        assert!(!badges.has_new_notification());
    }

    #[test]
    fn message_badge_respects_active_conversation() {
        let router = router();
        let badges = ActivityBadges::attach(&router);
        router.set_active(Some("c1".into()));
        router.handle_text(ALICE_IN_C1);
        assert!(!badges.has_new_message());

        router.set_active(None);
        router.handle_text(ALICE_IN_C1);
        assert!(badges.has_new_message());
    }

    #[test]
    fn entering_a_conversation_clears_message_badge() {
        let router = router();
        let badges = ActivityBadges::attach(&router);
        router.handle_text(ALICE_IN_C1);
        assert!(badges.has_new_message());
        let _guard = router.active_conversation().enter("c9");
        assert!(!badges.has_new_message());
    }

    #[test]
    fn dropping_badges_unsubscribes() {
        let router = router();
        let badges = ActivityBadges::attach(&router);
        assert_eq!(router.listeners().chat.len(), 1);
        drop(badges);
        assert!(router.listeners().chat.is_empty());
        assert!(router.listeners().notifications.is_empty());
    }
}
