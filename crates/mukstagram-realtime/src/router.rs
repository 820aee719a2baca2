//! Inbound frame dispatch.
//!
//! [`MessageRouter`] owns the listener registry, the online-user set and the
//! active-conversation gate. Whether a frame raises a toast is decided by the
//! pure functions [`toast_for_notification`] and [`toast_for_chat`]; only
//! [`MessageRouter::handle`] talks to the [`Notifier`].

use std::sync::Arc;
use std::time::Duration;

use mukstagram_models::gateway::InboundFrame;
use mukstagram_models::message::ChatMessageFrame;
use mukstagram_models::notification::{NotificationFrame, NotificationKind};
use parking_lot::RwLock;

use crate::conversation::ActiveConversation;
use crate::listeners::{ChatEvent, ListenerRegistry};
use crate::notifier::{Notifier, Toast, ToastAction};
use crate::presence::OnlineUsers;

pub const MESSAGE_PREVIEW_CHARS: usize = 50;
pub const UNKNOWN_SENDER: &str = "알 수 없는 사용자";
pub const CHAT_TOAST_DURATION: Duration = Duration::from_millis(5000);

pub const FOLLOW_TOAST: &str = "새로운 팔로워가 있습니다!";
pub const LIKE_TOAST: &str = "누군가 게시물을 좋아합니다!";
pub const COMMENT_TOAST: &str = "새로운 댓글이 달렸습니다!";

pub struct MessageRouter {
    listeners: ListenerRegistry,
    online_users: OnlineUsers,
    active: Arc<ActiveConversation>,
    local_user_id: RwLock<Option<String>>,
    notifier: Arc<dyn Notifier>,
}

impl MessageRouter {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            listeners: ListenerRegistry::new(),
            online_users: OnlineUsers::new(),
            active: Arc::new(ActiveConversation::new()),
            local_user_id: RwLock::new(None),
            notifier,
        }
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn online_users(&self) -> &OnlineUsers {
        &self.online_users
    }

    pub fn active_conversation(&self) -> &Arc<ActiveConversation> {
        &self.active
    }

    pub fn set_active(&self, conversation_id: Option<String>) {
        self.active.set(conversation_id);
    }

    pub fn local_user_id(&self) -> Option<String> {
        self.local_user_id.read().clone()
    }

    pub fn set_local_user_id(&self, user_id: Option<String>) {
        *self.local_user_id.write() = user_id;
    }

    /// Parse one text frame and dispatch it. Malformed input is dropped.
    pub fn handle_text(&self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(frame) => self.handle(frame),
            Err(e) => {
                tracing::warn!(error = %e, len = text.len(), "dropping malformed realtime frame");
            }
        }
    }

    pub fn handle(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::InitialData(data) => {
                tracing::debug!(online = data.online_users.len(), "received initial presence snapshot");
                if let Some(user_id) = data.user_id {
                    self.set_local_user_id(Some(user_id));
                }
                self.online_users.replace(data.online_users);
            }
            InboundFrame::OnlineStatus(status) => {
                self.listeners.presence.emit(&status);
                self.online_users.apply(&status);
            }
            InboundFrame::Notification(notification) => {
                self.listeners.notifications.emit(&notification);
                if let Some(toast) = toast_for_notification(&notification) {
                    self.notifier.notify(toast);
                }
            }
            InboundFrame::ChatMessage(message) | InboundFrame::NewMessage(message) => {
                let event = ChatEvent::Message(message);
                self.listeners.chat.emit(&event);
                let ChatEvent::Message(message) = event else {
                    return;
                };
                let active = self.active.get();
                let local = self.local_user_id();
                if let Some(toast) = toast_for_chat(&message, active.as_deref(), local.as_deref()) {
                    self.notifier.notify(toast);
                }
            }
            InboundFrame::UserTyping(typing) => {
                self.listeners.chat.emit(&ChatEvent::Typing(typing));
            }
            InboundFrame::Pong => {}
            InboundFrame::Unknown { kind } => {
                tracing::debug!(kind = %kind, "ignoring unknown realtime frame type");
            }
        }
    }

    /// Forget per-session state after logout.
    pub fn reset_session(&self) {
        self.online_users.clear();
        self.active.clear();
    }
}

pub fn toast_for_notification(notification: &NotificationFrame) -> Option<Toast> {
    let message = match notification.notification_type {
        NotificationKind::Follow => FOLLOW_TOAST,
        NotificationKind::Like => LIKE_TOAST,
        NotificationKind::Comment => COMMENT_TOAST,
        NotificationKind::Other => return None,
    };
    Some(Toast::info(message))
}

/// Toast for an incoming chat frame, or `None` when it must stay silent:
/// the message is our own, or its conversation is the one in view.
pub fn toast_for_chat(
    frame: &ChatMessageFrame,
    active_conversation: Option<&str>,
    local_user_id: Option<&str>,
) -> Option<Toast> {
    if !is_unseen_chat(frame, active_conversation, local_user_id) {
        return None;
    }

    let message = &frame.message;
    let sender = message.sender_username().unwrap_or(UNKNOWN_SENDER);
    let mut toast = Toast::info(format!("💬 {}: {}", sender, message_preview(&message.content)))
        .with_duration(CHAT_TOAST_DURATION);
    if let Some(conversation_id) = &frame.conversation_id {
        toast = toast.with_action(ToastAction::OpenConversation {
            conversation_id: conversation_id.clone(),
            username: message.sender_username().map(str::to_string),
        });
    }
    Some(toast)
}

/// A chat frame from someone else for a conversation that is not in view.
pub fn is_unseen_chat(
    frame: &ChatMessageFrame,
    active_conversation: Option<&str>,
    local_user_id: Option<&str>,
) -> bool {
    let message = &frame.message;
    if message.is_own {
        return false;
    }
    if local_user_id.is_some() && message.sender_id() == local_user_id {
        return false;
    }
    !(active_conversation.is_some() && frame.conversation_id.as_deref() == active_conversation)
}

/// First 50 characters of `content`, with `...` appended when cut.
pub fn message_preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(MESSAGE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
