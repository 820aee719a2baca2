use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

/// A direct message as pushed by the messaging API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<MessageSender>,
    /// Set by the server from the receiver's point of view.
    #[serde(default)]
    pub is_own: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ChatMessage {
    pub fn sender_id(&self) -> Option<&str> {
        self.sender.as_ref().and_then(|s| s.id.as_deref())
    }

    pub fn sender_username(&self) -> Option<&str> {
        self.sender.as_ref().and_then(|s| s.username.as_deref())
    }
}

/// Inbound `chat_message` / `new_message` frame.
///
/// Two shapes exist on the wire: the messaging API pushes
/// `{"conversation_id", "message": {..}}` while the gateway's own room chat
/// relays `{"room_id", "sender_id", "message": "text"}`. Both deserialize
/// into this type; for room chat the room id doubles as the conversation id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawChatFrame")]
pub struct ChatMessageFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Deserialize)]
struct RawChatFrame {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMessage {
    Text(String),
    Full(ChatMessage),
}

impl From<RawChatFrame> for ChatMessageFrame {
    fn from(raw: RawChatFrame) -> Self {
        let mut message = match raw.message {
            Some(RawMessage::Full(message)) => message,
            Some(RawMessage::Text(content)) => ChatMessage {
                content,
                ..ChatMessage::default()
            },
            None => ChatMessage::default(),
        };
        if let Some(sender_id) = raw.sender_id {
            let sender = message.sender.get_or_insert_with(MessageSender::default);
            if sender.id.is_none() {
                sender.id = Some(sender_id);
            }
        }
        Self {
            conversation_id: raw.conversation_id.or(raw.room_id),
            message,
            timestamp: raw.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingFrame {
    pub user_id: String,
    pub room_id: String,
}

/// Flat room-chat payload relayed by the gateway to every room member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomChatMessage {
    pub room_id: String,
    pub sender_id: String,
    pub message: String,
    pub timestamp: String,
}
