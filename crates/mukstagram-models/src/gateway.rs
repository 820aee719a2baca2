use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{ChatMessageFrame, TypingFrame};
use crate::notification::NotificationFrame;
use crate::presence::{InitialData, OnlineStatus};

// Client -> Gateway frame types
pub const FRAME_PING: &str = "ping";
pub const FRAME_JOIN_ROOM: &str = "join_room";
pub const FRAME_LEAVE_ROOM: &str = "leave_room";
pub const FRAME_TYPING: &str = "typing";

// Gateway -> Client frame types
pub const FRAME_INITIAL_DATA: &str = "initial_data";
pub const FRAME_ONLINE_STATUS: &str = "online_status";
pub const FRAME_NOTIFICATION: &str = "notification";
pub const FRAME_NEW_MESSAGE: &str = "new_message";
pub const FRAME_USER_TYPING: &str = "user_typing";
pub const FRAME_PONG: &str = "pong";

// Used in both directions
pub const FRAME_CHAT_MESSAGE: &str = "chat_message";

/// Close code sent to a connection replaced by a newer one for the same user.
/// Clients must not reconnect on it.
pub const CLOSE_SUPERSEDED: u16 = 4000;

/// Frames a client sends to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Ping,
    JoinRoom { room_id: String },
    LeaveRoom { room_id: String },
    ChatMessage { room_id: String, message: String },
    Typing { room_id: String },
}

impl OutboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Ping => FRAME_PING,
            OutboundFrame::JoinRoom { .. } => FRAME_JOIN_ROOM,
            OutboundFrame::LeaveRoom { .. } => FRAME_LEAVE_ROOM,
            OutboundFrame::ChatMessage { .. } => FRAME_CHAT_MESSAGE,
            OutboundFrame::Typing { .. } => FRAME_TYPING,
        }
    }

    pub fn to_text(&self) -> String {
        // A tagged enum of plain strings always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"type":"{}"}}"#, self.kind()))
    }
}

/// Frames the gateway pushes to a client, keyed by the `type` field.
///
/// Decoding goes through [`InboundFrame::parse`] so that unrecognised types
/// land in [`InboundFrame::Unknown`] instead of failing the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    InitialData(InitialData),
    OnlineStatus(OnlineStatus),
    Notification(NotificationFrame),
    ChatMessage(ChatMessageFrame),
    NewMessage(ChatMessageFrame),
    UserTyping(TypingFrame),
    Pong,
    #[serde(skip)]
    Unknown { kind: String },
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let frame = match kind.as_str() {
            FRAME_INITIAL_DATA => InboundFrame::InitialData(serde_json::from_value(value)?),
            FRAME_ONLINE_STATUS => InboundFrame::OnlineStatus(serde_json::from_value(value)?),
            FRAME_NOTIFICATION => InboundFrame::Notification(serde_json::from_value(value)?),
            FRAME_CHAT_MESSAGE => InboundFrame::ChatMessage(serde_json::from_value(value)?),
            FRAME_NEW_MESSAGE => InboundFrame::NewMessage(serde_json::from_value(value)?),
            FRAME_USER_TYPING => InboundFrame::UserTyping(serde_json::from_value(value)?),
            FRAME_PONG => InboundFrame::Pong,
            _ => InboundFrame::Unknown { kind },
        };
        Ok(frame)
    }

    pub fn kind(&self) -> &str {
        match self {
            InboundFrame::InitialData(_) => FRAME_INITIAL_DATA,
            InboundFrame::OnlineStatus(_) => FRAME_ONLINE_STATUS,
            InboundFrame::Notification(_) => FRAME_NOTIFICATION,
            InboundFrame::ChatMessage(_) => FRAME_CHAT_MESSAGE,
            InboundFrame::NewMessage(_) => FRAME_NEW_MESSAGE,
            InboundFrame::UserTyping(_) => FRAME_USER_TYPING,
            InboundFrame::Pong => FRAME_PONG,
            InboundFrame::Unknown { kind } => kind,
        }
    }

    /// Serialize for the wire. Returns `None` for [`InboundFrame::Unknown`].
    pub fn to_text(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}
