//! Connection hub: who is online, which rooms they joined, and how to reach
//! each of them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use mukstagram_models::gateway::InboundFrame;
use mukstagram_models::message::RoomChatMessage;
use mukstagram_models::notification::{NotificationFrame, NotificationKind};
use mukstagram_models::presence::OnlineStatus;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Decides who receives a user's presence changes.
pub trait FollowerDirectory: Send + Sync {
    fn is_follower(&self, follower_id: &str, user_id: &str) -> bool;
}

/// Every other connected user counts as a follower.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllConnected;

impl FollowerDirectory for AllConnected {
    fn is_follower(&self, follower_id: &str, user_id: &str) -> bool {
        follower_id != user_id
    }
}

/// Fixed follow graph, e.g. loaded from the social backend at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticFollowers {
    followers: HashMap<String, HashSet<String>>,
}

impl StaticFollowers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_follower(mut self, user_id: impl Into<String>, follower_id: impl Into<String>) -> Self {
        self.followers
            .entry(user_id.into())
            .or_default()
            .insert(follower_id.into());
        self
    }
}

impl FollowerDirectory for StaticFollowers {
    fn is_follower(&self, follower_id: &str, user_id: &str) -> bool {
        self.followers
            .get(user_id)
            .is_some_and(|followers| followers.contains(follower_id))
    }
}

struct Connection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

pub struct Hub {
    connections: DashMap<String, Connection>,
    rooms: DashMap<String, HashSet<String>>,
    followers: Arc<dyn FollowerDirectory>,
}

impl Hub {
    pub fn new(followers: Arc<dyn FollowerDirectory>) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            followers,
        }
    }

    /// Register a live connection. A previous connection of the same user is
    /// replaced; its receiver observes the channel closing and its room
    /// memberships are dropped, so the new connection starts with none.
    pub fn register(&self, user_id: &str) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        if self
            .connections
            .insert(user_id.to_string(), Connection { id, tx })
            .is_some()
        {
            let left = self.leave_all_rooms(user_id);
            tracing::info!(user_id, rooms_left = left, "replacing existing gateway connection");
        }
        (id, rx)
    }

    /// Remove the connection if it is still the current one for the user.
    pub fn unregister(&self, user_id: &str, connection_id: Uuid) -> bool {
        self.connections
            .remove_if(user_id, |_, conn| conn.id == connection_id)
            .is_some()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }

    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    pub fn send_to(&self, user_id: &str, text: String) -> bool {
        let Some(tx) = self.connections.get(user_id).map(|c| c.tx.clone()) else {
            return false;
        };
        tx.send(text).is_ok()
    }

    fn send_frame(&self, user_id: &str, frame: &InboundFrame) -> bool {
        match frame.to_text() {
            Some(text) => self.send_to(user_id, text),
            None => false,
        }
    }

    /// Tell the user's followers that they came online or went offline.
    /// Returns how many connections the update was queued for.
    pub fn broadcast_online_status(&self, user_id: &str, is_online: bool) -> usize {
        let frame = InboundFrame::OnlineStatus(OnlineStatus::now(user_id, is_online));
        let Some(text) = frame.to_text() else {
            return 0;
        };
        let targets: Vec<mpsc::UnboundedSender<String>> = self
            .connections
            .iter()
            .filter(|e| self.followers.is_follower(e.key(), user_id))
            .map(|e| e.tx.clone())
            .collect();
        targets
            .into_iter()
            .filter(|tx| tx.send(text.clone()).is_ok())
            .count()
    }

    pub fn send_notification(&self, user_id: &str, kind: NotificationKind, data: Value) -> bool {
        let delivered =
            self.send_frame(user_id, &InboundFrame::Notification(NotificationFrame::now(kind, data)));
        tracing::debug!(user_id, kind = kind.as_str(), delivered, "notification push");
        delivered
    }

    pub fn join_room(&self, room_id: &str, user_id: &str) {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Leave a room; the room is dropped once empty.
    pub fn leave_room(&self, room_id: &str, user_id: &str) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(user_id);
        }
        self.rooms.remove_if(room_id, |_, members| members.is_empty());
    }

    /// Remove the user from every room. Returns how many rooms they were in.
    pub fn leave_all_rooms(&self, user_id: &str) -> usize {
        let mut left = 0;
        self.rooms.retain(|_, members| {
            if members.remove(user_id) {
                left += 1;
            }
            !members.is_empty()
        });
        left
    }

    pub fn room_members(&self, room_id: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .rooms
            .get(room_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Relay a chat line to every member of the room, the sender included.
    pub fn send_room_chat(&self, room_id: &str, sender_id: &str, message: &str) -> usize {
        let payload = RoomChatMessage {
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut value = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode room chat message");
                return 0;
            }
        };
        value["type"] = Value::from(mukstagram_models::gateway::FRAME_CHAT_MESSAGE);
        let text = value.to_string();
        self.room_members(room_id)
            .iter()
            .filter(|member| self.send_to(member, text.clone()))
            .count()
    }

    /// Typing indicator for every member except the typist.
    pub fn send_typing(&self, room_id: &str, user_id: &str) -> usize {
        let frame = InboundFrame::UserTyping(mukstagram_models::message::TypingFrame {
            user_id: user_id.to_string(),
            room_id: room_id.to_string(),
        });
        self.room_members(room_id)
            .iter()
            .filter(|member| member.as_str() != user_id)
            .filter(|member| self.send_frame(member, &frame))
            .count()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(Arc::new(AllConnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    #[test]
    fn newer_connection_replaces_older() {
        let hub = Hub::default();
        let (first, mut first_rx) = hub.register("alice");
        let (second, _second_rx) = hub.register("alice");
        assert!(first_rx.try_recv().is_err());
        assert!(!hub.unregister("alice", first));
        assert!(hub.is_online("alice"));
        assert!(hub.unregister("alice", second));
        assert!(!hub.is_online("alice"));
    }

    #[test]
    fn presence_goes_to_followers_only() {
        let followers = StaticFollowers::new().with_follower("alice", "bob");
        let hub = Hub::new(Arc::new(followers));
        let (_, mut alice_rx) = hub.register("alice");
        let (_, mut bob_rx) = hub.register("bob");
        let (_, mut carol_rx) = hub.register("carol");

        assert_eq!(hub.broadcast_online_status("alice", true), 1);
        let frames = drain(&mut bob_rx);
        assert_eq!(frames[0]["type"], "online_status");
        assert_eq!(frames[0]["user_id"], "alice");
        assert_eq!(frames[0]["is_online"], true);
        assert!(drain(&mut carol_rx).is_empty());
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[test]
    fn room_chat_reaches_every_member_including_sender() {
        let hub = Hub::default();
        let (_, mut alice_rx) = hub.register("alice");
        let (_, mut bob_rx) = hub.register("bob");
        hub.join_room("r1", "alice");
        hub.join_room("r1", "bob");

        assert_eq!(hub.send_room_chat("r1", "alice", "hello"), 2);
        let to_bob = drain(&mut bob_rx);
        assert_eq!(to_bob[0]["type"], "chat_message");
        assert_eq!(to_bob[0]["room_id"], "r1");
        assert_eq!(to_bob[0]["sender_id"], "alice");
        assert_eq!(to_bob[0]["message"], "hello");
        assert_eq!(drain(&mut alice_rx).len(), 1);
    }

    #[test]
    fn typing_skips_the_typist() {
        let hub = Hub::default();
        let (_, mut alice_rx) = hub.register("alice");
        let (_, mut bob_rx) = hub.register("bob");
        hub.join_room("r1", "alice");
        hub.join_room("r1", "bob");

        assert_eq!(hub.send_typing("r1", "alice"), 1);
        assert!(drain(&mut alice_rx).is_empty());
        let frames = drain(&mut bob_rx);
        assert_eq!(frames[0]["type"], "user_typing");
        assert_eq!(frames[0]["user_id"], "alice");
    }

    #[test]
    fn empty_rooms_are_removed() {
        let hub = Hub::default();
        hub.join_room("r1", "alice");
        hub.join_room("r1", "bob");
        hub.leave_room("r1", "alice");
        assert_eq!(hub.room_members("r1"), vec!["bob"]);
        hub.leave_room("r1", "bob");
        assert_eq!(hub.room_count(), 0);
        hub.leave_room("missing", "bob");
    }

    #[test]
    fn replaced_connection_loses_its_rooms() {
        let hub = Hub::default();
        let (_, _first_rx) = hub.register("alice");
        let (_, _bob_rx) = hub.register("bob");
        hub.join_room("r1", "alice");
        hub.join_room("r2", "alice");
        hub.join_room("r2", "bob");

        let (_, _second_rx) = hub.register("alice");
        assert_eq!(hub.room_count(), 1);
        assert_eq!(hub.room_members("r2"), vec!["bob"]);
        assert_eq!(hub.send_room_chat("r1", "bob", "anyone?"), 0);
    }

    #[test]
    fn leave_all_rooms_drops_emptied_rooms() {
        let hub = Hub::default();
        hub.join_room("r1", "alice");
        hub.join_room("r2", "alice");
        hub.join_room("r2", "bob");
        assert_eq!(hub.leave_all_rooms("alice"), 2);
        assert_eq!(hub.room_count(), 1);
        assert_eq!(hub.leave_all_rooms("alice"), 0);
    }

    #[test]
    fn notification_for_offline_user_is_not_delivered() {
        let hub = Hub::default();
        assert!(!hub.send_notification("ghost", NotificationKind::Like, Value::Null));
        let (_, mut rx) = hub.register("alice");
        assert!(hub.send_notification(
            "alice",
            NotificationKind::Follow,
            serde_json::json!({"follower_id": "bob"})
        ));
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["type"], "notification");
        assert_eq!(frames[0]["notification_type"], "follow");
        assert_eq!(frames[0]["data"]["follower_id"], "bob");
    }
}
