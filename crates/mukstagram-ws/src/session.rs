use std::collections::HashSet;

use uuid::Uuid;

pub struct Session {
    pub user_id: String,
    pub connection_id: Uuid,
    pub rooms: HashSet<String>,
}

impl Session {
    pub fn new(user_id: String, connection_id: Uuid) -> Self {
        Self {
            user_id,
            connection_id,
            rooms: HashSet::new(),
        }
    }

    /// Returns `false` if the room was already joined.
    pub fn join(&mut self, room_id: &str) -> bool {
        self.rooms.insert(room_id.to_string())
    }

    pub fn leave(&mut self, room_id: &str) -> bool {
        self.rooms.remove(room_id)
    }
}
