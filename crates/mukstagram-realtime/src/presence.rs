use std::collections::HashSet;

use mukstagram_models::presence::OnlineStatus;
use parking_lot::RwLock;

/// Users currently reported online by the gateway.
#[derive(Debug, Default)]
pub struct OnlineUsers {
    users: RwLock<HashSet<String>>,
}

impl OnlineUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set from an `initial_data` snapshot.
    pub fn replace<I>(&self, users: I)
    where
        I: IntoIterator<Item = String>,
    {
        *self.users.write() = users.into_iter().collect();
    }

    pub fn apply(&self, status: &OnlineStatus) {
        let mut users = self.users.write();
        if status.is_online {
            users.insert(status.user_id.clone());
        } else {
            users.remove(&status.user_id);
        }
    }

    pub fn clear(&self) {
        self.users.write().clear();
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.read().contains(user_id)
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    /// Sorted copy of the current set.
    pub fn snapshot(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.read().iter().cloned().collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_updates_add_and_remove() {
        let online = OnlineUsers::new();
        online.replace(vec!["b".to_string(), "a".to_string()]);
        online.apply(&OnlineStatus::now("c", true));
        online.apply(&OnlineStatus::now("a", false));
        assert_eq!(online.snapshot(), vec!["b", "c"]);
        assert!(online.contains("c"));
        assert!(!online.contains("a"));
    }

    #[test]
    fn offline_for_unknown_user_is_harmless() {
        let online = OnlineUsers::new();
        online.apply(&OnlineStatus::now("ghost", false));
        assert!(online.is_empty());
    }

    #[test]
    fn replace_discards_previous_members() {
        let online = OnlineUsers::new();
        online.replace(vec!["a".to_string()]);
        online.replace(vec!["z".to_string()]);
        assert_eq!(online.snapshot(), vec!["z"]);
        online.clear();
        assert_eq!(online.len(), 0);
    }
}
