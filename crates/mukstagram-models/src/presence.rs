use serde::{Deserialize, Serialize};

/// Snapshot sent by the gateway right after a connection is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialData {
    #[serde(default)]
    pub online_users: Vec<String>,
    /// Id of the user the connection was authenticated as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineStatus {
    pub user_id: String,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl OnlineStatus {
    pub fn now(user_id: impl Into<String>, is_online: bool) -> Self {
        Self {
            user_id: user_id.into(),
            is_online,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}
