use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Follow,
    Like,
    Comment,
    /// Any sub-type this client does not know about yet.
    #[serde(other)]
    Other,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Follow => "follow",
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationFrame {
    pub notification_type: NotificationKind,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl NotificationFrame {
    pub fn now(notification_type: NotificationKind, data: Value) -> Self {
        Self {
            notification_type,
            data,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sub_type_maps_to_other() {
        let frame: NotificationFrame =
            serde_json::from_str(r#"{"notification_type":"mention","data":{}}"#).unwrap();
        assert_eq!(frame.notification_type, NotificationKind::Other);
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let frame: NotificationFrame =
            serde_json::from_str(r#"{"notification_type":"like"}"#).unwrap();
        assert_eq!(frame.notification_type, NotificationKind::Like);
        assert!(frame.data.is_null());
    }
}
