//! Plaintext mail items (the content inside an envelope) and send-failure
//! bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const WHISPERMAIL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub whispermail_version: u32,
    /// Only root messages carry a subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub sent: DateTime<Utc>,
    pub from: Contact,
    pub recipients: Vec<Contact>,
    pub message: String,
    /// Computed at read time; never persisted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Message>,
}

impl Message {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Recipients still owed a copy of `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFailure {
    pub message_id: String,
    pub recipients: Vec<Contact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_are_not_serialised_when_empty() {
        let m = Message {
            id: "m1".into(),
            parent_id: None,
            whispermail_version: WHISPERMAIL_VERSION,
            subject: Some("hello".into()),
            sent: Utc::now(),
            from: Contact { name: "Alice".into(), email: "alice@example.com".into() },
            recipients: vec![],
            message: "body".into(),
            replies: vec![],
        };
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("replies").is_none());
        assert!(json.get("parentId").is_none());
        assert_eq!(json["whispermailVersion"], 1);
        assert!(m.is_root());
    }
}
