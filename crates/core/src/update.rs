use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A normalized event from any chat platform.
///
/// Adapters fill this in once per inbound callback; everything downstream
/// treats it as read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Update {
    /// Platform-unique message or event ID.
    pub id: String,
    /// ID of the user that triggered the event.
    pub sender_id: String,
    /// Chat the event belongs to (group, DM, ...).
    pub chat_id: String,
    /// Chat kind, e.g. "single" or "chatroom".
    pub chat_type: String,
    /// Primary text content, if any.
    pub text: String,
    /// The platform's raw message, for handlers that need the full shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    /// Extension key/values (platform name, event type, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Update {
    /// Look up a metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
