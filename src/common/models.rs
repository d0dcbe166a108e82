use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Anything kept in a live collection is addressed by its server-assigned id.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// A chat group as stored in the `groups` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatGroup {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub invite_code: Option<String>,
}

/// A chat message as stored in the `messages` table.
///
/// `user_id` is the free-text display name of the sender, not an authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub user_id: String,
    #[serde(deserialize_with = "id_from_any")]
    pub group_id: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "opt_id_from_any")]
    pub reply_to: Option<String>,
}

impl Keyed for ChatGroup {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for ChatMessage {
    fn key(&self) -> &str {
        &self.id
    }
}

impl ChatMessage {
    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    /// Short single-line preview used when quoting a reply target
    pub fn preview(&self, max_chars: usize) -> String {
        let line = self.content.lines().next().unwrap_or("").trim();
        if line.is_empty() && self.has_image() {
            return "[image]".to_string();
        }
        if line.chars().count() <= max_chars {
            line.to_string()
        } else {
            let cut: String = line.chars().take(max_chars).collect();
            format!("{}…", cut)
        }
    }
}

/// Row written to `messages` on send. `reply_to` is always serialized (null when absent).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessageRow {
    pub content: String,
    pub group_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reply_to: Option<String>,
}

/// Row written to `groups` on creation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewGroupRow {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
}

// PostgREST hands back ids as strings (uuid) or numbers (bigint) depending on the schema.
fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

fn opt_id_from_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("invalid reference id: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn group_row_without_optional_columns_decodes() {
        let group: ChatGroup = serde_json::from_value(json!({
            "id": "g1",
            "name": "General",
            "created_at": "2024-03-01T10:00:00+00:00"
        }))
        .unwrap();
        assert!(!group.is_private);
        assert_eq!(group.invite_code, None);
        assert_eq!(group.description, None);
    }

    #[test]
    fn numeric_ids_are_read_as_strings() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "id": 42,
            "content": "hola",
            "user_id": "alice",
            "group_id": 7,
            "created_at": "2024-03-01T10:00:00.123456+00:00",
            "reply_to": 41
        }))
        .unwrap();
        assert_eq!(msg.id, "42");
        assert_eq!(msg.group_id, "7");
        assert_eq!(msg.reply_to.as_deref(), Some("41"));
        assert_eq!(msg.image_url, None);
    }

    #[test]
    fn new_message_row_keeps_null_reply_to() {
        let row = NewMessageRow {
            content: "hello".into(),
            group_id: "g1".into(),
            user_id: "alice".into(),
            image_url: None,
            created_at: Utc::now(),
            reply_to: None,
        };
        let value = serde_json::to_value(&row).unwrap();
        assert!(value.get("reply_to").unwrap().is_null());
        assert!(value.get("image_url").is_none());
    }

    #[test]
    fn preview_truncates_and_falls_back_to_image_marker() {
        let mut msg: ChatMessage = serde_json::from_value(json!({
            "id": "m1",
            "content": "",
            "user_id": "bob",
            "group_id": "g1",
            "image_url": "https://cdn.example/x.png",
            "created_at": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.preview(10), "[image]");
        msg.content = "abcdefghijkl".into();
        assert_eq!(msg.preview(5), "abcde…");
    }
}
