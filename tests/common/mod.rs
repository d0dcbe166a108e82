#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use charla::client::models::app_state::ChatAppState;
use charla::client::services::backend::Table;
use charla::client::services::chat_service::ChatService;
use charla::client::services::memory_backend::MemoryBackend;
use charla::client::session::{ChatSession, LiveUpdate};
use charla::client::utils::identity_store::{IdentityStore, MemoryStorage};
use charla::common::models::ChatMessage;

pub fn session_as(backend: &MemoryBackend, name: Option<&str>) -> ChatSession {
    let storage = match name {
        Some(n) => MemoryStorage::with_name(n),
        None => MemoryStorage::default(),
    };
    let state = ChatAppState::new(IdentityStore::open(Box::new(storage)));
    ChatSession::new(state, ChatService::new(Arc::new(backend.clone())))
}

/// Backend with two public groups, g1 and g2, and no messages.
pub fn backend_with_groups() -> MemoryBackend {
    let backend = MemoryBackend::new();
    seed_group(&backend, "g1", "general", "2024-05-01T10:00:00Z");
    seed_group(&backend, "g2", "random", "2024-05-01T11:00:00Z");
    backend
}

pub fn seed_group(backend: &MemoryBackend, id: &str, name: &str, created_at: &str) -> Value {
    backend.seed(
        Table::Groups,
        json!({"id": id, "name": name, "created_at": created_at, "is_private": false}),
    )
}

pub fn message_row(id: &str, group: &str, user: &str, content: &str, minute: u32) -> Value {
    json!({
        "id": id,
        "content": content,
        "user_id": user,
        "group_id": group,
        "created_at": format!("2024-05-01T12:{:02}:00Z", minute),
    })
}

pub fn message(id: &str, group: &str) -> ChatMessage {
    ChatMessage {
        id: id.into(),
        content: format!("text of {}", id),
        user_id: "bob".into(),
        group_id: group.into(),
        image_url: None,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        reply_to: None,
    }
}

pub fn message_ids(session: &ChatSession) -> Vec<String> {
    session.state.messages.iter().map(|m| m.id.clone()).collect()
}

pub async fn next_update(session: &mut ChatSession) -> LiveUpdate {
    tokio::time::timeout(Duration::from_secs(2), session.next_update())
        .await
        .expect("no live update within 2s")
}
