mod common;

use std::collections::BTreeSet;

use serde_json::{json, Value};

use charla::client::models::app_state::ChatAppState;
use charla::client::services::backend::{Filter, Table};
use charla::client::services::memory_backend::{BackendCall, MemoryBackend};
use charla::client::session::{LiveUpdate, SubmitOutcome};
use charla::client::utils::identity_store::IdentityStore;

use common::*;

#[tokio::test]
async fn repeated_pushes_keep_one_copy_from_the_first_event() {
    let backend = backend_with_groups();
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;
    session.select_group("g1").await;

    let first = backend.push_external(Table::Messages, message_row("m1", "g1", "bob", "first", 1));
    backend.redeliver(Table::Messages, &first);
    let mut altered = first.clone();
    altered["content"] = json!("second");
    backend.redeliver(Table::Messages, &altered);

    assert_eq!(session.apply_pending(), 1);
    assert_eq!(message_ids(&session), vec!["m1"]);
    assert_eq!(session.state.messages.get("m1").unwrap().content, "first");
}

#[tokio::test]
async fn pushes_buffered_during_the_initial_read_are_merged() {
    let backend = backend_with_groups();
    backend.seed(Table::Messages, message_row("m1", "g1", "bob", "one", 1));
    backend.seed(Table::Messages, message_row("m2", "g1", "bob", "two", 2));
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;
    session.select_group("g1").await;

    // m2 again (already fetched) and m3 (new) arrive on the channel
    let m2 = backend.rows(Table::Messages).into_iter().find(|r| r["id"] == "m2").unwrap();
    backend.redeliver(Table::Messages, &m2);
    backend.push_external(Table::Messages, message_row("m3", "g1", "carol", "three", 3));

    session.apply_pending();
    assert_eq!(message_ids(&session), vec!["m1", "m2", "m3"]);
}

#[test]
fn fetch_and_push_interleavings_reach_the_same_set() {
    let fetched = vec![message("m1", "g1"), message("m2", "g1")];
    let pushed = vec![message("m2", "g1"), message("m3", "g1")];
    let expected: BTreeSet<String> = ["m1", "m2", "m3"].iter().map(|s| s.to_string()).collect();

    // 0 = apply the fetch; 1.. = apply push i-1
    let orders: [&[usize]; 4] = [&[0, 1, 2], &[1, 2, 0], &[1, 0, 2], &[2, 0, 1]];
    for order in orders {
        let mut state = ChatAppState::new(IdentityStore::ephemeral());
        let scope = state.select_group("g1");
        for &step in order {
            match step {
                0 => {
                    state.apply_initial_messages(scope, Ok(fetched.clone()));
                }
                i => {
                    state.apply_message_insert(scope, pushed[i - 1].clone());
                }
            }
        }
        let ids: BTreeSet<String> = state.messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, expected, "order {:?}", order);
        assert_eq!(state.messages.len(), 3, "order {:?}", order);
    }
}

#[tokio::test]
async fn switching_groups_drops_the_old_group_and_its_channel() {
    let backend = backend_with_groups();
    backend.seed(Table::Messages, message_row("a1", "g1", "bob", "in g1", 1));
    backend.seed(Table::Messages, message_row("b1", "g2", "bob", "in g2", 2));
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;

    session.select_group("g1").await;
    assert_eq!(message_ids(&session), vec!["a1"]);
    assert_eq!(backend.open_channels_for(Table::Messages, Some(&Filter::eq("group_id", "g1"))), 1);

    session.select_group("g2").await;
    assert_eq!(message_ids(&session), vec!["b1"]);
    assert_eq!(backend.open_channels_for(Table::Messages, Some(&Filter::eq("group_id", "g1"))), 0);
    assert_eq!(backend.open_channels_for(Table::Messages, Some(&Filter::eq("group_id", "g2"))), 1);

    backend.push_external(Table::Messages, message_row("a2", "g1", "bob", "late g1", 3));
    session.apply_pending();
    assert!(session.state.messages.iter().all(|m| m.group_id == "g2"));
}

#[test]
fn new_group_starts_empty_before_its_fetch() {
    let mut state = ChatAppState::new(IdentityStore::ephemeral());
    let a = state.select_group("A");
    state.apply_initial_messages(a, Ok(vec![message("a1", "A")]));
    state.select_group("B");
    assert!(state.messages.is_empty());
    // A's late read does not leak into B
    state.apply_initial_messages(a, Ok(vec![message("a2", "A")]));
    assert!(state.messages.is_empty());
}

#[test]
fn slash_input_filters_the_command_list() {
    let mut state = ChatAppState::new(IdentityStore::ephemeral());
    state.on_input_changed("/j".into());
    let usages: Vec<&str> = state.dispatcher.suggestions().iter().map(|c| c.usage).collect();
    assert_eq!(usages, vec!["/join <code>"]);

    state.on_input_changed("/".into());
    let usages: Vec<&str> = state.dispatcher.suggestions().iter().map(|c| c.usage).collect();
    assert_eq!(usages, vec!["/join <code>", "/help"]);
}

fn invite_lookups(backend: &MemoryBackend) -> usize {
    backend
        .calls()
        .iter()
        .filter(|c| {
            matches!(c, BackendCall::Read { table: Table::Groups, filter: Some(f) } if f.column == "invite_code")
        })
        .count()
}

#[tokio::test]
async fn malformed_invite_code_never_reaches_the_backend() {
    let backend = backend_with_groups();
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;

    let outcome = session.submit_text("/join AB12").await;
    assert!(matches!(outcome, SubmitOutcome::Failed(ref text) if text.contains("AB12")));
    assert_eq!(invite_lookups(&backend), 0);
    assert_eq!(session.state.message_input, "/join AB12");
    assert!(session.state.alert.is_some());
}

#[tokio::test]
async fn well_formed_invite_code_issues_one_lookup() {
    let backend = backend_with_groups();
    backend.seed(
        Table::Groups,
        json!({"id": "g9", "name": "secret", "is_private": true, "invite_code": "ABC1234"}),
    );
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;

    let outcome = session.submit_text("/join ABC1234").await;
    assert!(matches!(outcome, SubmitOutcome::Joined(ref g) if g.id == "g9"));
    assert_eq!(invite_lookups(&backend), 1);
    assert_eq!(session.state.current_group.as_deref(), Some("g9"));
    assert!(session.state.message_input.is_empty());
}

#[tokio::test]
async fn unknown_invite_code_alerts_and_keeps_input() {
    let backend = backend_with_groups();
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;

    let outcome = session.submit_text("/join ZZZ9999").await;
    assert!(matches!(outcome, SubmitOutcome::Failed(_)));
    assert_eq!(invite_lookups(&backend), 1);
    assert_eq!(session.state.message_input, "/join ZZZ9999");
    assert_eq!(session.state.current_group, None);
}

#[tokio::test]
async fn sending_writes_one_row_and_clears_the_input() {
    let backend = backend_with_groups();
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;
    session.select_group("g1").await;

    let outcome = session.submit_text("hello").await;
    assert!(matches!(outcome, SubmitOutcome::Sent(_)));

    let inserts = backend.inserts(Table::Messages);
    assert_eq!(inserts.len(), 1);
    let row = &inserts[0];
    assert_eq!(row["content"], "hello");
    assert_eq!(row["group_id"], "g1");
    assert_eq!(row["user_id"], "alice");
    assert_eq!(row.get("reply_to"), Some(&Value::Null));
    assert!(row.get("created_at").is_some());

    assert!(session.state.message_input.is_empty());
    assert_eq!(session.state.alert, None);
    // the echo on the push channel is not a second copy
    session.apply_pending();
    assert_eq!(session.state.messages.len(), 1);
    assert!(session.state.is_own_message(session.state.messages.iter().next().unwrap()));
}

#[tokio::test]
async fn reply_target_is_sent_and_then_cleared() {
    let backend = backend_with_groups();
    backend.seed(Table::Messages, message_row("m1", "g1", "bob", "question?", 1));
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;
    session.select_group("g1").await;

    session.state.set_reply_target(Some("m1".into()));
    session.submit_text("ok").await;

    let inserts = backend.inserts(Table::Messages);
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0]["reply_to"], "m1");
    assert_eq!(session.state.reply_to, None);
}

#[tokio::test]
async fn reply_column_rejection_falls_back_silently() {
    let backend = backend_with_groups();
    backend.reject_column(Table::Messages, "reply_to");
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;
    session.select_group("g1").await;

    let outcome = session.submit_text("still works").await;
    assert!(matches!(outcome, SubmitOutcome::Sent(ref m) if m.reply_to.is_none()));
    assert_eq!(backend.inserts(Table::Messages).len(), 2);
    assert_eq!(session.state.alert, None);
    assert!(session.state.message_input.is_empty());
}

#[tokio::test]
async fn failed_fallback_shows_the_backend_text() {
    let backend = backend_with_groups();
    backend.fail_inserts(Some("Could not find the 'reply_to' column of 'messages' in the schema cache"));
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;
    session.select_group("g1").await;

    session.submit_text("hello").await;
    assert_eq!(backend.inserts(Table::Messages).len(), 2);
    assert_eq!(
        session.state.alert.as_deref(),
        Some("Error sending message: Could not find the 'reply_to' column of 'messages' in the schema cache")
    );
    assert_eq!(session.state.message_input, "hello");
}

#[tokio::test]
async fn blank_message_is_not_sent() {
    let backend = backend_with_groups();
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;
    session.select_group("g1").await;

    assert_eq!(session.submit_text("   ").await, SubmitOutcome::Nothing);
    assert!(backend.inserts(Table::Messages).is_empty());
}

#[tokio::test]
async fn image_only_message_is_sendable() {
    let backend = backend_with_groups();
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;
    session.select_group("g1").await;

    session.state.set_attachment(Some("https://cdn.example/cat.png".into()));
    let outcome = session.submit_text("").await;
    assert!(matches!(outcome, SubmitOutcome::Sent(ref m) if m.has_image()));
    assert_eq!(session.state.attachment, None);
}

#[tokio::test]
async fn nothing_is_sent_without_a_name() {
    let backend = backend_with_groups();
    let mut session = session_as(&backend, None);
    session.start().await;
    session.select_group("g1").await;

    assert_eq!(session.submit_text("hello").await, SubmitOutcome::Nothing);
    assert!(backend.inserts(Table::Messages).is_empty());

    assert!(session.set_name("alice"));
    assert!(matches!(session.submit_text("hello").await, SubmitOutcome::Sent(_)));
}

#[tokio::test]
async fn failed_initial_read_leaves_collections_untouched() {
    let backend = backend_with_groups();
    backend.fail_reads(Some("connection refused"));
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;
    assert!(session.state.groups.is_empty());
    assert_eq!(session.state.alert, None);

    // the channel still works
    backend.push_external(Table::Groups, json!({"id": "g3", "name": "late"}));
    assert!(matches!(next_update(&mut session).await, LiveUpdate::Group(ref g) if g.id == "g3"));
}

#[tokio::test]
async fn groups_appear_in_creation_order_then_push_order() {
    let backend = backend_with_groups();
    let mut session = session_as(&backend, Some("alice"));
    session.start().await;
    backend.push_external(Table::Groups, json!({"id": "g3", "name": "third"}));
    next_update(&mut session).await;

    let ids: Vec<&str> = session.state.groups.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, vec!["g1", "g2", "g3"]);
}
