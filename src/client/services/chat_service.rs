use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Duration;
use uuid::Uuid;

use crate::client::services::backend::{Backend, Filter, Query, Subscription, Table};
use crate::common::error::{BackendError, ChatError};
use crate::common::invite;
use crate::common::models::{ChatGroup, ChatMessage, NewGroupRow, NewMessageRow};

pub const DEFAULT_ATTACHMENTS_BUCKET: &str = "chat-images";

/// A message ready to be written: everything validated, nothing sent yet.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub content: String,
    pub group_id: String,
    pub user_id: String,
    pub reply_to: Option<String>,
    /// http(s) URL used as-is, or a local file path uploaded first
    pub attachment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGroupRequest {
    pub name: String,
    pub is_private: bool,
}

/// Typed view over a push channel; undecodable rows are logged and skipped.
pub struct LiveFeed<T> {
    subscription: Subscription,
    _row: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> LiveFeed<T> {
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription, _row: PhantomData }
    }

    /// Next decodable inserted row, `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            let row = self.subscription.recv().await?;
            match serde_json::from_value::<T>(row) {
                Ok(item) => return Some(item),
                Err(e) => warn!("[SYNC] Skipping undecodable row on {}: {}", self.subscription.topic(), e),
            }
        }
    }

    /// Next row already delivered, without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        while let Some(row) = self.subscription.try_recv() {
            match serde_json::from_value::<T>(row) {
                Ok(item) => return Some(item),
                Err(e) => warn!("[SYNC] Skipping undecodable row on {}: {}", self.subscription.topic(), e),
            }
        }
        None
    }

    pub fn topic(&self) -> &str {
        self.subscription.topic()
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}

impl<T> std::fmt::Debug for LiveFeed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFeed").field("subscription", &self.subscription).finish()
    }
}

const REOPEN_DELAY: Duration = Duration::from_secs(2);
const MAX_REOPEN_DELAY: Duration = Duration::from_secs(30);

type Opener<T> = Box<dyn Fn() -> BoxFuture<'static, Result<LiveFeed<T>, BackendError>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent<T> {
    Item(T),
    /// The channel was lost and is open again; inserts in between were missed.
    Resumed,
}

/// Live feed that reopens its channel whenever the backend closes it.
///
/// Reopening waits 2s, doubling up to 30s while the backend keeps refusing.
pub struct ResumingFeed<T> {
    open: Opener<T>,
    feed: Option<LiveFeed<T>>,
    delay: Duration,
    lost: bool,
}

impl<T: DeserializeOwned> ResumingFeed<T> {
    fn new(open: Opener<T>) -> Self {
        Self { open, feed: None, delay: REOPEN_DELAY, lost: false }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn next(&mut self) -> FeedEvent<T> {
        let mut wait = self.delay;
        loop {
            if let Some(feed) = self.feed.as_mut() {
                if let Some(item) = feed.next().await {
                    return FeedEvent::Item(item);
                }
                warn!("[SYNC] Channel {} closed, reopening", feed.topic());
                self.feed = None;
                self.lost = true;
            }
            if self.lost {
                tokio::time::sleep(wait).await;
                wait = (wait * 2).min(MAX_REOPEN_DELAY);
            }
            match (self.open)().await {
                Ok(feed) => {
                    let reopened = std::mem::take(&mut self.lost);
                    if reopened {
                        info!("[SYNC] Channel {} reopened", feed.topic());
                    }
                    self.feed = Some(feed);
                    if reopened {
                        return FeedEvent::Resumed;
                    }
                }
                Err(e) => {
                    warn!("[SYNC] Could not open channel: {}", e);
                    self.lost = true;
                }
            }
        }
    }
}

/// Chat operations over a backend. Cheap to clone.
#[derive(Clone)]
pub struct ChatService {
    backend: Arc<dyn Backend>,
    attachments_bucket: String,
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, BackendError> {
    rows.into_iter()
        .map(|r| serde_json::from_value(r).map_err(|e| BackendError::Decode(e.to_string())))
        .collect()
}

fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T, BackendError> {
    serde_json::from_value(row).map_err(|e| BackendError::Decode(e.to_string()))
}

impl ChatService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend, attachments_bucket: DEFAULT_ATTACHMENTS_BUCKET.to_string() }
    }

    pub fn with_attachments_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.attachments_bucket = bucket.into();
        self
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub async fn load_groups(&self) -> Result<Vec<ChatGroup>, BackendError> {
        let rows = self.backend.read(Table::Groups, &Query::by_creation()).await?;
        decode_rows(rows)
    }

    pub async fn load_messages(&self, group_id: &str) -> Result<Vec<ChatMessage>, BackendError> {
        let query = Query::by_creation().filtered(Filter::eq("group_id", group_id));
        let rows = self.backend.read(Table::Messages, &query).await?;
        decode_rows(rows)
    }

    pub async fn subscribe_groups(&self) -> Result<LiveFeed<ChatGroup>, BackendError> {
        let sub = self.backend.subscribe(Table::Groups, None).await?;
        Ok(LiveFeed::new(sub))
    }

    /// Groups feed that survives channel losses.
    pub fn follow_groups(&self) -> ResumingFeed<ChatGroup> {
        let svc = self.clone();
        ResumingFeed::new(Box::new(move || {
            let svc = svc.clone();
            async move { svc.subscribe_groups().await }.boxed()
        }))
    }

    pub fn follow_messages(&self, group_id: &str) -> ResumingFeed<ChatMessage> {
        let svc = self.clone();
        let group_id = group_id.to_string();
        ResumingFeed::new(Box::new(move || {
            let svc = svc.clone();
            let group_id = group_id.clone();
            async move { svc.subscribe_messages(&group_id).await }.boxed()
        }))
    }

    pub async fn subscribe_messages(&self, group_id: &str) -> Result<LiveFeed<ChatMessage>, BackendError> {
        let sub = self
            .backend
            .subscribe(Table::Messages, Some(Filter::eq("group_id", group_id)))
            .await?;
        Ok(LiveFeed::new(sub))
    }

    /// Writes a message. If the backend rejects the row because of `reply_to`
    /// (older schemas lack the column) the insert is retried once without it.
    pub async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<ChatMessage, ChatError> {
        let image_url = match &outgoing.attachment {
            Some(a) => Some(self.resolve_attachment(a, &outgoing.group_id).await?),
            None => None,
        };
        let row = NewMessageRow {
            content: outgoing.content.clone(),
            group_id: outgoing.group_id.clone(),
            user_id: outgoing.user_id.clone(),
            image_url,
            created_at: Utc::now(),
            reply_to: outgoing.reply_to.clone(),
        };
        let mut value = serde_json::to_value(&row)
            .map_err(|e| ChatError::SendMessage(BackendError::Decode(e.to_string())))?;

        let stored = match self.backend.insert(Table::Messages, value.clone()).await {
            Ok(stored) => stored,
            Err(e) if e.mentions("reply_to") => {
                warn!("[SYNC] Insert rejected over reply_to ({}), retrying without it", e);
                if let Some(map) = value.as_object_mut() {
                    map.remove("reply_to");
                }
                self.backend
                    .insert(Table::Messages, value)
                    .await
                    .map_err(ChatError::SendMessage)?
            }
            Err(e) => return Err(ChatError::SendMessage(e)),
        };
        decode_row(stored).map_err(ChatError::SendMessage)
    }

    /// Creates a group; private groups get a fresh invite code before the insert.
    pub async fn create_group(&self, request: &NewGroupRequest) -> Result<ChatGroup, ChatError> {
        let invite_code = request.is_private.then(invite::generate_invite_code);
        let row = NewGroupRow {
            name: request.name.clone(),
            created_at: Utc::now(),
            is_private: request.is_private,
            invite_code,
        };
        let value = serde_json::to_value(&row)
            .map_err(|e| ChatError::CreateGroup(BackendError::Decode(e.to_string())))?;
        let stored = self
            .backend
            .insert(Table::Groups, value)
            .await
            .map_err(ChatError::CreateGroup)?;
        let group: ChatGroup = decode_row(stored).map_err(ChatError::CreateGroup)?;
        info!("[SYNC] Created group {} (private: {})", group.id, group.is_private);
        Ok(group)
    }

    /// One lookup against `groups.invite_code`. Callers validate the code shape first.
    pub async fn find_group_by_invite_code(&self, code: &str) -> Result<ChatGroup, ChatError> {
        let query = Query::by_creation()
            .filtered(Filter::eq("invite_code", code))
            .limit(1);
        let rows = self
            .backend
            .read(Table::Groups, &query)
            .await
            .map_err(ChatError::InviteLookup)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::InviteCodeNotFound(code.to_string()))?;
        decode_row(row).map_err(ChatError::InviteLookup)
    }

    /// URL for an attachment: remote URLs pass through, local files are uploaded.
    pub async fn resolve_attachment(&self, attachment: &str, group_id: &str) -> Result<String, ChatError> {
        let attachment = attachment.trim();
        if attachment.starts_with("http://") || attachment.starts_with("https://") {
            return Ok(attachment.to_string());
        }
        self.upload_image(Path::new(attachment), group_id).await
    }

    pub async fn upload_image(&self, path: &Path, group_id: &str) -> Result<String, ChatError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ChatError::Attachment(format!("{}: {}", path.display(), e)))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_else(|| "bin".to_string());
        let object = format!("{}/{}.{}", group_id, Uuid::new_v4(), ext);
        debug!("[SYNC] Uploading {} as {}", path.display(), object);
        self.backend
            .upload(&self.attachments_bucket, &object, bytes, content_type_for(&ext))
            .await
            .map_err(|e| ChatError::Attachment(e.to_string()))
    }
}

pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::services::memory_backend::{BackendCall, MemoryBackend};
    use serde_json::json;

    fn service() -> (MemoryBackend, ChatService) {
        let backend = MemoryBackend::new();
        let svc = ChatService::new(Arc::new(backend.clone()));
        (backend, svc)
    }

    fn outgoing(reply_to: Option<&str>) -> OutgoingMessage {
        OutgoingMessage {
            content: "ok".into(),
            group_id: "g1".into(),
            user_id: "alice".into(),
            reply_to: reply_to.map(str::to_string),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn reply_to_is_dropped_when_backend_lacks_the_column() {
        let (backend, svc) = service();
        backend.reject_column(Table::Messages, "reply_to");
        let msg = svc.send_message(&outgoing(Some("m1"))).await.unwrap();
        assert_eq!(msg.reply_to, None);

        let inserts = backend.inserts(Table::Messages);
        assert_eq!(inserts.len(), 2);
        assert_eq!(inserts[0]["reply_to"], "m1");
        assert!(inserts[1].get("reply_to").is_none());
    }

    #[tokio::test]
    async fn other_insert_failures_are_not_retried() {
        let (backend, svc) = service();
        backend.fail_inserts(Some("permission denied for table messages"));
        let err = svc.send_message(&outgoing(None)).await.unwrap_err();
        assert_eq!(err.to_string(), "Error sending message: permission denied for table messages");
        assert_eq!(backend.inserts(Table::Messages).len(), 1);
    }

    #[tokio::test]
    async fn private_group_gets_an_invite_code() {
        let (backend, svc) = service();
        let group = svc
            .create_group(&NewGroupRequest { name: "secret".into(), is_private: true })
            .await
            .unwrap();
        let code = group.invite_code.clone().unwrap();
        assert!(invite::has_valid_shape(&code));
        assert_eq!(backend.inserts(Table::Groups)[0]["invite_code"], json!(code));

        let public = svc
            .create_group(&NewGroupRequest { name: "open".into(), is_private: false })
            .await
            .unwrap();
        assert_eq!(public.invite_code, None);
    }

    #[tokio::test]
    async fn invite_lookup_reports_missing_codes() {
        let (backend, svc) = service();
        backend.seed(Table::Groups, json!({"id": "g7", "name": "x", "is_private": true, "invite_code": "ABC1234"}));
        assert_eq!(svc.find_group_by_invite_code("ABC1234").await.unwrap().id, "g7");
        assert_eq!(
            svc.find_group_by_invite_code("ZZZ9999").await.unwrap_err(),
            ChatError::InviteCodeNotFound("ZZZ9999".into())
        );
    }

    #[tokio::test]
    async fn local_attachment_is_uploaded_before_the_insert() {
        let (backend, svc) = service();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.PNG");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let mut out = outgoing(None);
        out.attachment = Some(path.display().to_string());
        let msg = svc.send_message(&out).await.unwrap();
        let url = msg.image_url.unwrap();
        assert!(url.starts_with("memory://chat-images/g1/"));
        assert!(url.ends_with(".png"));
        assert!(matches!(backend.calls()[0], BackendCall::Upload { .. }));
    }

    #[tokio::test]
    async fn remote_attachment_passes_through() {
        let (backend, svc) = service();
        let mut out = outgoing(None);
        out.attachment = Some("https://cdn.example/cat.png".into());
        let msg = svc.send_message(&out).await.unwrap();
        assert_eq!(msg.image_url.as_deref(), Some("https://cdn.example/cat.png"));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn live_feed_skips_rows_it_cannot_decode() {
        let (backend, svc) = service();
        let mut feed = svc.subscribe_groups().await.unwrap();
        backend.push_external(Table::Groups, json!({"id": "bad"}));
        backend.push_external(Table::Groups, json!({"id": "g2", "name": "two"}));
        let group = feed.next().await.unwrap();
        assert_eq!(group.id, "g2");
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("jpeg"), "image/jpeg");
        assert_eq!(content_type_for("exe"), "application/octet-stream");
    }

    #[tokio::test]
    async fn dropped_channel_is_reopened() {
        let (backend, svc) = service();
        let mut feed = svc.follow_messages("g1").with_delay(Duration::from_millis(10));
        backend.push_external(Table::Messages, json!({"id": "m0", "group_id": "g1", "user_id": "b", "content": "x"}));
        // nothing is open before the first call, so m0 is never delivered
        let waiter = tokio::spawn(async move {
            let first = feed.next().await;
            (first, feed)
        });
        while backend.open_channels() == 0 {
            tokio::task::yield_now().await;
        }
        backend.push_external(Table::Messages, json!({"id": "m1", "group_id": "g1", "user_id": "b", "content": "x"}));
        let (first, mut feed) = waiter.await.unwrap();
        assert!(matches!(first, FeedEvent::Item(ref m) if m.id == "m1"));

        assert_eq!(backend.drop_channels(), 1);
        assert_eq!(feed.next().await, FeedEvent::Resumed);
        assert_eq!(backend.open_channels_for(Table::Messages, Some(&Filter::eq("group_id", "g1"))), 1);

        backend.push_external(Table::Messages, json!({"id": "m2", "group_id": "g1", "user_id": "b", "content": "x"}));
        assert!(matches!(feed.next().await, FeedEvent::Item(ref m) if m.id == "m2"));
    }
}
