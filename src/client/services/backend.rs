use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use crate::common::error::BackendError;

/// A row as exchanged with the backend; typed decoding happens in the chat service.
pub type Row = Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Groups,
    Messages,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Groups => "groups",
            Table::Messages => "messages",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Column equality filter, e.g. `group_id = g1`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self { column: column.into(), value: value.into() }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Number(n)) => n.to_string() == self.value,
            Some(Value::Bool(b)) => b.to_string() == self.value,
            _ => false,
        }
    }

    /// PostgREST / realtime notation: `group_id=eq.g1`
    pub fn to_postgrest(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    /// Bulk read ordered by `created_at` ascending, the shape every list load uses.
    pub fn by_creation() -> Self {
        Self { filter: None, order: Some(Order::ascending("created_at")), limit: None }
    }

    pub fn filtered(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Managed backend: bulk reads, inserts, row-insert push channels and file storage.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn read(&self, table: Table, query: &Query) -> Result<Vec<Row>, BackendError>;

    /// Inserts one row and returns it as stored (with server-assigned id).
    async fn insert(&self, table: Table, row: Row) -> Result<Row, BackendError>;

    /// Opens a push channel delivering rows inserted into `table` that match `filter`.
    async fn subscribe(&self, table: Table, filter: Option<Filter>) -> Result<Subscription, BackendError>;

    /// Stores a file and returns its public URL.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError>;
}

type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// Receiving end of a push channel.
///
/// The channel is released exactly once: on [`Subscription::unsubscribe`] or when
/// the value is dropped, whichever comes first.
pub struct Subscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<Row>,
    release: Option<ReleaseFn>,
}

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        rx: mpsc::UnboundedReceiver<Row>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self { topic: topic.into(), rx, release: Some(Box::new(release)) }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next inserted row; `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Row> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Row> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            log::debug!("[SYNC] Releasing channel {}", self.topic);
            release();
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("released", &self.release.is_none())
            .finish()
    }
}
