use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::client::services::backend::{Backend, Filter, Query, Row, Subscription, Table};
use crate::common::error::BackendError;

/// One call received by the in-memory backend, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Read { table: Table, filter: Option<Filter> },
    Insert { table: Table, row: Row },
    Subscribe { table: Table, filter: Option<Filter> },
    Upload { bucket: String, path: String },
}

#[derive(Debug, Clone, Default)]
struct Faults {
    fail_reads: Option<String>,
    fail_inserts: Option<String>,
    /// Inserts into the table carrying this column are rejected like PostgREST does
    unknown_column: Option<(Table, String)>,
}

struct Listener {
    id: u64,
    table: Table,
    filter: Option<Filter>,
    tx: mpsc::UnboundedSender<Row>,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<HashMap<Table, Vec<Row>>>,
    listeners: Mutex<Vec<Listener>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<BackendCall>>,
    faults: Mutex<Faults>,
    next_listener: AtomicU64,
}

/// In-process backend with the same contract as the hosted one.
///
/// Inserts fan out synchronously to every open channel whose table and filter
/// match. Every call is recorded, and reads/inserts can be made to fail.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a row directly, without recording a call or notifying channels.
    pub fn seed(&self, table: Table, row: Row) -> Row {
        let row = Self::complete_row(row);
        lock(&self.inner.tables).entry(table).or_default().push(row.clone());
        row
    }

    /// Simulates another client inserting a row: stored and pushed, not recorded.
    pub fn push_external(&self, table: Table, row: Row) -> Row {
        let row = self.seed(table, row);
        self.notify(table, &row);
        row
    }

    /// Re-delivers an existing row on the push channels, as a flaky channel would.
    pub fn redeliver(&self, table: Table, row: &Row) {
        self.notify(table, row);
    }

    pub fn fail_reads(&self, message: Option<&str>) {
        lock(&self.inner.faults).fail_reads = message.map(str::to_string);
    }

    pub fn fail_inserts(&self, message: Option<&str>) {
        lock(&self.inner.faults).fail_inserts = message.map(str::to_string);
    }

    pub fn reject_column(&self, table: Table, column: &str) {
        lock(&self.inner.faults).unknown_column = Some((table, column.to_string()));
    }

    /// Closes every open channel from the backend side, as a lost socket does.
    pub fn drop_channels(&self) -> usize {
        let dropped: Vec<Listener> = lock(&self.inner.listeners).drain(..).collect();
        info!("[MEMORY] Dropped {} channels", dropped.len());
        dropped.len()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.inner.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.inner.calls).clear();
    }

    pub fn inserts(&self, table: Table) -> Vec<Row> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Insert { table: t, row } if t == table => Some(row),
                _ => None,
            })
            .collect()
    }

    pub fn read_count(&self, table: Table) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Read { table: t, .. } if *t == table))
            .count()
    }

    pub fn rows(&self, table: Table) -> Vec<Row> {
        lock(&self.inner.tables).get(&table).cloned().unwrap_or_default()
    }

    /// Number of channels currently open (not yet released).
    pub fn open_channels(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    pub fn open_channels_for(&self, table: Table, filter: Option<&Filter>) -> usize {
        lock(&self.inner.listeners)
            .iter()
            .filter(|l| l.table == table && l.filter.as_ref() == filter)
            .count()
    }

    pub fn file(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.inner.files).get(key).cloned()
    }

    fn record(&self, call: BackendCall) {
        lock(&self.inner.calls).push(call);
    }

    fn notify(&self, table: Table, row: &Row) {
        let mut listeners = lock(&self.inner.listeners);
        // a closed receiver means the subscriber went away without releasing
        listeners.retain(|l| !l.tx.is_closed());
        for listener in listeners.iter() {
            if listener.table != table {
                continue;
            }
            if let Some(filter) = &listener.filter {
                if !filter.matches(row) {
                    continue;
                }
            }
            let _ = listener.tx.send(row.clone());
        }
    }

    fn complete_row(row: Row) -> Row {
        let mut map = match row {
            Value::Object(map) => map,
            other => return other,
        };
        if map.get("id").map_or(true, Value::is_null) {
            map.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        if map.get("created_at").map_or(true, Value::is_null) {
            map.insert("created_at".into(), Value::String(Utc::now().to_rfc3339()));
        }
        Value::Object(map)
    }
}

fn sort_key(row: &Row, column: &str) -> (Option<DateTime<Utc>>, String) {
    match row.get(column) {
        Some(Value::String(s)) => (
            DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
            s.clone(),
        ),
        Some(other) => (None, other.to_string()),
        None => (None, String::new()),
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read(&self, table: Table, query: &Query) -> Result<Vec<Row>, BackendError> {
        self.record(BackendCall::Read { table, filter: query.filter.clone() });
        if let Some(message) = lock(&self.inner.faults).fail_reads.clone() {
            return Err(BackendError::Transport(message));
        }
        let mut rows: Vec<Row> = self
            .rows(table)
            .into_iter()
            .filter(|r| query.filter.as_ref().map_or(true, |f| f.matches(r)))
            .collect();
        if let Some(order) = &query.order {
            // stable sort: equal timestamps keep insertion order
            rows.sort_by(|a, b| {
                let ord = sort_key(a, &order.column).cmp(&sort_key(b, &order.column));
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        debug!("[MEMORY] read {} -> {} rows", table, rows.len());
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Row, BackendError> {
        self.record(BackendCall::Insert { table, row: row.clone() });
        let faults = lock(&self.inner.faults).clone();
        if let Some((t, column)) = &faults.unknown_column {
            if *t == table && row.get(column).is_some() {
                return Err(BackendError::Rejected {
                    status: Some(400),
                    message: format!(
                        "Could not find the '{}' column of '{}' in the schema cache",
                        column, table
                    ),
                });
            }
        }
        if let Some(message) = faults.fail_inserts {
            return Err(BackendError::rejected(message));
        }
        if !row.is_object() {
            return Err(BackendError::rejected("row must be a JSON object"));
        }
        let stored = self.seed(table, row);
        self.notify(table, &stored);
        Ok(stored)
    }

    async fn subscribe(&self, table: Table, filter: Option<Filter>) -> Result<Subscription, BackendError> {
        self.record(BackendCall::Subscribe { table, filter: filter.clone() });
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        let topic = match &filter {
            Some(f) => format!("{}:{}", table, f.to_postgrest()),
            None => table.to_string(),
        };
        lock(&self.inner.listeners).push(Listener { id, table, filter, tx });
        info!("[MEMORY] Channel {} opened ({})", id, topic);

        let inner = Arc::downgrade(&self.inner);
        Ok(Subscription::new(topic, rx, move || {
            if let Some(inner) = inner.upgrade() {
                lock(&inner.listeners).retain(|l| l.id != id);
            }
        }))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, BackendError> {
        self.record(BackendCall::Upload { bucket: bucket.to_string(), path: path.to_string() });
        let key = format!("{}/{}", bucket, path);
        lock(&self.inner.files).insert(key.clone(), bytes);
        Ok(format!("memory://{}", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_and_pushes_to_matching_channels() {
        let backend = MemoryBackend::new();
        let mut g1 = backend
            .subscribe(Table::Messages, Some(Filter::eq("group_id", "g1")))
            .await
            .unwrap();
        let mut g2 = backend
            .subscribe(Table::Messages, Some(Filter::eq("group_id", "g2")))
            .await
            .unwrap();

        let stored = backend
            .insert(Table::Messages, json!({"content": "hi", "group_id": "g1", "user_id": "a"}))
            .await
            .unwrap();
        assert!(stored.get("id").and_then(Value::as_str).is_some());
        assert!(stored.get("created_at").is_some());

        assert_eq!(g1.try_recv(), Some(stored));
        assert_eq!(g2.try_recv(), None);
    }

    #[tokio::test]
    async fn read_filters_and_orders_by_creation() {
        let backend = MemoryBackend::new();
        backend.seed(Table::Groups, json!({"id": "b", "name": "B", "created_at": "2024-01-02T00:00:00Z"}));
        backend.seed(Table::Groups, json!({"id": "a", "name": "A", "created_at": "2024-01-01T00:00:00Z"}));
        backend.seed(Table::Groups, json!({"id": "c", "name": "C", "created_at": "2024-01-03T00:00:00Z", "invite_code": "XYZ1234"}));

        let rows = backend.read(Table::Groups, &Query::by_creation()).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let rows = backend
            .read(Table::Groups, &Query::by_creation().filtered(Filter::eq("invite_code", "XYZ1234")))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(backend.read_count(Table::Groups), 2);
    }

    #[tokio::test]
    async fn released_channels_stop_receiving() {
        let backend = MemoryBackend::new();
        let sub = backend.subscribe(Table::Groups, None).await.unwrap();
        assert_eq!(backend.open_channels(), 1);
        sub.unsubscribe();
        assert_eq!(backend.open_channels(), 0);

        let dropped = backend.subscribe(Table::Groups, None).await.unwrap();
        drop(dropped);
        assert_eq!(backend.open_channels(), 0);
    }

    #[tokio::test]
    async fn unknown_column_is_rejected_with_postgrest_text() {
        let backend = MemoryBackend::new();
        backend.reject_column(Table::Messages, "reply_to");
        let err = backend
            .insert(Table::Messages, json!({"content": "x", "reply_to": null}))
            .await
            .unwrap_err();
        assert!(err.mentions("reply_to"));
        assert!(backend.rows(Table::Messages).is_empty());

        backend
            .insert(Table::Messages, json!({"content": "x"}))
            .await
            .unwrap();
        assert_eq!(backend.rows(Table::Messages).len(), 1);
    }

    #[tokio::test]
    async fn failing_reads_report_transport_errors() {
        let backend = MemoryBackend::new();
        backend.fail_reads(Some("offline"));
        let err = backend.read(Table::Groups, &Query::by_creation()).await.unwrap_err();
        assert_eq!(err, BackendError::Transport("offline".into()));
    }
}
