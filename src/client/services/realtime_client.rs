use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::client::services::backend::{Filter, Row, Subscription, Table};

/// Shortest heartbeat period; `tokio::time::interval` rejects a zero period.
pub const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// Frame of the Phoenix channel protocol spoken by the realtime endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone)]
pub enum RealtimeError {
    ConnectionFailed(String),
    InvalidUrl(String),
    Disconnected,
}

impl std::fmt::Display for RealtimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RealtimeError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            RealtimeError::InvalidUrl(msg) => write!(f, "Invalid realtime url: {}", msg),
            RealtimeError::Disconnected => write!(f, "Realtime socket disconnected"),
        }
    }
}

impl std::error::Error for RealtimeError {}

type TopicMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Row>>>>;

/// One websocket to the realtime endpoint, multiplexing every channel of the client.
pub struct RealtimeClient {
    outgoing: mpsc::UnboundedSender<PhoenixMessage>,
    topics: TopicMap,
    next_ref: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

/// `https://x.supabase.co` -> `wss://x.supabase.co/realtime/v1/websocket?apikey=..&vsn=1.0.0`
pub fn realtime_url(base: &str, api_key: &str) -> Result<Url, RealtimeError> {
    let mut url = Url::parse(base).map_err(|e| RealtimeError::InvalidUrl(e.to_string()))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(RealtimeError::InvalidUrl(format!("unsupported scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| RealtimeError::InvalidUrl(format!("cannot switch {} to {}", base, scheme)))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

/// Payload of `phx_join` asking for INSERT events on one table.
pub fn join_payload(schema: &str, table: Table, filter: Option<&Filter>, access_token: &str) -> Value {
    let mut change = json!({
        "event": "INSERT",
        "schema": schema,
        "table": table.name(),
    });
    if let Some(f) = filter {
        change["filter"] = Value::String(f.to_postgrest());
    }
    json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [change],
        },
        "access_token": access_token,
    })
}

/// Inserted row carried by a `postgres_changes` frame, if that is what `msg` is.
pub fn inserted_record(msg: &PhoenixMessage) -> Option<Row> {
    if msg.event != "postgres_changes" {
        return None;
    }
    let data = msg.payload.get("data")?;
    let kind = data.get("type").and_then(Value::as_str).unwrap_or("INSERT");
    if !kind.eq_ignore_ascii_case("INSERT") {
        return None;
    }
    data.get("record").cloned()
}

impl RealtimeClient {
    /// Connects with exponential backoff: 2s doubling up to 30s, at most `max_attempts` tries.
    pub async fn connect_with_retry(
        url: &Url,
        heartbeat: Duration,
        max_attempts: u32,
    ) -> Result<Self, RealtimeError> {
        let mut retry_delay = Duration::from_secs(2);
        for attempt in 1..=max_attempts {
            match Self::connect(url, heartbeat).await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    warn!("[REALTIME] Connection attempt {} failed: {}", attempt, e);
                    if attempt < max_attempts {
                        info!("[REALTIME] Retrying in {:?}...", retry_delay);
                        tokio::time::sleep(retry_delay).await;
                        retry_delay = std::cmp::min(retry_delay * 2, Duration::from_secs(30));
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        Err(RealtimeError::ConnectionFailed("Max retry attempts exceeded".to_string()))
    }

    pub async fn connect(url: &Url, heartbeat: Duration) -> Result<Self, RealtimeError> {
        info!("[REALTIME] Connecting to {}", redact(url));
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        info!("[REALTIME] Connected");

        let (mut ws_sender, ws_receiver) = ws_stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<PhoenixMessage>();
        let topics: TopicMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let next_ref = Arc::new(AtomicU64::new(1));

        let writer = {
            let connected = connected.clone();
            tokio::spawn(async move {
                while let Some(frame) = outgoing_rx.recv().await {
                    let text = match serde_json::to_string(&frame) {
                        Ok(t) => t,
                        Err(e) => {
                            error!("[REALTIME] Failed to serialize {} frame: {}", frame.event, e);
                            continue;
                        }
                    };
                    if let Err(e) = ws_sender.send(Message::Text(text)).await {
                        warn!("[REALTIME] Failed to send frame: {}", e);
                        break;
                    }
                }
                connected.store(false, Ordering::SeqCst);
                debug!("[REALTIME] Outgoing handler ended");
            })
        };

        let reader = {
            let topics = topics.clone();
            let connected = connected.clone();
            tokio::spawn(async move {
                Self::handle_incoming(ws_receiver, &topics).await;
                connected.store(false, Ordering::SeqCst);
                // dropping the senders ends every open subscription
                if let Ok(mut map) = topics.lock() {
                    map.clear();
                }
            })
        };

        let heartbeat_task = {
            let outgoing = outgoing_tx.clone();
            let next_ref = next_ref.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(heartbeat.max(MIN_HEARTBEAT));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let frame = PhoenixMessage {
                        topic: "phoenix".to_string(),
                        event: "heartbeat".to_string(),
                        payload: json!({}),
                        reference: Some(next_ref.fetch_add(1, Ordering::SeqCst).to_string()),
                    };
                    if outgoing.send(frame).is_err() {
                        break;
                    }
                }
            })
        };

        Ok(Self {
            outgoing: outgoing_tx,
            topics,
            next_ref,
            connected,
            tasks: vec![writer, reader, heartbeat_task],
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.outgoing.is_closed()
    }

    /// Joins a fresh channel for INSERTs on `table` matching `filter`.
    pub fn join(
        &self,
        schema: &str,
        table: Table,
        filter: Option<Filter>,
        access_token: &str,
    ) -> Result<Subscription, RealtimeError> {
        if !self.is_connected() {
            return Err(RealtimeError::Disconnected);
        }
        let reference = self.next_ref.fetch_add(1, Ordering::SeqCst);
        let topic = match &filter {
            Some(f) => format!("realtime:{}:{}:{}", table, f.to_postgrest(), reference),
            None => format!("realtime:{}:{}", table, reference),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut map) = self.topics.lock() {
            map.insert(topic.clone(), tx);
        }
        let join = PhoenixMessage {
            topic: topic.clone(),
            event: "phx_join".to_string(),
            payload: join_payload(schema, table, filter.as_ref(), access_token),
            reference: Some(reference.to_string()),
        };
        self.outgoing.send(join).map_err(|_| RealtimeError::Disconnected)?;
        info!("[REALTIME] Joined {}", topic);

        let outgoing = self.outgoing.clone();
        let topics = self.topics.clone();
        let next_ref = self.next_ref.clone();
        let leave_topic = topic.clone();
        Ok(Subscription::new(topic, rx, move || {
            if let Ok(mut map) = topics.lock() {
                map.remove(&leave_topic);
            }
            let _ = outgoing.send(PhoenixMessage {
                topic: leave_topic,
                event: "phx_leave".to_string(),
                payload: json!({}),
                reference: Some(next_ref.fetch_add(1, Ordering::SeqCst).to_string()),
            });
        }))
    }

    async fn handle_incoming<S>(mut ws_receiver: S, topics: &TopicMap)
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        while let Some(message) = ws_receiver.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<PhoenixMessage>(&text) {
                    Ok(frame) => Self::dispatch(frame, topics),
                    Err(e) => warn!("[REALTIME] Failed to parse frame: {}", e),
                },
                Ok(Message::Close(_)) => {
                    info!("[REALTIME] Connection closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("[REALTIME] WebSocket error: {}", e);
                    break;
                }
            }
        }
        debug!("[REALTIME] Incoming handler ended");
    }

    fn dispatch(frame: PhoenixMessage, topics: &TopicMap) {
        if let Some(record) = inserted_record(&frame) {
            let sender = topics.lock().ok().and_then(|m| m.get(&frame.topic).cloned());
            match sender {
                Some(tx) => {
                    let _ = tx.send(record);
                }
                None => debug!("[REALTIME] Insert for unknown topic {}", frame.topic),
            }
            return;
        }
        match frame.event.as_str() {
            "phx_reply" => {
                let status = frame.payload.get("status").and_then(Value::as_str).unwrap_or("");
                if status != "ok" {
                    warn!("[REALTIME] {} replied {}: {}", frame.topic, status, frame.payload);
                }
            }
            "phx_error" | "phx_close" => warn!("[REALTIME] {} on {}", frame.event, frame.topic),
            "system" => debug!("[REALTIME] system: {}", frame.payload),
            _ => {}
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_url_switches_scheme_and_path() {
        let url = realtime_url("https://abc.supabase.co", "anon").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        let local = realtime_url("http://127.0.0.1:54321", "k").unwrap();
        assert_eq!(local.scheme(), "ws");
        assert!(realtime_url("ftp://x", "k").is_err());
    }

    #[test]
    fn join_payload_carries_insert_filter() {
        let payload = join_payload("public", Table::Messages, Some(&Filter::eq("group_id", "g1")), "anon");
        let change = &payload["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "INSERT");
        assert_eq!(change["table"], "messages");
        assert_eq!(change["filter"], "group_id=eq.g1");

        let groups = join_payload("public", Table::Groups, None, "anon");
        assert!(groups["config"]["postgres_changes"][0].get("filter").is_none());
    }

    #[test]
    fn inserted_record_extracts_row() {
        let frame: PhoenixMessage = serde_json::from_value(json!({
            "topic": "realtime:messages:1",
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "type": "INSERT",
                    "table": "messages",
                    "record": { "id": "m1", "content": "hola" }
                },
                "ids": [1]
            },
            "ref": null
        }))
        .unwrap();
        assert_eq!(inserted_record(&frame), Some(json!({ "id": "m1", "content": "hola" })));

        let reply = PhoenixMessage {
            topic: "realtime:messages:1".into(),
            event: "phx_reply".into(),
            payload: json!({"status": "ok"}),
            reference: Some("1".into()),
        };
        assert_eq!(inserted_record(&reply), None);
    }

    #[test]
    fn dispatch_routes_to_topic_sender() {
        let topics: TopicMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        topics.lock().unwrap().insert("realtime:groups:3".into(), tx);
        let frame = PhoenixMessage {
            topic: "realtime:groups:3".into(),
            event: "postgres_changes".into(),
            payload: json!({"data": {"type": "INSERT", "record": {"id": "g9"}}}),
            reference: None,
        };
        RealtimeClient::dispatch(frame, &topics);
        assert_eq!(rx.try_recv().unwrap(), json!({"id": "g9"}));
    }

    #[tokio::test]
    async fn zero_heartbeat_still_beats() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("ws://{}/", listener.local_addr().unwrap())).unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame {
                    return (serde_json::from_str::<PhoenixMessage>(&text).unwrap(), ws);
                }
            }
            panic!("socket closed before any frame");
        });

        let client = RealtimeClient::connect(&url, Duration::ZERO).await.unwrap();
        let (frame, _ws) = tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert_eq!(frame.topic, "phoenix");
        assert_eq!(frame.event, "heartbeat");
        assert!(client.is_connected());
    }
}
