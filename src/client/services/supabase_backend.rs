use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Duration;
use url::Url;

use crate::client::services::backend::{Backend, Filter, Query, Row, Subscription, Table};
use crate::client::services::realtime_client::{self, RealtimeClient};
use crate::common::error::BackendError;

const CONNECT_ATTEMPTS: u32 = 5;

/// Hosted backend: PostgREST for reads/inserts, storage API for files,
/// realtime websocket for push channels.
pub struct SupabaseBackend {
    http: Client,
    base_url: Url,
    api_key: String,
    schema: String,
    heartbeat: Duration,
    realtime: Mutex<Option<Arc<RealtimeClient>>>,
}

impl SupabaseBackend {
    pub fn new(base_url: &str, api_key: &str, schema: &str, heartbeat: Duration) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url).map_err(|e| BackendError::Transport(format!("invalid url {}: {}", base_url, e)))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
            schema: schema.to_string(),
            heartbeat,
            realtime: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Transport(format!("invalid endpoint {}: {}", path, e)))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// Public URL of an object in a public bucket
    pub fn public_object_url(&self, bucket: &str, path: &str) -> Result<Url, BackendError> {
        self.endpoint(&format!("storage/v1/object/public/{}/{}", bucket, path))
    }

    async fn realtime(&self) -> Result<Arc<RealtimeClient>, BackendError> {
        let mut guard = self.realtime.lock().await;
        if let Some(client) = guard.as_ref() {
            if client.is_connected() {
                return Ok(client.clone());
            }
            warn!("[REALTIME] Socket lost, reconnecting");
        }
        let url = realtime_client::realtime_url(self.base_url.as_str(), &self.api_key)
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let client = RealtimeClient::connect_with_retry(&url, self.heartbeat, CONNECT_ATTEMPTS)
            .await
            .map(Arc::new)
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        *guard = Some(client.clone());
        Ok(client)
    }
}

/// Query-string pairs PostgREST expects for `query`
pub fn postgrest_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    if let Some(Filter { column, value }) = &query.filter {
        params.push((column.clone(), format!("eq.{}", value)));
    }
    if let Some(order) = &query.order {
        let dir = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

/// Text of a PostgREST / storage error body. Falls back to the raw body.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(v) => ["message", "msg", "error_description", "error"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}

async fn checked(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::Rejected { status: Some(status.as_u16()), message: error_message(&body) })
}

fn transport(e: reqwest::Error) -> BackendError {
    BackendError::Transport(e.to_string())
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn read(&self, table: Table, query: &Query) -> Result<Vec<Row>, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{}", table))?;
        debug!("[REST] GET {} {:?}", table, query.filter);
        let resp = self
            .authorized(self.http.get(url))
            .header("Accept-Profile", &self.schema)
            .query(&postgrest_params(query))
            .send()
            .await
            .map_err(transport)?;
        let resp = checked(resp).await?;
        resp.json::<Vec<Row>>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Row, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{}", table))?;
        debug!("[REST] POST {}", table);
        let resp = self
            .authorized(self.http.post(url))
            .header("Content-Profile", &self.schema)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(transport)?;
        let resp = checked(resp).await?;
        let mut rows = resp
            .json::<Vec<Row>>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        if rows.is_empty() {
            return Err(BackendError::rejected(format!("insert into {} returned no row", table)));
        }
        Ok(rows.swap_remove(0))
    }

    async fn subscribe(&self, table: Table, filter: Option<Filter>) -> Result<Subscription, BackendError> {
        let client = self.realtime().await?;
        client
            .join(&self.schema, table, filter, &self.api_key)
            .map_err(|e| BackendError::Transport(e.to_string()))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let url = self.endpoint(&format!("storage/v1/object/{}/{}", bucket, path))?;
        info!("[REST] Uploading {} bytes to {}/{}", bytes.len(), bucket, path);
        let resp = self
            .authorized(self.http.post(url))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        checked(resp).await?;
        Ok(self.public_object_url(bucket, path)?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::services::backend::Order;

    #[test]
    fn params_follow_postgrest_syntax() {
        let q = Query::by_creation().filtered(Filter::eq("group_id", "g1"));
        let params = postgrest_params(&q);
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("group_id".to_string(), "eq.g1".to_string()),
                ("order".to_string(), "created_at.asc".to_string()),
            ]
        );

        let q = Query { filter: None, order: Some(Order { column: "created_at".into(), ascending: false }), limit: Some(1) };
        let params = postgrest_params(&q);
        assert!(params.contains(&("order".to_string(), "created_at.desc".to_string())));
        assert!(params.contains(&("limit".to_string(), "1".to_string())));
    }

    #[test]
    fn error_message_prefers_message_field() {
        let body = r#"{"code":"PGRST204","details":null,"hint":null,"message":"Could not find the 'reply_to' column of 'messages' in the schema cache"}"#;
        assert_eq!(
            error_message(body),
            "Could not find the 'reply_to' column of 'messages' in the schema cache"
        );
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn public_url_points_at_public_bucket() {
        let backend = SupabaseBackend::new("https://abc.supabase.co", "anon", "public", Duration::from_secs(25)).unwrap();
        assert_eq!(
            backend.public_object_url("chat-images", "g1/x.png").unwrap().as_str(),
            "https://abc.supabase.co/storage/v1/object/public/chat-images/g1/x.png"
        );
    }
}
