use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use log::{info, warn};

use crate::client::services::backend::Backend;
use crate::client::services::chat_service::{ChatService, DEFAULT_ATTACHMENTS_BUCKET};
use crate::client::services::memory_backend::MemoryBackend;
use crate::client::services::realtime_client::MIN_HEARTBEAT;
use crate::client::services::supabase_backend::SupabaseBackend;
use crate::client::utils::identity_store::{
    FileStorage, IdentityStorage, IdentityStore, KeyringStorage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Supabase,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    File,
    Keyring,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend: BackendKind,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub schema: String,
    pub attachments_bucket: String,
    pub identity: IdentityKind,
    pub identity_path: PathBuf,
    pub keyring_fallback: bool,
    pub heartbeat: Duration,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            supabase_url: None,
            supabase_anon_key: None,
            schema: "public".to_string(),
            attachments_bucket: DEFAULT_ATTACHMENTS_BUCKET.to_string(),
            identity: IdentityKind::File,
            identity_path: PathBuf::from("data/display_name.txt"),
            keyring_fallback: false,
            heartbeat: Duration::from_secs(25),
            log_level: "info".to_string(),
        }
    }
}

fn heartbeat_period(secs: u64) -> Duration {
    let period = Duration::from_secs(secs);
    if period < MIN_HEARTBEAT {
        warn!("[REALTIME] CHARLA_HEARTBEAT_SECS={} too short, using {}s", secs, MIN_HEARTBEAT.as_secs());
        return MIN_HEARTBEAT;
    }
    period
}

impl ClientConfig {
    /// Reads the client settings from the environment (and `.env` when present).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let supabase_url = get("SUPABASE_URL").filter(|v| !v.trim().is_empty());
        let backend = match get("CHARLA_BACKEND").map(|v| v.to_lowercase()).as_deref() {
            Some("memory") => BackendKind::Memory,
            Some("supabase") => BackendKind::Supabase,
            _ if supabase_url.is_some() => BackendKind::Supabase,
            _ => BackendKind::Memory,
        };
        Self {
            backend,
            supabase_url,
            supabase_anon_key: get("SUPABASE_ANON_KEY").filter(|v| !v.trim().is_empty()),
            schema: get("SUPABASE_SCHEMA").unwrap_or(defaults.schema),
            attachments_bucket: get("CHARLA_ATTACHMENTS_BUCKET").unwrap_or(defaults.attachments_bucket),
            identity: match get("CHARLA_IDENTITY_STORE").as_deref() {
                Some("keyring") => IdentityKind::Keyring,
                _ => IdentityKind::File,
            },
            identity_path: get("CHARLA_IDENTITY_PATH").map(PathBuf::from).unwrap_or(defaults.identity_path),
            keyring_fallback: get("KEYRING_FALLBACK")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.keyring_fallback),
            heartbeat: get("CHARLA_HEARTBEAT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .map(heartbeat_period)
                .unwrap_or(defaults.heartbeat),
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn build_backend(&self) -> anyhow::Result<Arc<dyn Backend>> {
        match self.backend {
            BackendKind::Memory => {
                info!("[SYNC] Using in-memory backend");
                Ok(Arc::new(MemoryBackend::new()))
            }
            BackendKind::Supabase => {
                let (Some(url), Some(key)) = (&self.supabase_url, &self.supabase_anon_key) else {
                    bail!("SUPABASE_URL and SUPABASE_ANON_KEY must both be set for the supabase backend");
                };
                info!("[REST] Using backend at {}", url);
                let backend = SupabaseBackend::new(url, key, &self.schema, self.heartbeat)
                    .context("configuring supabase backend")?;
                Ok(Arc::new(backend))
            }
        }
    }

    pub fn build_service(&self) -> anyhow::Result<ChatService> {
        Ok(ChatService::new(self.build_backend()?).with_attachments_bucket(self.attachments_bucket.clone()))
    }

    pub fn build_identity(&self) -> IdentityStore {
        let file = FileStorage::new(&self.identity_path);
        let storage: Box<dyn IdentityStorage> = match self.identity {
            IdentityKind::File => Box::new(file),
            IdentityKind::Keyring => Box::new(KeyringStorage::new(self.keyring_fallback.then_some(file))),
        };
        IdentityStore::open(storage)
    }
}
