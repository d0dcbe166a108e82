use std::path::{Path, PathBuf};
use std::sync::Mutex;

use keyring::Entry;
use log::{info, warn};

const SERVICE: &str = "charla_app";
const USER: &str = "display_name";

/// Where the display name lives between sessions.
pub trait IdentityStorage: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, name: &str) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// Plain text file holding the name on a single line
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStorage for FileStorage {
    fn load(&self) -> Option<String> {
        let s = std::fs::read_to_string(&self.path).ok()?;
        let name = s.trim();
        if name.is_empty() { None } else { Some(name.to_string()) }
    }

    fn save(&self, name: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, name)?;
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// OS keyring, optionally falling back to a file when the keyring is unavailable
pub struct KeyringStorage {
    fallback: Option<FileStorage>,
}

impl KeyringStorage {
    pub fn new(fallback: Option<FileStorage>) -> Self {
        Self { fallback }
    }

    fn entry() -> Entry {
        Entry::new(SERVICE, USER)
    }
}

impl IdentityStorage for KeyringStorage {
    fn load(&self) -> Option<String> {
        match Self::entry().get_password() {
            Ok(name) if !name.trim().is_empty() => Some(name.trim().to_string()),
            Ok(_) => None,
            Err(_e) => self.fallback.as_ref().and_then(|f| f.load()),
        }
    }

    fn save(&self, name: &str) -> anyhow::Result<()> {
        match Self::entry().set_password(name) {
            Ok(()) => Ok(()),
            Err(e) => match &self.fallback {
                Some(file) => {
                    warn!("[IDENTITY] Keyring unavailable ({}), persisting to {}", e, file.path().display());
                    file.save(name)
                }
                None => Err(anyhow::anyhow!("keyring unavailable and file fallback disabled")),
            },
        }
    }

    fn clear(&self) -> anyhow::Result<()> {
        let _ = Self::entry().delete_password();
        if let Some(file) = &self.fallback {
            file.clear()?;
        }
        Ok(())
    }
}

/// Non-persistent storage for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStorage {
    name: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn with_name(name: &str) -> Self {
        Self { name: Mutex::new(Some(name.to_string())) }
    }
}

impl IdentityStorage for MemoryStorage {
    fn load(&self) -> Option<String> {
        self.name.lock().ok().and_then(|n| n.clone())
    }

    fn save(&self, name: &str) -> anyhow::Result<()> {
        let mut guard = self.name.lock().map_err(|_| anyhow::anyhow!("identity lock poisoned"))?;
        *guard = Some(name.to_string());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut guard = self.name.lock().map_err(|_| anyhow::anyhow!("identity lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

/// The locally chosen display name. No validation beyond "not blank".
pub struct IdentityStore {
    storage: Box<dyn IdentityStorage>,
    name: Option<String>,
}

impl IdentityStore {
    /// Reads the stored name, if any.
    pub fn open(storage: Box<dyn IdentityStorage>) -> Self {
        let name = storage.load();
        match &name {
            Some(n) => info!("[IDENTITY] Loaded display name '{}'", n),
            None => info!("[IDENTITY] No display name stored yet"),
        }
        Self { storage, name }
    }

    pub fn ephemeral() -> Self {
        Self::open(Box::new(MemoryStorage::default()))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_set(&self) -> bool {
        self.name.is_some()
    }

    /// Trims and stores `name`. Blank input is a no-op returning `Ok(false)`.
    ///
    /// A storage failure is returned, but the name is still used for this session.
    pub fn set_name(&mut self, name: &str) -> anyhow::Result<bool> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }
        self.name = Some(trimmed.to_string());
        self.storage.save(trimmed)?;
        info!("[IDENTITY] Display name set to '{}'", trimmed);
        Ok(true)
    }

    pub fn forget(&mut self) -> anyhow::Result<()> {
        self.name = None;
        self.storage.clear()
    }
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore").field("name", &self.name).finish()
    }
}
