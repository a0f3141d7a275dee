use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// One place a bearer token may live. Sources are consulted in priority
/// order and the first hit wins.
pub trait TokenSource: Send + Sync {
    fn try_get(&self) -> Option<String>;

    /// The refresh token kept alongside the bearer token, if this source has one.
    fn try_get_refresh(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTokens {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Client-side persisted credentials (pure client mode).
pub trait TokenStore: TokenSource {
    fn save(&self, tokens: &StoredTokens) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

impl<S: TokenStore + ?Sized> TokenSource for Arc<S> {
    fn try_get(&self) -> Option<String> {
        (**self).try_get()
    }

    fn try_get_refresh(&self) -> Option<String> {
        (**self).try_get_refresh()
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StoredTokens {
        self.tokens.read().map(|t| t.clone()).unwrap_or_default()
    }
}

impl TokenSource for MemoryTokenStore {
    fn try_get(&self) -> Option<String> {
        self.snapshot().token
    }

    fn try_get_refresh(&self) -> Option<String> {
        self.snapshot().refresh_token
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, tokens: &StoredTokens) -> anyhow::Result<()> {
        let mut guard = self
            .tokens
            .write()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))?;
        *guard = tokens.clone();
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.save(&StoredTokens::default())
    }
}

/// Tokens persisted as a small JSON file, used by the command-line client.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/musicapp/credentials.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("musicapp").join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<StoredTokens> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("corrupt credentials file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredTokens::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl TokenSource for FileTokenStore {
    fn try_get(&self) -> Option<String> {
        self.load().ok()?.token
    }

    fn try_get_refresh(&self) -> Option<String> {
        self.load().ok()?.refresh_token
    }
}

impl TokenStore for FileTokenStore {
    /// Writes a private temp file next to the target and renames it into
    /// place, so readers never see a half-written file.
    fn save(&self, tokens: &StoredTokens) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file().set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(&serde_json::to_vec_pretty(tokens)?)?;
        file.as_file().sync_all()?;
        file.persist(&self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    tokens: StoredTokens,
    signed_out: bool,
}

/// Request-scoped mutable cell. A token obtained mid-request (from a refresh
/// or any response carrying one) lands here, so the next call made with the
/// same context uses it immediately. Clones share the cell.
#[derive(Debug, Clone, Default)]
pub struct TokenSlot {
    inner: Arc<RwLock<SlotState>>,
}

impl TokenSlot {
    pub fn set(&self, tokens: StoredTokens) {
        if let Ok(mut state) = self.inner.write() {
            state.tokens = tokens;
            state.signed_out = false;
        }
    }

    /// Empties the slot and marks the context as signed out, which also
    /// masks any lower-priority source.
    pub fn sign_out(&self) {
        if let Ok(mut state) = self.inner.write() {
            state.tokens = StoredTokens::default();
            state.signed_out = true;
        }
    }

    pub fn get(&self) -> StoredTokens {
        self.inner
            .read()
            .map(|s| s.tokens.clone())
            .unwrap_or_default()
    }

    pub fn is_signed_out(&self) -> bool {
        self.inner.read().map(|s| s.signed_out).unwrap_or(false)
    }
}

impl TokenSource for TokenSlot {
    fn try_get(&self) -> Option<String> {
        self.get().token
    }

    fn try_get_refresh(&self) -> Option<String> {
        self.get().refresh_token
    }
}

/// Tokens carried by the signed session cookie (server-rendered mode).
#[derive(Debug, Clone)]
pub struct ClaimTokens {
    pub token: String,
    pub refresh_token: String,
}

impl TokenSource for ClaimTokens {
    fn try_get(&self) -> Option<String> {
        Some(self.token.clone()).filter(|t| !t.is_empty())
    }

    fn try_get_refresh(&self) -> Option<String> {
        Some(self.refresh_token.clone()).filter(|t| !t.is_empty())
    }
}
