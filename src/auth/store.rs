use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::runtime::Runtime;

pub const ACCESS_TOKEN_KEY: &str = "kinetic_access_token";
pub const REFRESH_TOKEN_KEY: &str = "kinetic_refresh_token";

/// The stored credential pair. Either half may be absent; both absent means
/// logged out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    #[serde(
        rename = "kinetic_access_token",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<String>,
    #[serde(
        rename = "kinetic_refresh_token",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<String>,
}

impl Tokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Last-write-wins cell holding the token pair.
#[cfg_attr(test, mockall::automock)]
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Tokens;
    fn set(&self, access_token: &str, refresh_token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Tokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: Tokens) -> Self {
        Self {
            tokens: RwLock::new(tokens),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Tokens {
        self.tokens
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        let mut tokens = self
            .tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *tokens = Tokens::new(access_token, refresh_token);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut tokens = self
            .tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *tokens = Tokens::default();
        Ok(())
    }
}

/// Stores the token pair as a small JSON object keyed by
/// [`ACCESS_TOKEN_KEY`] and [`REFRESH_TOKEN_KEY`].
pub struct FileTokenStore<R: Runtime> {
    runtime: R,
    path: PathBuf,
}

impl<R: Runtime> FileTokenStore<R> {
    pub fn new(runtime: R, path: PathBuf) -> Self {
        Self { runtime, path }
    }

    /// Uses `<config_dir>/kinetic/tokens.json`.
    pub fn at_default_location(runtime: R) -> Result<Self> {
        let path = default_token_path(&runtime)?;
        Ok(Self::new(runtime, path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Tokens> {
        if !self.runtime.exists(&self.path) {
            return Ok(Tokens::default());
        }
        let content = self
            .runtime
            .read_to_string(&self.path)
            .with_context(|| format!("Failed to read token file {:?}", self.path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse token file {:?}", self.path))
    }

    fn save(&self, tokens: &Tokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !self.runtime.exists(parent) {
                self.runtime.create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(tokens)?;
        let tmp_path = self.path.with_extension("json.tmp");
        self.runtime.write(&tmp_path, json.as_bytes())?;
        self.runtime.set_permissions(&tmp_path, 0o600)?;
        self.runtime.rename(&tmp_path, &self.path)?;
        debug!("Saved tokens to {:?}", self.path);
        Ok(())
    }
}

impl<R: Runtime> TokenStore for FileTokenStore<R> {
    fn get(&self) -> Tokens {
        match self.load() {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Ignoring unreadable token file: {:#}", e);
                Tokens::default()
            }
        }
    }

    #[tracing::instrument(skip(self, access_token, refresh_token))]
    fn set(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        self.save(&Tokens::new(access_token, refresh_token))
    }

    #[tracing::instrument(skip(self))]
    fn clear(&self) -> Result<()> {
        if self.runtime.exists(&self.path) {
            self.runtime
                .remove_file(&self.path)
                .with_context(|| format!("Failed to remove token file {:?}", self.path))?;
            debug!("Removed token file {:?}", self.path);
        }
        Ok(())
    }
}

pub fn default_token_path<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let config_dir = runtime
        .config_dir()
        .context("Could not determine the configuration directory")?;
    Ok(config_dir.join("kinetic").join("tokens.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::{always, eq};
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryTokenStore::new();
        assert!(store.get().is_empty());

        store.set("access", "refresh").unwrap();
        assert_eq!(store.get(), Tokens::new("access", "refresh"));

        store.clear().unwrap();
        assert!(store.get().is_empty());
    }

    #[test]
    fn test_memory_store_last_write_wins() {
        let store = MemoryTokenStore::with_tokens(Tokens::new("a1", "r1"));
        store.set("a2", "r2").unwrap();
        store.set("a3", "r2").unwrap();
        assert_eq!(store.get().access_token.as_deref(), Some("a3"));
    }

    #[test]
    fn test_file_store_missing_file_is_logged_out() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(RealRuntime, dir.path().join("tokens.json"));
        assert!(store.get().is_empty());
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_persists_under_fixed_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/tokens.json");
        let store = FileTokenStore::new(RealRuntime, path.clone());

        store.set("access", "refresh").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[ACCESS_TOKEN_KEY], "access");
        assert_eq!(raw[REFRESH_TOKEN_KEY], "refresh");

        let reopened = FileTokenStore::new(RealRuntime, path.clone());
        assert_eq!(reopened.get(), Tokens::new("access", "refresh"));

        reopened.clear().unwrap();
        assert!(!path.exists());
        assert!(store.get().is_empty());
    }

    #[test]
    fn test_file_store_corrupt_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileTokenStore::new(RealRuntime, path);
        assert!(store.get().is_empty());
    }

    #[test]
    fn test_file_store_accepts_partial_pair() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"{"kinetic_refresh_token": "r"}"#).unwrap();

        let store = FileTokenStore::new(RealRuntime, path);
        let tokens = store.get();
        assert_eq!(tokens.access_token, None);
        assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn test_file_store_writes_through_temp_file() {
        let path = PathBuf::from("/home/user/.config/kinetic/tokens.json");
        let tmp = PathBuf::from("/home/user/.config/kinetic/tokens.json.tmp");

        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_write()
            .with(eq(tmp.clone()), always())
            .times(1)
            .returning(|_, _| Ok(()));
        runtime
            .expect_set_permissions()
            .with(eq(tmp.clone()), eq(0o600))
            .times(1)
            .returning(|_, _| Ok(()));
        runtime
            .expect_rename()
            .with(eq(tmp), eq(path.clone()))
            .times(1)
            .returning(|_, _| Ok(()));

        let store = FileTokenStore::new(runtime, path);
        store.set("access", "refresh").unwrap();
    }

    #[test]
    fn test_default_token_path() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_config_dir()
            .returning(|| Some(PathBuf::from("/home/user/.config")));

        let path = default_token_path(&runtime).unwrap();
        assert_eq!(path, PathBuf::from("/home/user/.config/kinetic/tokens.json"));
    }

    #[test]
    fn test_default_token_path_without_config_dir() {
        let mut runtime = MockRuntime::new();
        runtime.expect_config_dir().returning(|| None);
        assert!(default_token_path(&runtime).is_err());
    }
}
