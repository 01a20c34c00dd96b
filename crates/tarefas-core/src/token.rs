use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const TOKEN_FILE: &str = "auth_token";

/// Client-local key-value slot holding the bearer token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;

    fn save(&self, token: &str) -> Result<()>;

    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn save(&self, token: &str) -> Result<()> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) {
        *self.token.lock() = None;
    }
}

#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(TOKEN_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    #[tracing::instrument(skip(self, token))]
    fn save(&self, token: &str) -> Result<()> {
        debug!(file = %self.path.display(), "persisting auth token");
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut temp = NamedTempFile::new_in(dir)?;
        write!(temp, "{token}")?;
        temp.flush()?;
        temp.persist(&self.path).map_err(|err| {
            Error::Storage(format!("failed to persist {}: {}", self.path.display(), err))
        })?;
        Ok(())
    }

    fn clear(&self) {
        if !self.path.exists() {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(file = %self.path.display(), error = %err, "failed to remove auth token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_and_clears() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileTokenStore::new(temp.path());

        assert_eq!(store.load(), None);
        store.save("abc123").expect("save token");
        assert_eq!(store.load().as_deref(), Some("abc123"));

        store.clear();
        assert_eq!(store.load(), None);
        assert!(!store.path().exists());
    }
}
