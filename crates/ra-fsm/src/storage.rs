//! Durable FSM state
//!
//! One small JSON document per machine:
//!
//! ```json
//! { "State": "OnByMotion" }
//! ```
//!
//! Loading never fails: a missing file is created empty and the fallback is
//! returned, and unreadable or malformed content is logged and replaced by
//! the fallback. Storing writes a temporary sibling and renames it over the
//! target.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// On-disk record for one machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord<S> {
    #[serde(rename = "State")]
    pub state: S,
}

/// Directory holding `<key>_fsm.json` files
#[derive(Debug, Clone)]
pub struct FsmStorage {
    dir: PathBuf,
}

impl FsmStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Storage for a sub-directory, one per machine kind
    pub fn child(&self, name: &str) -> Self {
        Self::new(self.dir.join(name))
    }

    /// File path for the machine keyed by `key` (usually an entity id)
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}_fsm.json", key))
    }

    /// Loader and persister pair for [`StateMachine::with_storage`](crate::StateMachine::with_storage)
    pub fn bind<S>(
        &self,
        key: &str,
        fallback: S,
    ) -> (impl FnOnce() -> S, impl Fn(S) + Send + 'static)
    where
        S: Serialize + DeserializeOwned + Send + 'static,
    {
        let load_path = self.path_for(key);
        let store_path = load_path.clone();
        (
            move || load(&load_path, fallback),
            move |state: S| {
                if let Err(e) = store(&store_path, &state) {
                    error!(path = %store_path.display(), error = %e, "Failed to persist FSM state");
                }
            },
        )
    }
}

/// Read the persisted state at `path`, or `fallback`
///
/// A missing file is created empty (with its parent directory) and the
/// fallback is returned without being written.
pub fn load<S: DeserializeOwned>(path: &Path, fallback: S) -> S {
    if !path.exists() {
        if let Err(e) = create_empty(path) {
            warn!(path = %path.display(), error = %e, "Could not create FSM state file");
        } else {
            debug!(path = %path.display(), "Created empty FSM state file");
        }
        return fallback;
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read FSM state, using fallback");
            return fallback;
        }
    };

    if content.trim().is_empty() {
        debug!(path = %path.display(), "FSM state file is empty, using fallback");
        return fallback;
    }

    match serde_json::from_str::<PersistedRecord<S>>(&content) {
        Ok(record) => record.state,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed FSM state, using fallback");
            fallback
        }
    }
}

/// Write `{"State": state}` to `path`
pub fn store<S: Serialize>(path: &Path, state: &S) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let content = serde_json::to_string(&PersistedRecord { state })?;

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, content).map_err(|source| StorageError::Io {
        path: temp_path.clone(),
        source,
    })?;
    fs::rename(&temp_path, path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), "Stored FSM state");
    Ok(())
}

fn create_empty(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::File::create(path).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    enum Lamp {
        Off,
        OnByMotion,
    }

    #[test]
    fn test_missing_file_is_created_and_fallback_returned() {
        let dir = TempDir::new().unwrap();
        let storage = FsmStorage::new(dir.path().join("light"));
        let path = storage.path_for("light.desk");

        assert_eq!(load(&path, Lamp::Off), Lamp::Off);
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        // Still empty: the fallback is never persisted by load
        assert_eq!(load(&path, Lamp::OnByMotion), Lamp::OnByMotion);
    }

    #[test]
    fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let storage = FsmStorage::new(dir.path());
        let path = storage.path_for("light.desk");

        assert_ok!(store(&path, &Lamp::OnByMotion));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{"State":"OnByMotion"}"#
        );
        assert_eq!(load(&path, Lamp::Off), Lamp::OnByMotion);
        assert!(!dir.path().join("light.desk_fsm.json.tmp").exists());
    }

    #[test]
    fn test_malformed_content_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("light.desk_fsm.json");

        fs::write(&path, "{not json").unwrap();
        assert_eq!(load(&path, Lamp::Off), Lamp::Off);

        fs::write(&path, r#"{"State":"Dimmed"}"#).unwrap();
        assert_eq!(load(&path, Lamp::Off), Lamp::Off);

        fs::write(&path, r#"{"state":"OnByMotion"}"#).unwrap();
        assert_eq!(load(&path, Lamp::Off), Lamp::Off);
    }

    #[test]
    fn test_bind_pair() {
        let dir = TempDir::new().unwrap();
        let storage = FsmStorage::new(dir.path()).child("light");

        let (loader, persister) = storage.bind("light.desk", Lamp::Off);
        assert_eq!(loader(), Lamp::Off);
        persister(Lamp::OnByMotion);

        let (loader, _) = storage.bind("light.desk", Lamp::Off);
        assert_eq!(loader(), Lamp::OnByMotion);
        assert!(dir.path().join("light").join("light.desk_fsm.json").exists());
    }

    #[test]
    fn test_store_error_reports_path() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let err = store(&blocker.join("light.desk_fsm.json"), &Lamp::Off).unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
