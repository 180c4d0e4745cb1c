use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use shelf_core::{CoreError, CoreResult, ErrorContext};
use tracing::warn;

use super::StorageArea;

/// Storage area persisted as a flat JSON object on disk
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename. An unreadable or corrupt file reads as empty.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

type Entries = BTreeMap<String, String>;

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Entries {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Entries::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read credential file");
                return Entries::new();
            }
        };

        serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", self.path.display()))
            .unwrap_or_else(|err| {
                warn!(error = %err, "ignoring corrupt credential file");
                Entries::new()
            })
    }

    fn save(&self, entries: &Entries) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))
                .map_err(CoreError::storage)?;
        }

        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("writing {}", tmp.display()))
            .map_err(CoreError::storage)?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))
            .map_err(CoreError::storage)
    }

    fn update(&self, f: impl FnOnce(&mut Entries) -> bool) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load();
        if !f(&mut entries) {
            return;
        }
        if let Err(err) = self.save(&entries) {
            warn!(error = %err, "failed to persist credential file");
        }
    }
}

impl StorageArea for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        });
    }

    fn remove(&self, key: &str) {
        self.update(|entries| entries.remove(key).is_some());
    }
}
