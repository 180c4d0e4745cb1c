use web_sys::Storage;

use super::StorageArea;

#[derive(Debug, Clone, Copy)]
enum Area {
    Local,
    Session,
}

/// `window.localStorage` / `window.sessionStorage`
///
/// Resolves the storage object on every call; outside a window context every
/// operation is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct BrowserStorage {
    area: Area,
}

impl BrowserStorage {
    pub fn local() -> Self {
        Self { area: Area::Local }
    }

    pub fn session() -> Self {
        Self {
            area: Area::Session,
        }
    }

    fn storage(&self) -> Option<Storage> {
        let window = web_sys::window()?;
        match self.area {
            Area::Local => window.local_storage().ok().flatten(),
            Area::Session => window.session_storage().ok().flatten(),
        }
    }
}

impl StorageArea for BrowserStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.storage()?.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) {
        if let Some(storage) = self.storage() {
            if storage.set_item(key, value).is_err() {
                tracing::warn!(key, "browser storage rejected write");
            }
        }
    }

    fn remove(&self, key: &str) {
        if let Some(storage) = self.storage() {
            let _ = storage.remove_item(key);
        }
    }
}
