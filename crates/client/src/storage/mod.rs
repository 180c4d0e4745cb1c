//! Credential persistence over two durability tiers
//!
//! The local tier survives restarts, the session tier lives as long as the
//! process (or browser tab). Backends never fail loudly: a storage area that
//! cannot be read behaves as empty and failed writes are logged and dropped,
//! so the session layer can run in headless contexts without special cases.

mod file;
mod memory;

#[cfg(target_arch = "wasm32")]
mod browser;

use std::path::Path;
use std::sync::Arc;

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserStorage;
pub use file::FileStorage;
pub use memory::{MemoryStorage, NoopStorage};

/// Keys persisted by the session layer
pub struct StorageKey;

impl StorageKey {
    pub const USER: &'static str = "user";
    pub const ACCESS_TOKEN: &'static str = "accessToken";
    pub const REFRESH_TOKEN: &'static str = "refreshToken";

    /// Every credential key, in the order they are written
    pub const ALL: [&'static str; 3] = [Self::USER, Self::ACCESS_TOKEN, Self::REFRESH_TOKEN];
}

/// A single key-value storage area
#[cfg_attr(test, mockall::automock)]
pub trait StorageArea: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Storage durability tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Survives restarts
    Local,
    /// Cleared when the session ends
    Session,
}

impl Tier {
    /// Tier selected by the "remember me" flag
    pub fn for_remember_me(remember_me: bool) -> Self {
        if remember_me { Tier::Local } else { Tier::Session }
    }
}

/// Two-tier credential store
#[derive(Clone)]
pub struct CredentialStore {
    local: Arc<dyn StorageArea>,
    session: Arc<dyn StorageArea>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore {
    pub fn new(local: Arc<dyn StorageArea>, session: Arc<dyn StorageArea>) -> Self {
        Self { local, session }
    }

    /// Both tiers in memory; nothing outlives the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()))
    }

    /// Store that silently drops everything
    pub fn headless() -> Self {
        Self::new(Arc::new(NoopStorage), Arc::new(NoopStorage))
    }

    /// Local tier backed by `credentials.json` under `dir`, session tier in memory
    pub fn persistent(dir: impl AsRef<Path>) -> Self {
        let file = FileStorage::new(dir.as_ref().join("credentials.json"));
        Self::new(Arc::new(file), Arc::new(MemoryStorage::new()))
    }

    /// `localStorage` and `sessionStorage` of the current window
    #[cfg(target_arch = "wasm32")]
    pub fn browser() -> Self {
        Self::new(
            Arc::new(BrowserStorage::local()),
            Arc::new(BrowserStorage::session()),
        )
    }

    fn area(&self, tier: Tier) -> &dyn StorageArea {
        match tier {
            Tier::Local => self.local.as_ref(),
            Tier::Session => self.session.as_ref(),
        }
    }

    pub fn get(&self, key: &str, tier: Tier) -> Option<String> {
        self.area(tier).get(key)
    }

    pub fn set(&self, key: &str, value: &str, tier: Tier) {
        self.area(tier).set(key, value);
    }

    pub fn remove(&self, key: &str, tier: Tier) {
        self.area(tier).remove(key);
    }

    /// Read from the local tier, falling back to the session tier
    pub fn find(&self, key: &str) -> Option<String> {
        self.local.get(key).or_else(|| self.session.get(key))
    }

    /// Tier currently holding `key`, local first
    pub fn locate(&self, key: &str) -> Option<Tier> {
        if self.local.get(key).is_some() {
            Some(Tier::Local)
        } else if self.session.get(key).is_some() {
            Some(Tier::Session)
        } else {
            None
        }
    }

    /// Clear `key` from both tiers unconditionally
    pub fn remove_from_both(&self, key: &str) {
        self.local.remove(key);
        self.session.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_prefers_local_tier() {
        let store = CredentialStore::in_memory();
        store.set(StorageKey::ACCESS_TOKEN, "from-session", Tier::Session);
        store.set(StorageKey::ACCESS_TOKEN, "from-local", Tier::Local);

        assert_eq!(
            store.find(StorageKey::ACCESS_TOKEN).as_deref(),
            Some("from-local")
        );
        assert_eq!(store.locate(StorageKey::ACCESS_TOKEN), Some(Tier::Local));
    }

    #[test]
    fn test_find_falls_back_to_session_tier() {
        let store = CredentialStore::in_memory();
        store.set(StorageKey::REFRESH_TOKEN, "r1", Tier::Session);

        assert_eq!(store.find(StorageKey::REFRESH_TOKEN).as_deref(), Some("r1"));
        assert_eq!(store.get(StorageKey::REFRESH_TOKEN, Tier::Local), None);
        assert_eq!(store.locate(StorageKey::REFRESH_TOKEN), Some(Tier::Session));
    }

    #[test]
    fn test_remove_only_touches_one_tier() {
        let store = CredentialStore::in_memory();
        store.set(StorageKey::USER, "{}", Tier::Local);
        store.set(StorageKey::USER, "{}", Tier::Session);

        store.remove(StorageKey::USER, Tier::Local);

        assert_eq!(store.get(StorageKey::USER, Tier::Local), None);
        assert!(store.get(StorageKey::USER, Tier::Session).is_some());
    }

    #[test]
    fn test_remove_from_both_hits_each_area() {
        let mut local = MockStorageArea::new();
        let mut session = MockStorageArea::new();
        local.expect_remove().times(3).return_const(());
        session.expect_remove().times(3).return_const(());

        let store = CredentialStore::new(Arc::new(local), Arc::new(session));
        for key in StorageKey::ALL {
            store.remove_from_both(key);
        }
    }

    #[test]
    fn test_find_consults_session_only_on_local_miss() {
        let mut local = MockStorageArea::new();
        let mut session = MockStorageArea::new();
        local
            .expect_get()
            .times(1)
            .returning(|_| Some("local".to_string()));
        session.expect_get().times(0);

        let store = CredentialStore::new(Arc::new(local), Arc::new(session));
        assert_eq!(store.find(StorageKey::USER).as_deref(), Some("local"));
    }

    #[test]
    fn test_headless_store_is_inert() {
        let store = CredentialStore::headless();
        store.set(StorageKey::ACCESS_TOKEN, "a", Tier::Local);
        assert_eq!(store.find(StorageKey::ACCESS_TOKEN), None);
        store.remove_from_both(StorageKey::ACCESS_TOKEN);
    }

    #[test]
    fn test_tier_for_remember_me() {
        assert_eq!(Tier::for_remember_me(true), Tier::Local);
        assert_eq!(Tier::for_remember_me(false), Tier::Session);
    }
}
