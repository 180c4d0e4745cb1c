//! Auth state container
//!
//! [`Session`] is the single source of truth for the signed-in user and their
//! tokens. State lives in a `watch` channel so reads are synchronous snapshots
//! and background tasks can react to changes; every transition persists the
//! affected keys to the [`CredentialStore`] while holding the channel's write
//! lock, so storage and memory never disagree between two calls.

use std::sync::Arc;
use std::time::Duration;

use shelf_core::{TokenPair, User};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::storage::{CredentialStore, StorageKey, Tier};

/// Snapshot of the current session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Access token expiry in epoch millis
    pub expires_at: Option<i64>,
    pub is_authenticated: bool,
    pub remember_me: bool,
}

impl SessionState {
    /// Whether the access token is inside the refresh buffer at `now_millis`
    pub fn needs_refresh(&self, now_millis: i64, buffer: Duration) -> bool {
        match (&self.refresh_token, self.expires_at) {
            (Some(_), Some(expires_at)) => now_millis >= expires_at - millis(buffer),
            _ => false,
        }
    }

    /// Time until the background refresh should fire, if one should be armed
    pub fn refresh_delay(&self, now_millis: i64, buffer: Duration) -> Option<Duration> {
        if !self.is_authenticated || self.refresh_token.is_none() {
            return None;
        }
        let expires_at = self.expires_at?;
        let remaining = expires_at - now_millis - millis(buffer);
        Some(Duration::from_millis(u64::try_from(remaining).unwrap_or(0)))
    }

    fn tier(&self) -> Tier {
        Tier::for_remember_me(self.remember_me)
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Shared handle to the auth state container
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: watch::Sender<SessionState>,
    store: CredentialStore,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Session")
            .field("is_authenticated", &state.is_authenticated)
            .field("remember_me", &state.remember_me)
            .field("expires_at", &state.expires_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session rehydrated from `store`
    pub fn new(store: CredentialStore, clock: Arc<dyn Clock>) -> Self {
        let initial = rehydrate(&store);
        if initial.is_authenticated {
            debug!(remember_me = initial.remember_me, "rehydrated session from storage");
        }
        let (state, _) = watch::channel(initial);
        Self {
            inner: Arc::new(SessionInner {
                state,
                store,
                clock,
            }),
        }
    }

    /// Create a session on the system clock
    pub fn with_store(store: CredentialStore) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }

    /// Unauthenticated session whose storage drops everything
    pub fn ephemeral() -> Self {
        Self::with_store(CredentialStore::headless())
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn now_millis(&self) -> i64 {
        self.inner.clock.now_millis()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.state.borrow().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.state.borrow().refresh_token.clone()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.inner.state.borrow().refresh_token.is_some()
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.inner.state.borrow().expires_at
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated
    }

    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    /// Establish a new session after login, registration or OAuth
    pub fn set_credentials(&self, user: User, tokens: TokenPair, remember_me: bool) {
        let now = self.now_millis();
        let store = &self.inner.store;
        self.inner.state.send_modify(|state| {
            for key in StorageKey::ALL {
                store.remove_from_both(key);
            }

            *state = SessionState {
                expires_at: Some(tokens.expires_at(now)),
                access_token: Some(tokens.access_token),
                refresh_token: Some(tokens.refresh_token),
                user: Some(user),
                is_authenticated: true,
                remember_me,
            };

            let tier = state.tier();
            persist_user(store, state.user.as_ref(), tier);
            persist_tokens(store, state, tier);
        });
        info!(remember_me, "session established");
    }

    /// Swap in a freshly issued token pair, keeping user and tier
    pub fn update_tokens(&self, tokens: TokenPair) {
        let now = self.now_millis();
        let store = &self.inner.store;
        self.inner.state.send_modify(|state| {
            state.expires_at = Some(tokens.expires_at(now));
            state.access_token = Some(tokens.access_token);
            state.refresh_token = Some(tokens.refresh_token);
            state.is_authenticated = true;
            persist_tokens(store, state, state.tier());
        });
        debug!("token pair rotated");
    }

    /// Swap in `tokens` only if the session still holds `expected_refresh`
    ///
    /// Returns `false` and leaves state and storage untouched when the
    /// session was logged out or replaced while the pair was being fetched.
    pub fn update_tokens_if(&self, expected_refresh: &str, tokens: TokenPair) -> bool {
        let now = self.now_millis();
        let store = &self.inner.store;
        let applied = self.inner.state.send_if_modified(|state| {
            if state.refresh_token.as_deref() != Some(expected_refresh) {
                return false;
            }
            state.expires_at = Some(tokens.expires_at(now));
            state.access_token = Some(tokens.access_token);
            state.refresh_token = Some(tokens.refresh_token);
            state.is_authenticated = true;
            persist_tokens(store, state, state.tier());
            true
        });
        if applied {
            debug!("token pair rotated");
        } else {
            debug!("discarding token pair for a session that has since changed");
        }
        applied
    }

    /// Replace only the access token
    ///
    /// No lifetime accompanies the token, so the expiry becomes unknown and
    /// the next refresh happens reactively.
    pub fn update_access_token(&self, access_token: impl Into<String>) {
        let access_token = access_token.into();
        let store = &self.inner.store;
        self.inner.state.send_modify(|state| {
            store.set(StorageKey::ACCESS_TOKEN, &access_token, state.tier());
            state.access_token = Some(access_token);
            state.expires_at = None;
            state.is_authenticated = true;
        });
        debug!("access token replaced");
    }

    pub fn set_user(&self, user: Option<User>) {
        let store = &self.inner.store;
        self.inner.state.send_modify(|state| {
            match &user {
                Some(_) => persist_user(store, user.as_ref(), state.tier()),
                None => store.remove_from_both(StorageKey::USER),
            }
            state.user = user;
        });
    }

    /// Flip the onboarding flag on the current user, if any
    pub fn set_onboarding_status(&self, completed: bool) {
        let store = &self.inner.store;
        let changed = self.inner.state.send_if_modified(|state| {
            let tier = state.tier();
            let Some(user) = state.user.as_mut() else {
                return false;
            };
            user.onboarding_completed = completed;
            persist_user(store, Some(&*user), tier);
            true
        });
        if !changed {
            debug!("onboarding status ignored: no user in session");
        }
    }

    /// Drop all session state and clear both storage tiers
    pub fn logout(&self) {
        let store = &self.inner.store;
        let was_active = self.inner.state.send_if_modified(|state| {
            for key in StorageKey::ALL {
                store.remove_from_both(key);
            }
            if *state == SessionState::default() {
                return false;
            }
            *state = SessionState::default();
            true
        });
        if was_active {
            info!("session cleared");
        }
    }
}

fn persist_user(store: &CredentialStore, user: Option<&User>, tier: Tier) {
    let Some(user) = user else {
        store.remove(StorageKey::USER, tier);
        return;
    };
    match serde_json::to_string(user) {
        Ok(encoded) => store.set(StorageKey::USER, &encoded, tier),
        Err(err) => warn!(error = %err, "failed to encode user for storage"),
    }
}

fn persist_tokens(store: &CredentialStore, state: &SessionState, tier: Tier) {
    for (key, value) in [
        (StorageKey::ACCESS_TOKEN, &state.access_token),
        (StorageKey::REFRESH_TOKEN, &state.refresh_token),
    ] {
        match value {
            Some(value) => store.set(key, value, tier),
            None => store.remove(key, tier),
        }
    }
}

fn rehydrate(store: &CredentialStore) -> SessionState {
    let access_token = store.find(StorageKey::ACCESS_TOKEN);
    let refresh_token = store.find(StorageKey::REFRESH_TOKEN);
    let user = store
        .find(StorageKey::USER)
        .and_then(|raw| match serde_json::from_str::<User>(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(error = %err, "discarding unreadable stored user");
                None
            }
        });
    let remember_me = [StorageKey::ACCESS_TOKEN, StorageKey::REFRESH_TOKEN]
        .into_iter()
        .any(|key| store.locate(key) == Some(Tier::Local));

    SessionState {
        is_authenticated: access_token.is_some(),
        user,
        access_token,
        refresh_token,
        expires_at: None,
        remember_me,
    }
}
