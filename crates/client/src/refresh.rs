//! Single-flight access token refresh
//!
//! All refresh paths (proactive before a request, reactive after a 401, and
//! the background scheduler) funnel through one [`RefreshGate`], so at most
//! one refresh call is in flight per session. Callers that find the gate held
//! wait for it to open and reuse whatever the winner stored in the session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shelf_core::TokenPair;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::client::ClientError;
use crate::session::Session;

/// Default lead time before expiry at which tokens are refreshed
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(60);

/// Default upper bound on a single refresh call
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Exchanges a refresh token for a new token pair
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError>;
}

/// Binary lock shared by every refresh path
#[derive(Debug, Clone, Default)]
pub struct RefreshGate {
    lock: Arc<Mutex<()>>,
}

/// Proof of holding the [`RefreshGate`]; released on drop
#[derive(Debug)]
pub struct RefreshGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    pub async fn acquire(&self) -> RefreshGuard {
        RefreshGuard {
            _guard: Arc::clone(&self.lock).lock_owned().await,
        }
    }

    pub fn try_acquire(&self) -> Option<RefreshGuard> {
        Arc::clone(&self.lock)
            .try_lock_owned()
            .ok()
            .map(|guard| RefreshGuard { _guard: guard })
    }

    /// Wait until no refresh is in flight
    pub async fn wait_for_unlock(&self) {
        drop(self.lock.lock().await);
    }
}

/// Result of a refresh attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A refresh call was made and the session now holds a new pair
    Refreshed,
    /// No call was needed; the session already holds usable tokens
    Skipped,
}

/// Mutex-guarded token refresher bound to one [`Session`]
#[derive(Clone)]
pub struct Refresher {
    session: Session,
    endpoint: Arc<dyn TokenEndpoint>,
    gate: RefreshGate,
    buffer: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher")
            .field("buffer", &self.buffer)
            .field("timeout", &self.timeout)
            .field("locked", &self.gate.is_locked())
            .finish_non_exhaustive()
    }
}

impl Refresher {
    pub fn new(session: Session, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            session,
            endpoint,
            gate: RefreshGate::new(),
            buffer: DEFAULT_REFRESH_BUFFER,
            timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    pub fn with_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn gate(&self) -> &RefreshGate {
        &self.gate
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    fn needs_refresh(&self) -> bool {
        self.session
            .snapshot()
            .needs_refresh(self.session.now_millis(), self.buffer)
    }

    /// Whether the session moved past `token` since the caller read it
    fn superseded(&self, token: Option<&str>) -> bool {
        token.is_some_and(|token| self.session.access_token().as_deref() != Some(token))
    }

    /// Proactive path, run before every authenticated request
    ///
    /// Waits out any in-flight refresh, then refreshes if the access token is
    /// inside the buffer window. The window is re-checked after taking the
    /// gate so queued callers do not repeat a refresh that just completed.
    pub async fn ensure_fresh(&self) -> Result<RefreshOutcome, ClientError> {
        self.gate.wait_for_unlock().await;
        if !self.needs_refresh() {
            return Ok(RefreshOutcome::Skipped);
        }

        let guard = self.gate.acquire().await;
        if !self.needs_refresh() {
            debug!("token refreshed while waiting for the gate");
            return Ok(RefreshOutcome::Skipped);
        }
        self.refresh_locked(&guard).await
    }

    /// Reactive path, run after a request carrying `rejected_token` got a 401
    ///
    /// `Ok` means the caller should retry once with the session's current
    /// token. `Err` means the session has been terminated.
    pub async fn recover(&self, rejected_token: Option<&str>) -> Result<RefreshOutcome, ClientError> {
        let Some(guard) = self.gate.try_acquire() else {
            debug!("refresh already in flight; waiting for it");
            self.gate.wait_for_unlock().await;
            return Ok(RefreshOutcome::Skipped);
        };

        if self.superseded(rejected_token) {
            debug!("rejected token already replaced; skipping refresh");
            return Ok(RefreshOutcome::Skipped);
        }
        self.refresh_locked(&guard).await
    }

    /// Refresh unless the session already moved past `seen_token`
    ///
    /// Passing `None` always refreshes once the gate is held.
    pub async fn refresh_now(&self, seen_token: Option<&str>) -> Result<RefreshOutcome, ClientError> {
        let guard = self.gate.acquire().await;
        if self.superseded(seen_token) {
            return Ok(RefreshOutcome::Skipped);
        }
        self.refresh_locked(&guard).await
    }

    /// Log out unless a new session replaced the one being refreshed
    fn end_session(&self, refresh_token: &str) {
        if self.session.refresh_token().as_deref() == Some(refresh_token) {
            self.session.logout();
        }
    }

    async fn refresh_locked(&self, _guard: &RefreshGuard) -> Result<RefreshOutcome, ClientError> {
        let Some(refresh_token) = self.session.refresh_token() else {
            self.session.logout();
            return Err(ClientError::RefreshFailed(
                "no refresh token in session".to_string(),
            ));
        };

        debug!("refreshing access token");
        match tokio::time::timeout(self.timeout, self.endpoint.refresh(&refresh_token)).await {
            Ok(Ok(tokens)) => {
                if !self.session.update_tokens_if(&refresh_token, tokens) {
                    return Err(ClientError::RefreshFailed(
                        "session ended while refreshing".to_string(),
                    ));
                }
                info!("access token refreshed");
                Ok(RefreshOutcome::Refreshed)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "token refresh failed; ending session");
                self.end_session(&refresh_token);
                Err(ClientError::RefreshFailed(err.to_string()))
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "token refresh timed out; ending session");
                self.end_session(&refresh_token);
                Err(ClientError::RefreshTimeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::storage::CredentialStore;
    use shelf_core::User;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEndpoint {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl TokenEndpoint for CountingEndpoint {
        async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ClientError::AuthenticationFailed(format!(
                    "{refresh_token} revoked"
                )));
            }
            Ok(TokenPair {
                access_token: format!("access-{n}"),
                refresh_token: format!("refresh-{n}"),
                token_type: "Bearer".to_string(),
                expires_in: 900,
            })
        }
    }

    fn user() -> User {
        serde_json::from_value(serde_json::json!({
            "id": "u1",
            "email": "ada@uni.edu",
            "username": "ada"
        }))
        .unwrap()
    }

    fn signed_in(expires_in: u64) -> (Session, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let session = Session::new(CredentialStore::in_memory(), clock.clone());
        session.set_credentials(
            user(),
            TokenPair {
                access_token: "access-0".into(),
                refresh_token: "refresh-0".into(),
                token_type: "Bearer".into(),
                expires_in,
            },
            false,
        );
        (session, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_proactive_refresh_is_single_flight() {
        let (session, _) = signed_in(30);
        let endpoint = Arc::new(CountingEndpoint {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let refresher = Refresher::new(session.clone(), endpoint.clone());

        let results =
            futures::future::join_all((0..8).map(|_| refresher.ensure_fresh())).await;

        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
        let refreshed = results
            .iter()
            .filter(|r| matches!(r, Ok(RefreshOutcome::Refreshed)))
            .count();
        assert_eq!(refreshed, 1);
        assert_eq!(session.access_token().as_deref(), Some("access-1"));
    }

    #[tokio::test]
    async fn test_ensure_fresh_outside_buffer_does_nothing() {
        let (session, _) = signed_in(3_600);
        let endpoint = Arc::new(CountingEndpoint::default());
        let refresher = Refresher::new(session, endpoint.clone());

        assert_eq!(
            refresher.ensure_fresh().await.unwrap(),
            RefreshOutcome::Skipped
        );
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ensure_fresh_inside_buffer_refreshes() {
        let (session, clock) = signed_in(3_600);
        let endpoint = Arc::new(CountingEndpoint::default());
        let refresher = Refresher::new(session.clone(), endpoint.clone());

        clock.advance(Duration::from_secs(3_600 - 59));
        assert_eq!(
            refresher.ensure_fresh().await.unwrap(),
            RefreshOutcome::Refreshed
        );
        assert_eq!(
            session.expires_at(),
            Some(clock.now_millis() + 900_000)
        );
    }

    #[tokio::test]
    async fn test_recover_skips_when_token_already_rotated() {
        let (session, _) = signed_in(900);
        let endpoint = Arc::new(CountingEndpoint::default());
        let refresher = Refresher::new(session, endpoint.clone());

        let outcome = refresher.recover(Some("stale-token")).await.unwrap();

        assert_eq!(outcome, RefreshOutcome::Skipped);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_waits_for_holder_instead_of_refreshing() {
        let (session, _) = signed_in(900);
        let endpoint = Arc::new(CountingEndpoint::default());
        let refresher = Refresher::new(session, endpoint.clone());

        let guard = refresher.gate().acquire().await;
        assert!(refresher.gate().is_locked());

        let (outcome, ()) = tokio::join!(refresher.recover(Some("access-0")), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(guard);
        });

        assert_eq!(outcome.unwrap(), RefreshOutcome::Skipped);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_refresh_logs_out() {
        let (session, _) = signed_in(900);
        let endpoint = Arc::new(CountingEndpoint {
            fail: true,
            ..Default::default()
        });
        let refresher = Refresher::new(session.clone(), endpoint);

        let err = refresher.recover(Some("access-0")).await.unwrap_err();

        assert!(matches!(err, ClientError::RefreshFailed(_)));
        assert!(!session.is_authenticated());
        assert!(session.refresh_token().is_none());
        assert!(!refresher.gate().is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_refresh_times_out_and_releases_gate() {
        let (session, _) = signed_in(900);
        let endpoint = Arc::new(CountingEndpoint {
            hang: true,
            ..Default::default()
        });
        let refresher =
            Refresher::new(session.clone(), endpoint).with_timeout(Duration::from_secs(5));

        let err = refresher.refresh_now(None).await.unwrap_err();

        assert!(matches!(err, ClientError::RefreshTimeout(_)));
        assert!(!session.is_authenticated());
        assert!(!refresher.gate().is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_during_refresh_stays_logged_out() {
        let (session, _) = signed_in(900);
        let endpoint = Arc::new(CountingEndpoint {
            delay: Duration::from_millis(100),
            ..Default::default()
        });
        let refresher = Refresher::new(session.clone(), endpoint.clone());

        let (result, ()) = tokio::join!(refresher.refresh_now(None), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.logout();
        });

        assert!(matches!(result, Err(ClientError::RefreshFailed(_))));
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
        assert!(!session.is_authenticated());
        assert!(session.access_token().is_none());
        assert!(session.store().find(crate::storage::StorageKey::REFRESH_TOKEN).is_none());
        assert!(!refresher.gate().is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relogin_during_refresh_keeps_new_session() {
        let (session, _) = signed_in(900);
        let endpoint = Arc::new(CountingEndpoint {
            delay: Duration::from_millis(100),
            ..Default::default()
        });
        let refresher = Refresher::new(session.clone(), endpoint);

        let (result, ()) = tokio::join!(refresher.refresh_now(None), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.set_credentials(
                user(),
                TokenPair {
                    access_token: "access-new".into(),
                    refresh_token: "refresh-new".into(),
                    token_type: "Bearer".into(),
                    expires_in: 900,
                },
                true,
            );
        });

        assert!(result.is_err());
        assert!(session.is_authenticated());
        assert_eq!(session.access_token().as_deref(), Some("access-new"));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails() {
        let session = Session::new(
            CredentialStore::in_memory(),
            Arc::new(ManualClock::new(0)),
        );
        let refresher = Refresher::new(session, Arc::new(CountingEndpoint::default()));

        let err = refresher.refresh_now(None).await.unwrap_err();
        assert!(matches!(err, ClientError::RefreshFailed(_)));
    }
}
