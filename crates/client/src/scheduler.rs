//! Background token refresh
//!
//! Keeps the access token fresh while no requests are being made. The task
//! re-arms its timer whenever the session changes and is aborted when its
//! [`SchedulerHandle`] is dropped.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::refresh::Refresher;
use crate::session::SessionState;

/// Floor between two scheduled refreshes, for tokens issued already inside the buffer
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Owns the background refresh task
#[derive(Debug)]
pub struct SchedulerHandle {
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the scheduler, cancelling any armed timer
    pub fn shutdown(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns the background refresh loop
pub struct RefreshScheduler;

impl RefreshScheduler {
    /// Start refreshing `buffer` before each known expiry
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(refresher: Refresher) -> SchedulerHandle {
        let task = tokio::spawn(run(refresher));
        SchedulerHandle { task }
    }
}

fn next_delay(refresher: &Refresher, state: &SessionState) -> Option<Duration> {
    state.refresh_delay(refresher.session().now_millis(), refresher.buffer())
}

async fn run(refresher: Refresher) {
    let mut changes = refresher.session().subscribe();
    let mut just_refreshed = false;

    loop {
        let state = changes.borrow_and_update().clone();

        let Some(mut delay) = next_delay(&refresher, &state) else {
            debug!("no refresh scheduled");
            if changes.changed().await.is_err() {
                return;
            }
            just_refreshed = false;
            continue;
        };
        if just_refreshed && delay < MIN_REFRESH_INTERVAL {
            debug!(expires_at = ?state.expires_at, "issued token already inside refresh buffer");
            delay = MIN_REFRESH_INTERVAL;
        }

        debug!(delay_ms = delay.as_millis(), "refresh timer armed");
        tokio::select! {
            () = tokio::time::sleep(delay) => {
                let seen = state.access_token.as_deref();
                if let Err(err) = refresher.refresh_now(seen).await {
                    warn!(error = %err, "scheduled refresh failed");
                }
                just_refreshed = true;
                if !changes.has_changed().unwrap_or(false) && changes.changed().await.is_err() {
                    return;
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    return;
                }
                just_refreshed = false;
                debug!("session changed; re-arming refresh timer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::clock::ManualClock;
    use crate::refresh::TokenEndpoint;
    use crate::session::Session;
    use crate::storage::CredentialStore;
    use async_trait::async_trait;
    use shelf_core::{TokenPair, User};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Endpoint {
        calls: AtomicUsize,
        expires_in: u64,
    }

    #[async_trait]
    impl TokenEndpoint for Endpoint {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenPair {
                access_token: format!("access-{n}"),
                refresh_token: format!("refresh-{n}"),
                token_type: "Bearer".to_string(),
                expires_in: self.expires_in,
            })
        }
    }

    fn pair(expires_in: u64) -> TokenPair {
        TokenPair {
            access_token: "access-0".into(),
            refresh_token: "refresh-0".into(),
            token_type: "Bearer".into(),
            expires_in,
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

    fn setup() -> (Session, Arc<Endpoint>, Refresher) {
        setup_issuing(3_600)
    }

    fn setup_issuing(expires_in: u64) -> (Session, Arc<Endpoint>, Refresher) {
        let session = Session::new(
            CredentialStore::in_memory(),
            Arc::new(ManualClock::new(0)),
        );
        let endpoint = Arc::new(Endpoint {
            calls: AtomicUsize::new(0),
            expires_in,
        });
        let refresher = Refresher::new(session.clone(), endpoint.clone());
        (session, endpoint, refresher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_buffer_before_expiry() {
        let (session, endpoint, refresher) = setup();
        session.set_credentials(user(), pair(120), false);
        let _handle = RefreshScheduler::spawn(refresher);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.access_token().as_deref(), Some("access-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_while_signed_out() {
        let (_session, endpoint, refresher) = setup();
        let handle = RefreshScheduler::spawn(refresher);

        tokio::time::sleep(Duration::from_secs(3_600)).await;

        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearms_when_session_changes() {
        let (session, endpoint, refresher) = setup();
        session.set_credentials(user(), pair(120), false);
        let _handle = RefreshScheduler::spawn(refresher);

        tokio::time::sleep(Duration::from_secs(30)).await;
        session.logout();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_timer() {
        let (session, endpoint, refresher) = setup();
        session.set_credentials(user(), pair(90), false);
        let handle = RefreshScheduler::spawn(refresher);

        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_lived_tokens_do_not_spin() {
        let (session, endpoint, refresher) = setup_issuing(30);
        session.set_credentials(user(), pair(30), false);
        let _handle = RefreshScheduler::spawn(refresher);

        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 3);
        assert!(session.is_authenticated());
    }
}
