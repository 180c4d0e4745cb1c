//! Authentication API client methods

use serde::{Deserialize, Serialize};
use shelf_core::{AuthResponse, User};
use tracing::{info, warn};

use super::{ApiRequest, ClientError, ShelfClient, send};
use crate::refresh::RefreshOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleSignInRequest {
    /// ID token returned by Google Identity Services
    pub credential: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl ShelfClient {
    /// Sign in with email and password
    pub async fn login(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
        remember_me: bool,
    ) -> Result<User, ClientError> {
        let request = ApiRequest::post("/auth/login").public().json(&LoginRequest {
            email: email.into(),
            password: password.into(),
        })?;
        self.establish(request, remember_me).await
    }

    /// Create an account and sign in
    pub async fn register(
        &self,
        request: RegisterRequest,
        remember_me: bool,
    ) -> Result<User, ClientError> {
        let request = ApiRequest::post("/auth/register").public().json(&request)?;
        self.establish(request, remember_me).await
    }

    /// Exchange a Google ID token for a Shelf session
    pub async fn google_sign_in(
        &self,
        credential: impl Into<String>,
        remember_me: bool,
    ) -> Result<User, ClientError> {
        let request = ApiRequest::post("/auth/google")
            .public()
            .json(&GoogleSignInRequest {
                credential: credential.into(),
            })?;
        self.establish(request, remember_me).await
    }

    async fn establish(&self, request: ApiRequest, remember_me: bool) -> Result<User, ClientError> {
        let AuthResponse { user, tokens } = self.execute(request).await?;
        self.session()
            .set_credentials(user.clone(), tokens, remember_me);
        info!(user_id = %user.id, "signed in");
        Ok(user)
    }

    /// Refresh the token pair now, sharing any refresh already in flight
    pub async fn refresh(&self) -> Result<RefreshOutcome, ClientError> {
        let seen = self.session().access_token();
        self.refresher().refresh_now(seen.as_deref()).await
    }

    /// Sign out locally, then tell the backend on a best-effort basis
    ///
    /// Local state is cleared before the server call goes out, so a slow or
    /// failing backend never leaves credentials behind.
    pub async fn logout(&self) {
        let session = self.session();
        let token = session.access_token();
        let refresh_token = session.refresh_token();

        session.logout();
        self.cache().clear();
        info!("signed out");

        if token.is_none() {
            return;
        }
        let outcome = match ApiRequest::post("/auth/logout").json(&LogoutRequest { refresh_token }) {
            Ok(request) => send(&self.inner.http, &self.inner.base_url, &request, token.as_deref())
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            warn!(error = %err, "server-side logout failed");
        }
    }
}
