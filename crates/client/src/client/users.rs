//! User profile client methods

use serde::{Deserialize, Serialize};
use shelf_core::User;

use super::{ApiRequest, ClientError, ShelfClient};

/// Partial profile update; unset fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

impl ShelfClient {
    /// Fetch the signed-in user and store the result in the session
    pub async fn me(&self) -> Result<User, ClientError> {
        let user: User = self.execute(ApiRequest::get("/users/me")).await?;
        self.session().set_user(Some(user.clone()));
        Ok(user)
    }

    pub async fn update_profile(&self, update: &UpdateProfileRequest) -> Result<User, ClientError> {
        let request = ApiRequest::patch("/users/me").json(update)?;
        let user: User = self.execute(request).await?;
        self.session().set_user(Some(user.clone()));
        Ok(user)
    }

    /// Submit onboarding answers and mark onboarding as done
    pub async fn complete_onboarding(&self, answers: &OnboardingRequest) -> Result<(), ClientError> {
        let request = ApiRequest::post("/users/me/onboarding").json(answers)?;
        self.execute_empty(request).await?;
        self.session().set_onboarding_status(true);
        Ok(())
    }
}
