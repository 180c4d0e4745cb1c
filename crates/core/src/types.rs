use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated user profile as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub onboarding_completed: bool,
}

fn default_role() -> String {
    "user".to_string()
}

impl User {
    /// Name to show in listings, falling back to the username
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            _ => self.username.clone(),
        }
    }
}

/// Access/refresh token pair issued by `/auth/*` endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds, relative to issuance
    pub expires_in: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenPair {
    /// Absolute expiry in epoch millis for a pair issued at `issued_at_millis`
    pub fn expires_at(&self, issued_at_millis: i64) -> i64 {
        let lifetime = i64::try_from(self.expires_in).unwrap_or(i64::MAX / 1000);
        issued_at_millis.saturating_add(lifetime.saturating_mul(1000))
    }
}

/// Response body of login, register and Google sign-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    #[default]
    Pdf,
    Epub,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub format: BookFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donated_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f32>,
    #[serde(default)]
    pub ratings_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Query parameters for `GET /books`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

/// Paginated listing envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.limit) < self.total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub book_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub book_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub value: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub book_id: String,
    /// Percent read, 0.0 to 100.0
    pub percentage: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_pair_wire_format() {
        let pair: TokenPair = serde_json::from_value(json!({
            "accessToken": "a",
            "refreshToken": "r",
            "tokenType": "Bearer",
            "expiresIn": 900
        }))
        .unwrap();
        assert_eq!(pair.access_token, "a");
        assert_eq!(pair.expires_in, 900);
        assert_eq!(pair.expires_at(1_000), 901_000);
    }

    #[test]
    fn test_token_type_defaults_to_bearer() {
        let pair: TokenPair = serde_json::from_value(json!({
            "accessToken": "a",
            "refreshToken": "r",
            "expiresIn": 1
        }))
        .unwrap();
        assert_eq!(pair.token_type, "Bearer");
    }

    #[test]
    fn test_user_minimal_payload() {
        let user: User = serde_json::from_value(json!({
            "id": "u1",
            "email": "ada@uni.edu",
            "username": "ada"
        }))
        .unwrap();
        assert_eq!(user.role, "user");
        assert!(!user.onboarding_completed);
        assert!(user.interests.is_empty());
        assert_eq!(user.display_name(), "ada");
    }

    #[test]
    fn test_user_serializes_camel_case() {
        let user = User {
            id: "u1".into(),
            email: "ada@uni.edu".into(),
            username: "ada".into(),
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            avatar_url: None,
            school: None,
            department: None,
            interests: vec![],
            role: "user".into(),
            onboarding_completed: true,
        };
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["firstName"], "Ada");
        assert_eq!(value["onboardingCompleted"], true);
        assert!(value.get("avatarUrl").is_none());
        assert_eq!(user.display_name(), "Ada Lovelace");
    }

    #[test]
    fn test_page_has_more() {
        let page = Page::<Book> {
            items: vec![],
            total: 45,
            page: 2,
            limit: 20,
        };
        assert!(page.has_more());

        let last = Page::<Book> { page: 3, ..page };
        assert!(!last.has_more());
    }

    #[test]
    fn test_book_query_skips_unset_fields() {
        let query = BookQuery {
            page: Some(1),
            ..Default::default()
        };
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value, json!({ "page": 1 }));
    }
}
