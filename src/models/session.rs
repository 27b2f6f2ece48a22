use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::profile::validate_username;

/// Identity record as stored in `auth_users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUserRecord {
    pub user_id: String,
    pub email: String,
    pub password_hash: String,
    pub email_confirmed: bool,
    pub confirmation_token: Option<String>,
    pub recovery_token: Option<String>,
    pub user_metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity as exposed to clients; never carries credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub email_confirmed: bool,
    pub user_metadata: serde_json::Value,
}

impl From<&AuthUserRecord> for AuthUser {
    fn from(record: &AuthUserRecord) -> Self {
        Self {
            id: record.user_id.clone(),
            email: record.email.clone(),
            email_confirmed: record.email_confirmed,
            user_metadata: record.user_metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user: AuthUser,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn { user_id: String },
    SignedOut { user_id: String },
    UserUpdated { user_id: String },
    TokenRefreshed { user_id: String },
    PasswordRecovery { email: String },
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(custom = "validate_username")]
    pub username: String,

    #[validate(length(min = 1, max = 50, message = "Display name must be between 1 and 50 characters"))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    pub token: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub user: AuthUser,
    /// Page the client shows next.
    pub redirect_to: String,
}
