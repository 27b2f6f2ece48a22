use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    profile::{normalize_username, UserProfile},
    session::{
        AuthEvent, AuthUser, AuthUserRecord, ForgotPasswordRequest, ResetPasswordRequest, Session,
        SignInRequest, SignUpRequest,
    },
};
use crate::services::{database::DatabaseService, functions::FunctionsService};
use crate::utils::password::{hash_password, verify_password};

const INVALID_CREDENTIALS: &str = "Invalid login credentials";

/// Identity provider: accounts, sessions and auth-state notifications.
///
/// Sessions live in memory keyed by access token; every state change is
/// published on a broadcast channel.
#[derive(Clone)]
pub struct AuthService {
    db: DatabaseService,
    functions: FunctionsService,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    events: broadcast::Sender<AuthEvent>,
    session_ttl: Duration,
    site_url: String,
}

impl AuthService {
    pub fn new(db: DatabaseService, functions: FunctionsService, session_ttl_hours: i64, site_url: String) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            db,
            functions,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            events,
            session_ttl: Duration::hours(session_ttl_hours),
            site_url,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: AuthEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub async fn sign_up(&self, request: SignUpRequest) -> AppResult<AuthUser> {
        request.validate()?;

        let email = request.email.trim().to_lowercase();
        let username = normalize_username(&request.username);

        if !self.db.is_username_available(&username, None).await? {
            return Err(AppError::Conflict("Username is already taken".to_string()));
        }
        if self.db.get_auth_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("User already registered".to_string()));
        }

        let display_name = request.display_name.clone().unwrap_or_else(|| username.clone());
        let now = Utc::now();
        let record = AuthUserRecord {
            user_id: Uuid::new_v4().to_string(),
            email: email.clone(),
            password_hash: hash_password(&request.password)?,
            email_confirmed: false,
            confirmation_token: Some(Uuid::new_v4().simple().to_string()),
            recovery_token: None,
            user_metadata: serde_json::json!({
                "username": username,
                "display_name": display_name,
                "subscription_tier": "free",
            }),
            created_at: now,
            updated_at: now,
        };

        let profile = UserProfile::new(record.user_id.clone(), &username, Some(display_name.clone()));
        let record = self.create_account(&record, &profile).await?;

        log::info!("Signed up user {} ({})", record.user_id, username);

        self.functions.send_welcome_email(&email, &display_name).await;
        self.functions.sync_contact(&email, &display_name, &username).await;

        Ok(AuthUser::from(&record))
    }

    /// Write the auth record and its profile; the auth record is removed
    /// again when the profile cannot be created.
    async fn create_account(&self, record: &AuthUserRecord, profile: &UserProfile) -> AppResult<AuthUserRecord> {
        let record = self.db.create_auth_user(record).await?;

        if let Err(e) = self.db.create_profile(profile).await {
            // unique index lost a race with a concurrent sign-up
            log::error!("Failed to create profile for {}: {}", record.user_id, e);
            if let Err(e) = self.db.delete_auth_user(&record.user_id).await {
                log::error!("Failed to remove orphaned auth user {}: {}", record.user_id, e);
            }
            return Err(AppError::Conflict("Username is already taken".to_string()));
        }

        Ok(record)
    }

    pub async fn confirm_email(&self, token: &str) -> AppResult<AuthUser> {
        let mut record = self
            .db
            .get_auth_user_by_confirmation_token(token)
            .await?
            .ok_or_else(|| AppError::Auth("Confirmation link is invalid or has expired".to_string()))?;

        record.email_confirmed = true;
        record.confirmation_token = None;
        record.updated_at = Utc::now();
        let record = self.db.update_auth_user(&record).await?;

        log::info!("Confirmed email for user {}", record.user_id);
        Ok(AuthUser::from(&record))
    }

    pub async fn sign_in(&self, request: SignInRequest) -> AppResult<Session> {
        request.validate()?;

        let record = self
            .db
            .get_auth_user_by_email(&request.email.trim().to_lowercase())
            .await?
            .ok_or_else(|| AppError::Auth(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(&request.password, &record.password_hash) {
            return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
        }
        if !record.email_confirmed {
            return Err(AppError::Auth("Email not confirmed".to_string()));
        }

        let session = Session {
            access_token: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
            user: AuthUser::from(&record),
            expires_at: Utc::now() + self.session_ttl,
        };

        self.sessions
            .write()
            .await
            .insert(session.access_token.clone(), session.clone());

        self.publish(AuthEvent::SignedIn {
            user_id: record.user_id.clone(),
        });
        Ok(session)
    }

    /// Live session for `access_token`; expired sessions are dropped.
    pub async fn get_session(&self, access_token: &str) -> Option<Session> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(access_token) {
                Some(session) if !session.is_expired(now) => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let expired = self.sessions.write().await.remove(access_token);
        if let Some(session) = expired {
            log::info!("Session for user {} expired", session.user.id);
            self.publish(AuthEvent::SignedOut {
                user_id: session.user.id,
            });
        }
        None
    }

    /// Drop every expired session, publishing a sign-out for each.
    /// Returns the access tokens that were removed.
    pub async fn purge_expired_sessions(&self) -> Vec<String> {
        let now = Utc::now();
        let expired: Vec<Session> = {
            let mut sessions = self.sessions.write().await;
            let tokens: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| session.is_expired(now))
                .map(|(token, _)| token.clone())
                .collect();
            tokens.iter().filter_map(|token| sessions.remove(token)).collect()
        };

        for session in &expired {
            self.publish(AuthEvent::SignedOut {
                user_id: session.user.id.clone(),
            });
        }
        expired.into_iter().map(|s| s.access_token).collect()
    }

    pub async fn active_tokens(&self) -> HashSet<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn sign_out(&self, access_token: &str) -> AppResult<()> {
        let removed = self.sessions.write().await.remove(access_token);
        match removed {
            Some(session) => {
                self.publish(AuthEvent::SignedOut {
                    user_id: session.user.id,
                });
                Ok(())
            }
            None => Err(AppError::Auth("No active session".to_string())),
        }
    }

    /// Merge `patch`'s keys into the user's metadata.
    pub async fn update_user_metadata(&self, user_id: &str, patch: Value) -> AppResult<AuthUser> {
        let mut record = self
            .db
            .get_auth_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let mut metadata = match record.user_metadata.take() {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if let Value::Object(patch) = patch {
            metadata.extend(patch);
        }
        record.user_metadata = Value::Object(metadata);
        record.updated_at = Utc::now();

        let record = self
            .db
            .update_auth_user(&record)
            .await
            .map_err(|e| AppError::Data(e.to_string()))?;

        self.publish(AuthEvent::UserUpdated {
            user_id: record.user_id.clone(),
        });
        Ok(AuthUser::from(&record))
    }

    /// Reload the session's user and extend its expiry; the token is kept.
    pub async fn refresh_session(&self, access_token: &str) -> AppResult<Session> {
        let current = self
            .get_session(access_token)
            .await
            .ok_or_else(|| AppError::Auth("Session expired".to_string()))?;

        let record = self
            .db
            .get_auth_user(&current.user.id)
            .await?
            .ok_or_else(|| AppError::Auth("User no longer exists".to_string()))?;

        let refreshed = Session {
            access_token: current.access_token.clone(),
            user: AuthUser::from(&record),
            expires_at: Utc::now() + self.session_ttl,
        };

        self.sessions
            .write()
            .await
            .insert(refreshed.access_token.clone(), refreshed.clone());

        self.publish(AuthEvent::TokenRefreshed {
            user_id: record.user_id,
        });
        Ok(refreshed)
    }

    /// Always succeeds so callers cannot probe which e-mails exist.
    pub async fn forgot_password(&self, request: ForgotPasswordRequest) -> AppResult<()> {
        request.validate()?;
        let email = request.email.trim().to_lowercase();

        let Some(mut record) = self.db.get_auth_user_by_email(&email).await? else {
            log::info!("Password reset requested for unknown e-mail");
            return Ok(());
        };

        let token = Uuid::new_v4().simple().to_string();
        record.recovery_token = Some(token.clone());
        record.updated_at = Utc::now();
        self.db.update_auth_user(&record).await?;

        let reset_url = format!("{}/reset-password?token={}", self.site_url.trim_end_matches('/'), token);
        self.functions.send_password_reset(&email, &reset_url).await;

        self.publish(AuthEvent::PasswordRecovery { email });
        Ok(())
    }

    pub async fn reset_password(&self, request: ResetPasswordRequest) -> AppResult<()> {
        request.validate()?;

        let mut record = self
            .db
            .get_auth_user_by_recovery_token(&request.token)
            .await?
            .ok_or_else(|| AppError::Auth("Reset link is invalid or has expired".to_string()))?;

        record.password_hash = hash_password(&request.password)?;
        record.recovery_token = None;
        record.updated_at = Utc::now();
        self.db.update_auth_user(&record).await?;

        // existing sessions keep working until they expire or sign out
        log::info!("Password reset for user {}", record.user_id);
        Ok(())
    }
}

/// Log auth state changes until the channel closes.
pub async fn log_auth_events(mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => log::info!("Auth state changed: {:?}", event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Auth event listener lagged, skipped {} events", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::FunctionsConfig;

    pub(crate) async fn auth_service() -> AuthService {
        auth_service_on(DatabaseService::new("memory://").await.unwrap())
    }

    pub(crate) fn auth_service_on(db: DatabaseService) -> AuthService {
        AuthService::new(
            db,
            FunctionsService::new(FunctionsConfig::default()),
            24,
            "http://localhost:3000".to_string(),
        )
    }

    pub(crate) fn sign_up_request(email: &str, username: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            password: "long enough password".to_string(),
            username: username.to_string(),
            display_name: None,
        }
    }

    /// Sign up, confirm and sign in.
    pub(crate) async fn signed_in(auth: &AuthService, email: &str, username: &str) -> Session {
        auth.sign_up(sign_up_request(email, username)).await.unwrap();
        let record = auth.db.get_auth_user_by_email(email).await.unwrap().unwrap();
        auth.confirm_email(record.confirmation_token.as_deref().unwrap())
            .await
            .unwrap();
        auth.sign_in(SignInRequest {
            email: email.to_string(),
            password: "long enough password".to_string(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_sign_up_creates_free_profile() {
        let auth = auth_service().await;
        let user = auth.sign_up(sign_up_request("ada@example.com", "Ada")).await.unwrap();

        assert!(!user.email_confirmed);
        assert_eq!(user.user_metadata["username"], "ada");

        let profile = auth.db.get_profile(&user.id).await.unwrap().unwrap();
        assert_eq!(profile.username, "ada");
        assert_eq!(profile.display_name.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn test_taken_username_blocks_sign_up() {
        let auth = auth_service().await;
        auth.sign_up(sign_up_request("ada@example.com", "ada")).await.unwrap();

        let result = auth.sign_up(sign_up_request("other@example.com", "ADA")).await;
        match result {
            Err(AppError::Conflict(message)) => assert_eq!(message, "Username is already taken"),
            other => panic!("expected conflict, got {:?}", other.map(|u| u.id)),
        }
        assert!(auth.db.get_auth_user_by_email("other@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lost_username_race_leaves_no_auth_user() {
        let auth = auth_service().await;
        auth.db
            .create_profile(&UserProfile::new("someone-else".to_string(), "ada", None))
            .await
            .unwrap();

        let now = Utc::now();
        let record = AuthUserRecord {
            user_id: "late-user".to_string(),
            email: "late@example.com".to_string(),
            password_hash: hash_password("long enough password").unwrap(),
            email_confirmed: false,
            confirmation_token: None,
            recovery_token: None,
            user_metadata: serde_json::json!({ "username": "ada" }),
            created_at: now,
            updated_at: now,
        };
        let profile = UserProfile::new(record.user_id.clone(), "ada", None);

        let result = auth.create_account(&record, &profile).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(auth.db.get_auth_user("late-user").await.unwrap().is_none());

        // the e-mail is free to register again with another name
        auth.sign_up(sign_up_request("late@example.com", "grace")).await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_in_requires_confirmation_and_password() {
        let auth = auth_service().await;
        auth.sign_up(sign_up_request("ada@example.com", "ada")).await.unwrap();

        let unconfirmed = auth
            .sign_in(SignInRequest {
                email: "ada@example.com".to_string(),
                password: "long enough password".to_string(),
            })
            .await;
        assert!(matches!(unconfirmed, Err(AppError::Auth(_))));

        let record = auth.db.get_auth_user_by_email("ada@example.com").await.unwrap().unwrap();
        auth.confirm_email(record.confirmation_token.as_deref().unwrap())
            .await
            .unwrap();

        let wrong = auth
            .sign_in(SignInRequest {
                email: "ada@example.com".to_string(),
                password: "not the password".to_string(),
            })
            .await;
        assert!(matches!(wrong, Err(AppError::Auth(m)) if m == INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_session_lifecycle_publishes_events() {
        let auth = auth_service().await;
        let mut events = auth.subscribe();

        let session = signed_in(&auth, "ada@example.com", "ada").await;
        assert!(matches!(events.recv().await.unwrap(), AuthEvent::SignedIn { .. }));
        assert!(auth.get_session(&session.access_token).await.is_some());

        auth.update_user_metadata(&session.user.id, serde_json::json!({ "subscription_tier": "pro" }))
            .await
            .unwrap();
        assert!(matches!(events.recv().await.unwrap(), AuthEvent::UserUpdated { .. }));

        let refreshed = auth.refresh_session(&session.access_token).await.unwrap();
        assert_eq!(refreshed.access_token, session.access_token);
        assert_eq!(refreshed.user.user_metadata["subscription_tier"], "pro");
        assert_eq!(refreshed.user.user_metadata["username"], "ada");

        auth.sign_out(&session.access_token).await.unwrap();
        assert!(auth.get_session(&session.access_token).await.is_none());
        assert!(matches!(events.recv().await.unwrap(), AuthEvent::TokenRefreshed { .. }));
        assert!(matches!(events.recv().await.unwrap(), AuthEvent::SignedOut { .. }));
    }

    #[tokio::test]
    async fn test_purge_expired_sessions() {
        let auth = AuthService::new(
            DatabaseService::new("memory://").await.unwrap(),
            FunctionsService::new(FunctionsConfig::default()),
            0,
            "http://localhost:3000".to_string(),
        );
        let session = signed_in(&auth, "ada@example.com", "ada").await;
        let mut events = auth.subscribe();

        assert!(auth.active_tokens().await.contains(&session.access_token));
        let purged = auth.purge_expired_sessions().await;
        assert_eq!(purged, vec![session.access_token.clone()]);
        assert!(auth.active_tokens().await.is_empty());
        assert!(matches!(events.recv().await.unwrap(), AuthEvent::SignedOut { .. }));
        assert!(auth.purge_expired_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let auth = auth_service().await;
        signed_in(&auth, "ada@example.com", "ada").await;

        auth.forgot_password(ForgotPasswordRequest {
            email: "ADA@example.com".to_string(),
        })
        .await
        .unwrap();
        // unknown addresses look the same to the caller
        auth.forgot_password(ForgotPasswordRequest {
            email: "nobody@example.com".to_string(),
        })
        .await
        .unwrap();

        let record = auth.db.get_auth_user_by_email("ada@example.com").await.unwrap().unwrap();
        auth.reset_password(ResetPasswordRequest {
            token: record.recovery_token.unwrap(),
            password: "a brand new password".to_string(),
        })
        .await
        .unwrap();

        let session = auth
            .sign_in(SignInRequest {
                email: "ada@example.com".to_string(),
                password: "a brand new password".to_string(),
            })
            .await;
        assert!(session.is_ok());
    }
}
