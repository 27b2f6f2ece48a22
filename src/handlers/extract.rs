use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use std::future::Future;
use std::pin::Pin;

use crate::error::AppError;
use crate::models::session::Session;
use crate::services::auth::AuthService;

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

async fn resolve_session(req: &HttpRequest) -> Result<Option<Session>, AppError> {
    let auth = req
        .app_data::<web::Data<AuthService>>()
        .cloned()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("AuthService is not registered")))?;

    match bearer_token(req) {
        Some(token) => Ok(auth.get_session(&token).await),
        None => Ok(None),
    }
}

/// The caller's live session; rejects with 401 otherwise.
pub struct AuthenticatedUser(pub Session);

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            resolve_session(&req)
                .await?
                .map(AuthenticatedUser)
                .ok_or_else(|| AppError::Auth("Not signed in".to_string()))
        })
    }
}

/// The caller's session when there is one.
pub struct MaybeUser(pub Option<Session>);

impl FromRequest for MaybeUser {
    type Error = AppError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { resolve_session(&req).await.map(MaybeUser) })
    }
}
