use actix_web::web::{Data, Json};
use actix_web::{get, post, HttpResponse};

use crate::error::AppResult;
use crate::handlers::extract::AuthenticatedUser;
use crate::models::{
    common::{ApiResponse, Toast},
    session::{
        ConfirmEmailRequest, ForgotPasswordRequest, ResetPasswordRequest, SignInRequest, SignUpRequest,
        SignUpResponse,
    },
};
use crate::services::{auth::AuthService, reconciliation::ReconciliationService};

const CHECK_EMAIL_PAGE: &str = "/check-email";

#[post("/signup")]
pub async fn sign_up(auth: Data<AuthService>, payload: Json<SignUpRequest>) -> AppResult<HttpResponse> {
    let user = auth.sign_up(payload.into_inner()).await?;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_toast(
        SignUpResponse {
            user,
            redirect_to: CHECK_EMAIL_PAGE.to_string(),
        },
        Toast::info("Check your e-mail", "We sent you a link to confirm your account."),
    )))
}

#[post("/confirm")]
pub async fn confirm_email(auth: Data<AuthService>, payload: Json<ConfirmEmailRequest>) -> AppResult<HttpResponse> {
    let user = auth.confirm_email(&payload.token).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(user)))
}

#[post("/signin")]
pub async fn sign_in(auth: Data<AuthService>, payload: Json<SignInRequest>) -> AppResult<HttpResponse> {
    let session = auth.sign_in(payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(session)))
}

#[post("/signout")]
pub async fn sign_out(
    auth: Data<AuthService>,
    reconciliation: Data<ReconciliationService>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    let AuthenticatedUser(session) = user;
    auth.sign_out(&session.access_token).await?;
    reconciliation.forget(&session.access_token).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "signed_out": true }))))
}

#[get("/session")]
pub async fn get_session(user: AuthenticatedUser) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(user.0)))
}

#[post("/refresh")]
pub async fn refresh_session(auth: Data<AuthService>, user: AuthenticatedUser) -> AppResult<HttpResponse> {
    let session = auth.refresh_session(&user.0.access_token).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(session)))
}

#[post("/forgot-password")]
pub async fn forgot_password(auth: Data<AuthService>, payload: Json<ForgotPasswordRequest>) -> AppResult<HttpResponse> {
    auth.forgot_password(payload.into_inner()).await?;

    Ok(HttpResponse::Accepted().json(ApiResponse::success_with_toast(
        serde_json::json!({ "requested": true }),
        Toast::info(
            "Check your e-mail",
            "If an account exists for that address, a reset link is on its way.",
        ),
    )))
}

#[post("/reset-password")]
pub async fn reset_password(auth: Data<AuthService>, payload: Json<ResetPasswordRequest>) -> AppResult<HttpResponse> {
    auth.reset_password(payload.into_inner()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_toast(
        serde_json::json!({ "reset": true }),
        Toast::info("Password updated", "You can now sign in with your new password."),
    )))
}
