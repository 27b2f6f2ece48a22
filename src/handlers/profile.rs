use actix_web::web::{Bytes, Data, Json, Path, Query};
use actix_web::{get, http::header, patch, post, HttpRequest, HttpResponse};
use chrono::Utc;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::handlers::extract::AuthenticatedUser;
use crate::models::{
    common::{ApiResponse, Toast},
    profile::{normalize_username, validate_username, UpdateProfileRequest, UsernameAvailability, UsernameQuery},
};
use crate::services::{
    auth::AuthService,
    database::DatabaseService,
    storage::{extension_for_content_type, StorageService},
};

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[get("/me")]
pub async fn get_my_profile(db: Data<DatabaseService>, user: AuthenticatedUser) -> AppResult<HttpResponse> {
    let profile = db
        .get_profile(&user.0.user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile".to_string()))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(profile)))
}

#[patch("/me")]
pub async fn update_my_profile(
    db: Data<DatabaseService>,
    auth: Data<AuthService>,
    user: AuthenticatedUser,
    payload: Json<UpdateProfileRequest>,
) -> AppResult<HttpResponse> {
    payload.validate()?;
    let user_id = &user.0.user.id;

    let mut profile = db
        .get_profile(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile".to_string()))?;

    if let Some(username) = &payload.username {
        let username = normalize_username(username);
        if username != profile.username && !db.is_username_available(&username, Some(user_id.as_str())).await? {
            return Err(AppError::Conflict("Username is already taken".to_string()));
        }
    }

    profile.update(payload.into_inner());
    let profile = db
        .update_profile(&profile)
        .await
        .map_err(|e| AppError::Data(e.to_string()))?;

    auth.update_user_metadata(
        user_id,
        serde_json::json!({
            "username": profile.username,
            "display_name": profile.display_name,
        }),
    )
    .await?;

    log::info!("Updated profile for user {}", user_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_toast(
        profile,
        Toast::info("Profile updated", "Your changes have been saved."),
    )))
}

#[get("/u/{username}")]
pub async fn get_public_profile(db: Data<DatabaseService>, path: Path<String>) -> AppResult<HttpResponse> {
    let username = path.into_inner();
    let profile = db
        .get_profile_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile @{}", normalize_username(&username))))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(profile)))
}

#[get("/username-available")]
pub async fn username_available(
    db: Data<DatabaseService>,
    user: Option<AuthenticatedUser>,
    query: Query<UsernameQuery>,
) -> AppResult<HttpResponse> {
    validate_username(&query.username).map_err(|e| {
        AppError::Validation(
            e.message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "Invalid username".to_string()),
        )
    })?;

    let username = normalize_username(&query.username);
    let excluding = user.as_ref().map(|u| u.0.user.id.as_str());
    let available = db.is_username_available(&username, excluding).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(UsernameAvailability { username, available })))
}

#[post("/me/avatar")]
pub async fn upload_avatar(
    db: Data<DatabaseService>,
    storage: Data<StorageService>,
    user: AuthenticatedUser,
    req: HttpRequest,
    body: Bytes,
) -> AppResult<HttpResponse> {
    check_upload_size(&body)?;
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let ext = extension_for_content_type(content_type)
        .ok_or_else(|| AppError::Validation("Avatar must be a PNG, JPEG, WebP or GIF image".to_string()))?;

    let user_id = &user.0.user.id;
    let object_path = StorageService::avatar_path(user_id, ext, Utc::now().timestamp_millis());
    let url = storage.upload(&object_path, &body).await?;
    let profile = db
        .set_avatar_url(user_id, &url)
        .await
        .map_err(|e| AppError::Data(e.to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_toast(
        profile,
        Toast::info("Avatar updated", "Your new profile picture is live."),
    )))
}

#[post("/me/banner/{filename}")]
pub async fn upload_banner(
    db: Data<DatabaseService>,
    storage: Data<StorageService>,
    user: AuthenticatedUser,
    path: Path<String>,
    body: Bytes,
) -> AppResult<HttpResponse> {
    check_upload_size(&body)?;
    let user_id = &user.0.user.id;
    let object_path =
        StorageService::banner_path(user_id, &path.into_inner()).map_err(|e| AppError::Validation(e.to_string()))?;

    let url = storage.upload(&object_path, &body).await?;
    let profile = db
        .set_banner_url(user_id, &url)
        .await
        .map_err(|e| AppError::Data(e.to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_toast(
        profile,
        Toast::info("Banner updated", "Your profile banner has been changed."),
    )))
}

fn check_upload_size(body: &Bytes) -> AppResult<()> {
    if body.is_empty() {
        return Err(AppError::Validation("Upload is empty".to_string()));
    }
    if body.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation("Uploads are limited to 5 MB".to_string()));
    }
    Ok(())
}
