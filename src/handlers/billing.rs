use actix_web::web::{Data, Path};
use actix_web::{delete, get, HttpResponse};

use crate::error::{AppError, AppResult};
use crate::handlers::extract::AuthenticatedUser;
use crate::models::common::{ApiResponse, Toast};
use crate::services::database::DatabaseService;

#[get("/history")]
pub async fn list_history(db: Data<DatabaseService>, user: AuthenticatedUser) -> AppResult<HttpResponse> {
    let entries = db.list_billing_history(&user.0.user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(entries)))
}

#[delete("/history/{entry_id}")]
pub async fn delete_history_entry(
    db: Data<DatabaseService>,
    user: AuthenticatedUser,
    path: Path<String>,
) -> AppResult<HttpResponse> {
    let entry_id = path.into_inner();
    if !db.delete_billing_entry(&user.0.user.id, &entry_id).await? {
        return Err(AppError::NotFound("Billing entry".to_string()));
    }

    log::info!("User {} deleted billing entry {}", user.0.user.id, entry_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_toast(
        serde_json::json!({ "deleted": entry_id }),
        Toast::info("Entry removed", "The billing record was deleted."),
    )))
}
