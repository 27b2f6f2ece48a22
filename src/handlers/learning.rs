use actix_web::web::{Data, Query};
use actix_web::{get, HttpResponse};

use crate::error::AppResult;
use crate::handlers::extract::AuthenticatedUser;
use crate::models::{common::ApiResponse, learning_path::SearchQuery};
use crate::services::database::DatabaseService;

const SEARCH_LIMIT: usize = 20;

#[get("/search")]
pub async fn search(
    db: Data<DatabaseService>,
    _user: AuthenticatedUser,
    query: Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let needle = query.q.as_deref().unwrap_or_default();
    let paths = db.search_learning_paths(needle, SEARCH_LIMIT).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(paths)))
}
