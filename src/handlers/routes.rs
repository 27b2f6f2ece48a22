use actix_web::web::Query;
use actix_web::{get, HttpResponse};
use serde::Deserialize;

use crate::error::AppResult;
use crate::handlers::extract::MaybeUser;
use crate::models::common::ApiResponse;
use crate::routes::resolve;

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub path: String,
}

#[get("/resolve")]
pub async fn resolve_route(user: MaybeUser, query: Query<ResolveQuery>) -> AppResult<HttpResponse> {
    let decision = resolve(&query.path, user.0.is_some());
    Ok(HttpResponse::Ok().json(ApiResponse::success(decision)))
}
