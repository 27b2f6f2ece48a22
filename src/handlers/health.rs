use actix_web::{web::Data, HttpResponse};
use chrono::Utc;
use serde_json::json;

use crate::services::database::DatabaseService;

pub async fn health_check(db: Data<DatabaseService>) -> HttpResponse {
    if let Err(e) = db.health_check().await {
        log::error!("Health check failed: {}", e);
        return HttpResponse::ServiceUnavailable().json(json!({
            "status": "unhealthy",
            "timestamp": Utc::now(),
        }));
    }

    match db.get_statistics().await {
        Ok(stats) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "timestamp": Utc::now(),
            "stats": stats,
        })),
        Err(e) => {
            log::warn!("Could not collect statistics: {}", e);
            HttpResponse::Ok().json(json!({
                "status": "healthy",
                "timestamp": Utc::now(),
            }))
        }
    }
}
