use actix_web::web::{Bytes, Data};
use actix_web::{post, HttpRequest, HttpResponse};

use crate::error::{AppError, AppResult};
use crate::models::common::ApiResponse;
use crate::services::{gateway::PaymentGatewayService, reconciliation::ReconciliationService};

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[post("/webhook")]
pub async fn payment_webhook(
    gateway: Data<PaymentGatewayService>,
    reconciliation: Data<ReconciliationService>,
    req: HttpRequest,
    body: Bytes,
) -> AppResult<HttpResponse> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Auth("Missing webhook signature".to_string()))?;

    if !gateway.validate_webhook_signature(&body, signature) {
        log::warn!("Rejected payment webhook with invalid signature");
        return Err(AppError::Auth("Invalid webhook signature".to_string()));
    }

    let payload = gateway
        .parse_webhook(&body)
        .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {}", e)))?;

    let outcome = reconciliation.apply_webhook(payload).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(outcome)))
}
