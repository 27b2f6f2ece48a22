use actix_web::web::{Data, Json};
use actix_web::{post, HttpResponse};

use crate::error::AppResult;
use crate::handlers::extract::{AuthenticatedUser, MaybeUser};
use crate::models::{
    checkout::{CancelSubscriptionRequest, CheckoutRequest, ReturnObservation},
    common::ApiResponse,
};
use crate::services::{
    checkout::CheckoutService,
    reconciliation::{ReconcileOutcome, ReconciliationService},
    subscription::SubscriptionService,
};

#[post("/checkout")]
pub async fn start_checkout(
    checkout: Data<CheckoutService>,
    user: AuthenticatedUser,
    payload: Json<CheckoutRequest>,
) -> AppResult<HttpResponse> {
    let response = checkout.initiate(&user.0, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

/// The client landed on a page carrying a checkout status.
#[post("/checkout/return")]
pub async fn checkout_return(
    reconciliation: Data<ReconciliationService>,
    user: MaybeUser,
    payload: Json<ReturnObservation>,
) -> AppResult<HttpResponse> {
    let observation = payload.into_inner();
    let outcome = reconciliation
        .observe_return(user.0.as_ref(), &observation.query, observation.path.as_deref().unwrap_or_default())
        .await;
    Ok(outcome_response(outcome))
}

/// The client's window regained focus.
#[post("/checkout/refocus")]
pub async fn checkout_refocus(
    reconciliation: Data<ReconciliationService>,
    user: MaybeUser,
    payload: Option<Json<ReturnObservation>>,
) -> AppResult<HttpResponse> {
    let observation = payload.map(|p| p.into_inner()).unwrap_or_default();
    let outcome = reconciliation
        .observe_refocus(user.0.as_ref(), &observation.query, observation.path.as_deref().unwrap_or_default())
        .await;
    Ok(outcome_response(outcome))
}

fn outcome_response(outcome: ReconcileOutcome) -> HttpResponse {
    match outcome {
        ReconcileOutcome::Processed(report) => {
            let toast = report.toast.clone();
            HttpResponse::Ok().json(ApiResponse::success_with_toast(ReconcileOutcome::Processed(report), toast))
        }
        other => HttpResponse::Ok().json(ApiResponse::success(other)),
    }
}

#[post("/subscription/cancel")]
pub async fn cancel_subscription(
    subscriptions: Data<SubscriptionService>,
    user: AuthenticatedUser,
    payload: Json<CancelSubscriptionRequest>,
) -> AppResult<HttpResponse> {
    let report = subscriptions.cancel(&user.0, payload.confirm).await?;
    let toast = report.toast.clone();
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_toast(report, toast)))
}
