use reqwest::Url;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    checkout::{
        CheckoutRequest, CheckoutResponse, CustomerDetails, GatewayOrder, OrderMeta, PendingCheckout, ReturnStatus,
    },
    common::BillingCycle,
    profile::SubscriptionTier,
    session::Session,
};
use crate::services::{
    database::DatabaseService, gateway::PaymentGatewayService, pricing, reconciliation::ReconciliationService,
};

const RETURN_PATH: &str = "/feed";

#[derive(Clone)]
pub struct CheckoutService {
    db: DatabaseService,
    gateway: PaymentGatewayService,
    reconciliation: ReconciliationService,
    site_url: String,
}

impl CheckoutService {
    pub fn new(
        db: DatabaseService,
        gateway: PaymentGatewayService,
        reconciliation: ReconciliationService,
        site_url: String,
    ) -> Self {
        Self {
            db,
            gateway,
            reconciliation,
            site_url,
        }
    }

    /// Price the plan, open an order with the gateway and mark the
    /// session as paying.
    pub async fn initiate(&self, session: &Session, request: CheckoutRequest) -> AppResult<CheckoutResponse> {
        request.validate()?;

        let profile = self
            .db
            .get_profile(&session.user.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Profile".to_string()))?;

        let quote = pricing::quote(
            profile.subscription_tier,
            profile.subscription_status,
            request.plan,
            request.cycle,
        )?;

        let order_id = format!("order_{}", Uuid::new_v4().simple());
        let redirect = |status| self.return_url(status, &order_id, request.plan, request.cycle, quote.total);
        let order_meta = OrderMeta {
            return_url: redirect(ReturnStatus::Success)?,
            failure_url: redirect(ReturnStatus::Failed)?,
            cancel_url: redirect(ReturnStatus::Cancelled)?,
        };

        let order = GatewayOrder {
            order_id: order_id.clone(),
            order_amount: quote.total,
            order_currency: self.gateway.currency().to_string(),
            plan: request.plan.to_string(),
            customer_details: CustomerDetails {
                customer_id: session.user.id.clone(),
                customer_name: request.customer_name.trim().to_string(),
                customer_email: request.customer_email.trim().to_string(),
                customer_phone: request.customer_phone.clone(),
            },
            order_meta,
        };

        let created = self.gateway.create_order(&order).await.map_err(|e| {
            log::error!("Order {} could not be created: {}", order_id, e);
            AppError::Payment(e.to_string())
        })?;

        self.reconciliation
            .begin_checkout(
                &session.access_token,
                PendingCheckout {
                    order_id: order_id.clone(),
                    plan: request.plan,
                    cycle: request.cycle,
                    amount: quote.total,
                },
            )
            .await;

        Ok(CheckoutResponse {
            order_id,
            checkout_url: created.checkout_url,
            amount: quote.total,
            currency: order.order_currency,
            upgrade_credit: quote.upgrade_credit,
            mocked: created.mocked,
        })
    }

    fn return_url(
        &self,
        status: ReturnStatus,
        order_id: &str,
        plan: SubscriptionTier,
        cycle: BillingCycle,
        amount: Decimal,
    ) -> AppResult<String> {
        let base = format!("{}{}", self.site_url.trim_end_matches('/'), RETURN_PATH);
        let url = Url::parse_with_params(
            &base,
            &[
                ("status", status.to_string()),
                ("session_id", order_id.to_string()),
                ("plan", plan.to_string()),
                ("cycle", cycle.to_string()),
                ("amount", amount.to_string()),
            ],
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid site URL {}: {}", base, e)))?;
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::services::auth::tests::signed_in;
    use crate::services::subscription::tests::subscription_service;

    async fn checkout_service(gateway: GatewayConfig) -> (CheckoutService, ReconciliationService, crate::services::auth::AuthService) {
        let (subscriptions, auth) = subscription_service().await;
        let db = subscriptions.db().clone();
        let reconciliation = ReconciliationService::new(subscriptions);
        let service = CheckoutService::new(
            db,
            PaymentGatewayService::new(gateway),
            reconciliation.clone(),
            "http://localhost:3000/".to_string(),
        );
        (service, reconciliation, auth)
    }

    fn request(plan: SubscriptionTier) -> CheckoutRequest {
        CheckoutRequest {
            plan,
            cycle: BillingCycle::Monthly,
            customer_name: "Ada Lovelace".to_string(),
            customer_email: "ada@example.com".to_string(),
            customer_phone: None,
        }
    }

    #[tokio::test]
    async fn test_mock_checkout_returns_success_url_and_marks_session() {
        let (service, reconciliation, auth) = checkout_service(GatewayConfig::default()).await;
        let session = signed_in(&auth, "ada@example.com", "ada").await;

        let response = service.initiate(&session, request(SubscriptionTier::Pro)).await.unwrap();

        assert!(response.mocked);
        assert!(response.order_id.starts_with("order_"));
        assert_eq!(response.amount, Decimal::new(999, 2));

        let url = Url::parse(&response.checkout_url).unwrap();
        assert_eq!(url.path(), "/feed");
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["status"], "success");
        assert_eq!(params["session_id"], response.order_id);
        assert_eq!(params["plan"], "pro");
        assert_eq!(params["cycle"], "monthly");
        assert_eq!(params["amount"], "9.99");

        assert!(reconciliation.is_processing_payment(&session.access_token).await);
    }

    #[tokio::test]
    async fn test_free_plan_cannot_be_bought() {
        let (service, _reconciliation, auth) = checkout_service(GatewayConfig::default()).await;
        let session = signed_in(&auth, "ada@example.com", "ada").await;

        let result = service.initiate(&session, request(SubscriptionTier::Free)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_gateway_failure_is_payment_error_and_session_not_marked() {
        let (service, reconciliation, auth) = checkout_service(GatewayConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            api_key: Some("key".to_string()),
            ..GatewayConfig::default()
        })
        .await;
        let session = signed_in(&auth, "ada@example.com", "ada").await;

        let result = service.initiate(&session, request(SubscriptionTier::Go)).await;
        assert!(matches!(result, Err(AppError::Payment(_))));
        assert!(!reconciliation.is_processing_payment(&session.access_token).await);
    }
}
