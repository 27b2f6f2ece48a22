use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::common::BillingCycle;
use crate::models::profile::SubscriptionTier;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReturnStatus {
    Success,
    Failed,
    Cancelled,
}

impl ReturnStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" | "paid" => Some(ReturnStatus::Success),
            "failed" | "failure" => Some(ReturnStatus::Failed),
            "cancelled" | "canceled" => Some(ReturnStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnStatus::Success => write!(f, "success"),
            ReturnStatus::Failed => write!(f, "failed"),
            ReturnStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Query parameters the gateway (or mock mode) appends to the return URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnQuery {
    pub status: Option<String>,
    pub session_id: Option<String>,
    pub plan: Option<String>,
    pub cycle: Option<String>,
    pub amount: Option<String>,
}

impl ReturnQuery {
    pub fn cancelled(session_id: &str) -> Self {
        Self {
            status: Some(ReturnStatus::Cancelled.to_string()),
            session_id: Some(session_id.to_string()),
            ..Default::default()
        }
    }
}

/// A return query as observed by the client, with the page it landed on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnObservation {
    #[serde(flatten)]
    pub query: ReturnQuery,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub plan: SubscriptionTier,
    pub cycle: BillingCycle,

    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub customer_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub customer_email: String,

    #[validate(length(min = 6, max = 20, message = "Phone number must be between 6 and 20 characters"))]
    pub customer_phone: Option<String>,
}

/// Checkout started in this session and not yet reconciled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingCheckout {
    pub order_id: String,
    pub plan: SubscriptionTier,
    pub cycle: BillingCycle,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub checkout_url: String,
    pub amount: Decimal,
    pub currency: String,
    pub upgrade_credit: Decimal,
    pub mocked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayOrder {
    pub order_id: String,
    pub order_amount: Decimal,
    pub order_currency: String,
    pub plan: String,
    pub customer_details: CustomerDetails,
    pub order_meta: OrderMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderMeta {
    pub return_url: String,
    pub failure_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventType {
    PaymentSuccess,
    PaymentFailed,
    PaymentUserDropped,
}

impl WebhookEventType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PAYMENT_SUCCESS_WEBHOOK" => Some(WebhookEventType::PaymentSuccess),
            "PAYMENT_FAILED_WEBHOOK" => Some(WebhookEventType::PaymentFailed),
            "PAYMENT_USER_DROPPED_WEBHOOK" => Some(WebhookEventType::PaymentUserDropped),
            _ => None,
        }
    }

    pub fn return_status(&self) -> ReturnStatus {
        match self {
            WebhookEventType::PaymentSuccess => ReturnStatus::Success,
            WebhookEventType::PaymentFailed => ReturnStatus::Failed,
            WebhookEventType::PaymentUserDropped => ReturnStatus::Cancelled,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentWebhookData,
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookData {
    pub order_id: String,
    pub user_id: String,
    pub plan: SubscriptionTier,
    pub cycle: Option<BillingCycle>,
    pub amount: Decimal,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub confirm: bool,
}
