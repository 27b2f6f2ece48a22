use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::models::checkout::{GatewayOrder, PaymentWebhookPayload};

type HmacSha256 = Hmac<Sha256>;

/// Result of creating an order: where to send the shopper.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub checkout_url: String,
    pub mocked: bool,
}

#[derive(Clone)]
pub struct PaymentGatewayService {
    client: Client,
    config: GatewayConfig,
}

impl PaymentGatewayService {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    pub fn is_live(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Create a hosted checkout for `order`.
    ///
    /// Without an API key the order is not sent anywhere: after the mock
    /// delay the shopper goes straight to the order's success URL.
    pub async fn create_order(&self, order: &GatewayOrder) -> Result<CreatedOrder> {
        let api_key = match &self.config.api_key {
            Some(key) => key,
            None => {
                log::warn!("No payment API key configured, simulating checkout for {}", order.order_id);
                tokio::time::sleep(Duration::from_millis(self.config.mock_delay_ms)).await;
                return Ok(CreatedOrder {
                    checkout_url: order.order_meta.return_url.clone(),
                    mocked: true,
                });
            }
        };

        log::info!("Creating order {} for {} {}", order.order_id, order.order_amount, order.order_currency);

        let response = self
            .client
            .post(format!("{}/orders", self.config.api_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(order)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Order creation failed: status {}, body {}", status, error_text));
        }

        let body: Value = response.json().await?;
        let checkout_url = extract_checkout_url(&body)
            .ok_or_else(|| anyhow!("No checkout URL in order response"))?;

        log::info!("Created order {}", order.order_id);
        Ok(CreatedOrder {
            checkout_url,
            mocked: false,
        })
    }

    /// Validate the hex HMAC-SHA256 of the raw webhook body.
    pub fn validate_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        let mut mac = match HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(payload);

        match hex::decode(signature.trim()) {
            Ok(expected) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }

    pub fn parse_webhook(&self, payload: &[u8]) -> Result<PaymentWebhookPayload> {
        let webhook: PaymentWebhookPayload = serde_json::from_slice(payload)?;
        Ok(webhook)
    }
}

fn extract_checkout_url(body: &Value) -> Option<String> {
    ["checkout_url", "payment_link", "url"]
        .iter()
        .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

/// Sign `payload` the way the gateway does.
#[cfg(test)]
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::checkout::{CustomerDetails, OrderMeta};
    use rust_decimal::Decimal;
    use serde_json::json;

    fn order() -> GatewayOrder {
        GatewayOrder {
            order_id: "order_1".to_string(),
            order_amount: Decimal::new(999, 2),
            order_currency: "USD".to_string(),
            plan: "pro".to_string(),
            customer_details: CustomerDetails {
                customer_id: "u1".to_string(),
                customer_name: "Ada".to_string(),
                customer_email: "ada@example.com".to_string(),
                customer_phone: None,
            },
            order_meta: OrderMeta {
                return_url: "http://localhost:3000/feed?status=success&session_id=order_1".to_string(),
                failure_url: "http://localhost:3000/feed?status=failed&session_id=order_1".to_string(),
                cancel_url: "http://localhost:3000/feed?status=cancelled&session_id=order_1".to_string(),
            },
        }
    }

    #[test]
    fn test_webhook_signature_validation() {
        let service = PaymentGatewayService::new(GatewayConfig::default());
        let payload = br#"{"type":"PAYMENT_SUCCESS_WEBHOOK"}"#;

        let valid_signature = sign_payload("test_webhook_secret", payload);
        assert!(service.validate_webhook_signature(payload, &valid_signature));
        assert!(!service.validate_webhook_signature(payload, "invalid_signature"));
        assert!(!service.validate_webhook_signature(b"tampered", &valid_signature));
    }

    #[test]
    fn test_checkout_url_extraction() {
        assert_eq!(
            extract_checkout_url(&json!({ "payment_link": "https://pay.example/abc" })),
            Some("https://pay.example/abc".to_string())
        );
        assert_eq!(extract_checkout_url(&json!({ "order_id": "x" })), None);
    }

    #[tokio::test]
    async fn test_mock_mode_redirects_to_return_url() {
        let service = PaymentGatewayService::new(GatewayConfig::default());
        assert!(!service.is_live());

        let created = service.create_order(&order()).await.unwrap();
        assert!(created.mocked);
        assert!(created.checkout_url.contains("status=success"));
    }

    #[tokio::test]
    async fn test_live_mode_network_failure_is_an_error() {
        let service = PaymentGatewayService::new(GatewayConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            api_key: Some("key".to_string()),
            ..GatewayConfig::default()
        });
        assert!(service.create_order(&order()).await.is_err());
    }
}
