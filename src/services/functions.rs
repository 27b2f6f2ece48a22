use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::FunctionsConfig;

/// Kinds of subscription lifecycle mail the `send-subscription-email`
/// function knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEmail {
    Upgrade,
    Downgrade,
    Failed,
    Interrupted,
}

impl SubscriptionEmail {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionEmail::Upgrade => "upgrade",
            SubscriptionEmail::Downgrade => "downgrade",
            SubscriptionEmail::Failed => "failed",
            SubscriptionEmail::Interrupted => "interrupted",
        }
    }
}

/// Client for the hosted edge functions (mail and contact sync).
///
/// Every call is best-effort: callers log failures and carry on.
#[derive(Clone)]
pub struct FunctionsService {
    client: Client,
    config: FunctionsConfig,
}

impl FunctionsService {
    pub fn new(config: FunctionsConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.base_url.is_some()
    }

    pub async fn invoke(&self, name: &str, body: Value) -> Result<Value> {
        let base_url = self
            .config
            .base_url
            .as_ref()
            .ok_or_else(|| anyhow!("Functions endpoint not configured, skipping {}", name))?;

        let mut request = self
            .client
            .post(format!("{}/{}", base_url.trim_end_matches('/'), name))
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Function {} failed: status {}, body {}", name, status, error_text));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    pub async fn send_subscription_email(
        &self,
        kind: SubscriptionEmail,
        email: &str,
        display_name: &str,
        plan_name: &str,
        amount: Option<rust_decimal::Decimal>,
    ) {
        let body = json!({
            "notification_type": kind.as_str(),
            "email": email,
            "name": display_name,
            "plan": plan_name,
            "amount": amount.map(|a| a.to_string()),
        });
        self.best_effort("send-subscription-email", body).await;
    }

    pub async fn send_welcome_email(&self, email: &str, display_name: &str) {
        self.best_effort("send-welcome-email", json!({ "email": email, "name": display_name }))
            .await;
    }

    pub async fn sync_contact(&self, email: &str, display_name: &str, username: &str) {
        self.best_effort(
            "sync-contact",
            json!({ "email": email, "name": display_name, "username": username }),
        )
        .await;
    }

    pub async fn send_password_reset(&self, email: &str, reset_url: &str) {
        self.best_effort("send-password-reset", json!({ "email": email, "reset_url": reset_url }))
            .await;
    }

    async fn best_effort(&self, name: &str, body: Value) {
        if !self.is_configured() {
            log::debug!("Functions endpoint not configured, skipping {}", name);
            return;
        }
        match self.invoke(name, body).await {
            Ok(_) => log::info!("Invoked function {}", name),
            Err(e) => log::warn!("Best-effort function {} failed: {}", name, e),
        }
    }
}
