use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::models::{
    billing::{plan_label, BillingStatus},
    checkout::{PaymentWebhookPayload, PendingCheckout, ReturnQuery, ReturnStatus, WebhookEventType},
    common::{BillingCycle, Toast},
    profile::SubscriptionTier,
    session::Session,
};
use crate::services::{
    pricing::list_price,
    subscription::{FlowReport, PlanPurchase, SubscriptionService},
};

/// Order id used when an abandoned checkout left no pending order behind.
const ABANDONED_ORDER: &str = "abandoned";
const DEFAULT_RETURN_PATH: &str = "/feed";

/// Checkout state held for one signed-in session.
#[derive(Debug, Clone, Default)]
struct ReturnTracker {
    last_processed_key: Option<String>,
    processing_payment: bool,
    pending: Option<PendingCheckout>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No checkout status to act on.
    Idle,
    /// A status arrived before the user was known; retry once signed in.
    AwaitingUser,
    /// This (status, session id) pair was already handled.
    Duplicate { key: String },
    Processed(ReconcileReport),
}

#[derive(Debug, Serialize)]
pub struct ReconcileReport {
    pub status: ReturnStatus,
    pub session_id: String,
    /// Produced by a refocus after an abandoned checkout, not by a redirect.
    pub synthesized: bool,
    /// Where the client lands once the status query is stripped.
    pub redirect_to: String,
    pub toast: Toast,
    #[serde(flatten)]
    pub flow: FlowReport,
}

#[derive(Debug, Serialize)]
pub struct WebhookOutcome {
    pub event_type: String,
    pub handled: bool,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowReport>,
}

/// Turns checkout returns, window refocus and payment webhooks into
/// subscription changes, each at most once.
#[derive(Clone)]
pub struct ReconciliationService {
    subscriptions: SubscriptionService,
    trackers: Arc<RwLock<HashMap<String, ReturnTracker>>>,
    require_known_order: bool,
}

impl ReconciliationService {
    pub fn new(subscriptions: SubscriptionService) -> Self {
        Self {
            subscriptions,
            trackers: Arc::new(RwLock::new(HashMap::new())),
            require_known_order: false,
        }
    }

    /// Only apply a success return for an order this session started, or
    /// one the gateway already confirmed by webhook. Enabled whenever a
    /// live gateway is configured.
    pub fn require_known_order(mut self, required: bool) -> Self {
        self.require_known_order = required;
        self
    }

    /// Mark the session as away at the gateway with `pending` in flight.
    pub async fn begin_checkout(&self, access_token: &str, pending: PendingCheckout) {
        log::info!("Checkout {} started", pending.order_id);
        let mut trackers = self.trackers.write().await;
        let tracker = trackers.entry(access_token.to_string()).or_default();
        tracker.processing_payment = true;
        tracker.pending = Some(pending);
    }

    pub async fn is_processing_payment(&self, access_token: &str) -> bool {
        self.trackers
            .read()
            .await
            .get(access_token)
            .map(|t| t.processing_payment)
            .unwrap_or(false)
    }

    /// Drop everything tracked for a session that has ended.
    pub async fn forget(&self, access_token: &str) {
        self.trackers.write().await.remove(access_token);
    }

    /// Drop trackers whose session is no longer live; returns how many.
    pub async fn retain_sessions(&self, live_tokens: &HashSet<String>) -> usize {
        let mut trackers = self.trackers.write().await;
        let before = trackers.len();
        trackers.retain(|token, _| live_tokens.contains(token));
        before - trackers.len()
    }

    /// Handle the status query the gateway appended to `return_path`.
    pub async fn observe_return(
        &self,
        session: Option<&Session>,
        query: &ReturnQuery,
        return_path: &str,
    ) -> ReconcileOutcome {
        self.reconcile(session, query, return_path, false).await
    }

    /// The client's window regained focus.
    ///
    /// A status in the query is handled like a return. Without one, a
    /// session still marked as paying abandoned its checkout, which is
    /// reconciled as a cancellation of the pending order.
    pub async fn observe_refocus(
        &self,
        session: Option<&Session>,
        query: &ReturnQuery,
        return_path: &str,
    ) -> ReconcileOutcome {
        if query.status.is_some() {
            return self.reconcile(session, query, return_path, false).await;
        }

        let Some(session) = session else {
            return ReconcileOutcome::Idle;
        };

        let order_id = {
            let trackers = self.trackers.read().await;
            match trackers.get(&session.access_token) {
                Some(tracker) if tracker.processing_payment => tracker
                    .pending
                    .as_ref()
                    .map(|p| p.order_id.clone())
                    .unwrap_or_else(|| ABANDONED_ORDER.to_string()),
                _ => return ReconcileOutcome::Idle,
            }
        };

        log::info!("Checkout {} abandoned, treating as cancelled", order_id);
        self.reconcile(Some(session), &ReturnQuery::cancelled(&order_id), return_path, true)
            .await
    }

    async fn reconcile(
        &self,
        session: Option<&Session>,
        query: &ReturnQuery,
        return_path: &str,
        synthesized: bool,
    ) -> ReconcileOutcome {
        let Some(raw_status) = query.status.as_deref() else {
            return ReconcileOutcome::Idle;
        };
        let Some(status) = ReturnStatus::parse(raw_status) else {
            log::warn!("Ignoring unknown checkout status '{}'", raw_status);
            return ReconcileOutcome::Idle;
        };
        let Some(session) = session else {
            return ReconcileOutcome::AwaitingUser;
        };

        let session_id = query.session_id.clone().unwrap_or_default();
        let key = format!("{}:{}", status, session_id);

        // Claim the key before any side effect so concurrent observers
        // of the same return cannot both apply it.
        let pending = {
            let mut trackers = self.trackers.write().await;
            let tracker = trackers.entry(session.access_token.clone()).or_default();
            if tracker.last_processed_key.as_deref() == Some(key.as_str()) {
                log::debug!("Checkout return {} already processed", key);
                return ReconcileOutcome::Duplicate { key };
            }
            tracker.last_processed_key = Some(key);

            // a return for some older order leaves the current checkout pending
            let stale = tracker.pending.as_ref().is_some_and(|p| p.order_id != session_id);
            if stale {
                None
            } else {
                tracker.processing_payment = false;
                tracker.pending.take()
            }
        };

        let flow = match status {
            ReturnStatus::Success => match resolve_purchase(query, &session_id, pending.as_ref()) {
                Some(purchase) => {
                    if pending.is_none() && !self.order_is_known(&session.user.id, &session_id).await {
                        FlowReport::rejected(format!("Checkout {} was not started from this session", session_id))
                    } else {
                        self.subscriptions
                            .apply_purchase(&session.user, Some(&session.access_token), &purchase)
                            .await
                    }
                }
                None => FlowReport::rejected(format!("Checkout {} did not name a paid plan", session_id)),
            },
            ReturnStatus::Failed | ReturnStatus::Cancelled => {
                let (plan_name, amount) = describe_attempt(query, &session_id, pending.as_ref());
                self.subscriptions
                    .record_unsuccessful(&session.user, status, &plan_name, amount, &session_id)
                    .await
            }
        };

        ReconcileOutcome::Processed(ReconcileReport {
            status,
            toast: toast_for(status, &flow),
            session_id,
            synthesized,
            redirect_to: strip_query(return_path),
            flow,
        })
    }

    /// Whether a success return without a pending order may be applied.
    async fn order_is_known(&self, user_id: &str, order_id: &str) -> bool {
        if !self.require_known_order {
            return true;
        }
        match self
            .subscriptions
            .db()
            .find_billing_entry(user_id, order_id, BillingStatus::Paid)
            .await
        {
            Ok(entry) => entry.is_some(),
            Err(e) => {
                log::error!("Failed to look up order {}: {}", order_id, e);
                false
            }
        }
    }

    /// Apply a verified gateway notification.
    ///
    /// Shares idempotency with the redirect path: an order already recorded
    /// by either side is acknowledged without being applied again.
    pub async fn apply_webhook(&self, payload: PaymentWebhookPayload) -> AppResult<WebhookOutcome> {
        let Some(event_type) = WebhookEventType::parse(&payload.event_type) else {
            log::info!("Ignoring webhook event {}", payload.event_type);
            return Ok(WebhookOutcome {
                event_type: payload.event_type,
                handled: false,
                duplicate: false,
                flow: None,
            });
        };

        let data = payload.data;
        if data.amount.is_sign_negative() {
            return Err(AppError::Validation(format!(
                "Order {} has a negative amount",
                data.order_id
            )));
        }
        if event_type.return_status() == ReturnStatus::Success && !data.plan.is_paid() {
            return Err(AppError::Validation(format!(
                "Order {} did not buy a paid plan",
                data.order_id
            )));
        }

        let user = self.subscriptions.load_user(&data.user_id).await?;
        let cycle = data.cycle.unwrap_or(BillingCycle::Monthly);

        log::info!("Processing {} for order {}", payload.event_type, data.order_id);

        let flow = match event_type.return_status() {
            ReturnStatus::Success => {
                let purchase = PlanPurchase {
                    tier: data.plan,
                    cycle,
                    amount: data.amount,
                    invoice_id: data.order_id.clone(),
                };
                self.subscriptions.apply_purchase(&user, None, &purchase).await
            }
            status => {
                let plan_name = plan_label(data.plan.display_name(), Some(cycle.to_string().as_str()));
                self.subscriptions
                    .record_unsuccessful(&user, status, &plan_name, data.amount, &data.order_id)
                    .await
            }
        };

        Ok(WebhookOutcome {
            event_type: payload.event_type,
            handled: true,
            duplicate: flow.already_applied,
            flow: Some(flow),
        })
    }
}

/// The pending order wins when it matches the returned session id.
/// Otherwise the plan comes from the query but is always charged at its
/// list price.
fn resolve_purchase(query: &ReturnQuery, session_id: &str, pending: Option<&PendingCheckout>) -> Option<PlanPurchase> {
    if let Some(pending) = pending.filter(|p| p.order_id == session_id) {
        return Some(PlanPurchase {
            tier: pending.plan,
            cycle: pending.cycle,
            amount: pending.amount,
            invoice_id: pending.order_id.clone(),
        });
    }

    let tier = query
        .plan
        .as_deref()
        .and_then(SubscriptionTier::parse)
        .filter(|t| t.is_paid())?;
    let cycle = query
        .cycle
        .as_deref()
        .and_then(BillingCycle::parse)
        .unwrap_or(BillingCycle::Monthly);
    let amount = list_price(tier, cycle)?;

    Some(PlanPurchase {
        tier,
        cycle,
        amount,
        invoice_id: session_id.to_string(),
    })
}

fn describe_attempt(query: &ReturnQuery, session_id: &str, pending: Option<&PendingCheckout>) -> (String, Decimal) {
    if let Some(pending) = pending.filter(|p| p.order_id == session_id) {
        let label = plan_label(pending.plan.display_name(), Some(pending.cycle.to_string().as_str()));
        return (label, pending.amount);
    }

    let tier = query.plan.as_deref().and_then(SubscriptionTier::parse);
    let cycle = query.cycle.as_deref().and_then(BillingCycle::parse);
    match tier {
        Some(tier) => (
            plan_label(tier.display_name(), cycle.map(|c| c.to_string()).as_deref()),
            list_price(tier, cycle.unwrap_or(BillingCycle::Monthly)).unwrap_or(Decimal::ZERO),
        ),
        None => ("Unknown plan".to_string(), Decimal::ZERO),
    }
}

fn strip_query(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    if path.is_empty() {
        DEFAULT_RETURN_PATH.to_string()
    } else {
        path.to_string()
    }
}

fn toast_for(status: ReturnStatus, flow: &FlowReport) -> Toast {
    match status {
        ReturnStatus::Success if flow.completed() && flow.error.is_none() => {
            let plan = flow
                .profile
                .as_ref()
                .map(|p| p.subscription_tier.display_name())
                .unwrap_or("your new");
            Toast::info("Payment successful", format!("Welcome to the {} plan!", plan))
        }
        ReturnStatus::Success => Toast::destructive(
            "Subscription update failed",
            "Your payment went through but we couldn't update your plan. Please contact support.",
        ),
        ReturnStatus::Failed => Toast::destructive(
            "Payment failed",
            "Your payment could not be processed. You have not been charged.",
        ),
        ReturnStatus::Cancelled => Toast::destructive(
            "Payment cancelled",
            "Your checkout was cancelled. You can upgrade again at any time.",
        ),
    }
}
