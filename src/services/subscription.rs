use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::{
    billing::{plan_label, BillingHistoryEntry, BillingStatus, NewBillingEntry},
    checkout::ReturnStatus,
    common::{BillingCycle, Toast},
    profile::{SubscriptionPatch, SubscriptionTier, UserProfile},
    session::{AuthUser, Session},
};
use crate::services::{
    auth::AuthService,
    database::DatabaseService,
    functions::{FunctionsService, SubscriptionEmail},
};

/// Steps of the multi-call subscription flows, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    UpdateAuthMetadata,
    UpdateProfile,
    InsertBillingRecord,
    RefreshSession,
}

impl std::fmt::Display for FlowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowStep::UpdateAuthMetadata => "update auth metadata",
            FlowStep::UpdateProfile => "update profile",
            FlowStep::InsertBillingRecord => "insert billing record",
            FlowStep::RefreshSession => "refresh session",
        };
        write!(f, "{}", name)
    }
}

/// What a flow managed to apply before it finished or stopped.
///
/// Steps are not rolled back: when `failed_step` is set, everything
/// before it has already been written.
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub profile: Option<UserProfile>,
    pub billing_entry: Option<BillingHistoryEntry>,
    pub session: Option<Session>,
    pub failed_step: Option<FlowStep>,
    pub error: Option<String>,
    /// The invoice had already been recorded, nothing was re-applied.
    pub already_applied: bool,
}

impl FlowReport {
    fn new() -> Self {
        Self {
            profile: None,
            billing_entry: None,
            session: None,
            failed_step: None,
            error: None,
            already_applied: false,
        }
    }

    /// A flow that could not start at all.
    pub fn rejected(error: impl std::fmt::Display) -> Self {
        log::warn!("Subscription flow rejected: {}", error);
        Self {
            error: Some(error.to_string()),
            ..Self::new()
        }
    }

    fn fail(mut self, step: FlowStep, error: impl std::fmt::Display) -> Self {
        log::error!("Subscription flow stopped at '{}': {}", step, error);
        self.failed_step = Some(step);
        self.error = Some(error.to_string());
        self
    }

    pub fn completed(&self) -> bool {
        self.failed_step.is_none()
    }
}

/// A paid plan purchase to apply to a user.
#[derive(Debug, Clone)]
pub struct PlanPurchase {
    pub tier: SubscriptionTier,
    pub cycle: BillingCycle,
    pub amount: Decimal,
    pub invoice_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancellationReport {
    #[serde(flatten)]
    pub flow: FlowReport,
    pub toast: Toast,
    pub reload_after_ms: u64,
}

/// Profile and billing mutations shared by the checkout return, the
/// cancellation flow and the payment webhook.
#[derive(Clone)]
pub struct SubscriptionService {
    db: DatabaseService,
    auth: AuthService,
    functions: FunctionsService,
    currency: String,
    reload_delay_ms: u64,
}

impl SubscriptionService {
    pub fn new(
        db: DatabaseService,
        auth: AuthService,
        functions: FunctionsService,
        currency: String,
        reload_delay_ms: u64,
    ) -> Self {
        Self {
            db,
            auth,
            functions,
            currency,
            reload_delay_ms,
        }
    }

    pub fn db(&self) -> &DatabaseService {
        &self.db
    }

    /// Upgrade `user` to the purchased plan.
    ///
    /// Order: auth metadata, profile row, billing row, upgrade mail
    /// (best-effort), session refresh when `access_token` is given.
    pub async fn apply_purchase(
        &self,
        user: &AuthUser,
        access_token: Option<&str>,
        purchase: &PlanPurchase,
    ) -> FlowReport {
        let mut report = FlowReport::new();
        let now = Utc::now();

        match self
            .db
            .find_billing_entry(&user.id, &purchase.invoice_id, BillingStatus::Paid)
            .await
        {
            Ok(Some(entry)) => {
                log::info!("Invoice {} already applied for user {}", purchase.invoice_id, user.id);
                report.already_applied = true;
                report.billing_entry = Some(entry);
                report.profile = self.db.get_profile(&user.id).await.ok().flatten();
                if let Some(token) = access_token {
                    match self.auth.refresh_session(token).await {
                        Ok(session) => report.session = Some(session),
                        Err(e) => return report.fail(FlowStep::RefreshSession, e),
                    }
                }
                return report;
            }
            Ok(None) => {}
            Err(e) => return report.fail(FlowStep::InsertBillingRecord, e),
        }

        if let Err(e) = self
            .auth
            .update_user_metadata(
                &user.id,
                json!({
                    "subscription_tier": purchase.tier,
                    "billing_cycle": purchase.cycle,
                }),
            )
            .await
        {
            return report.fail(FlowStep::UpdateAuthMetadata, e);
        }

        match self
            .db
            .apply_subscription_patch(&user.id, &SubscriptionPatch::upgrade(purchase.tier, purchase.cycle, now))
            .await
        {
            Ok(profile) => report.profile = Some(profile),
            Err(e) => return report.fail(FlowStep::UpdateProfile, e),
        }

        let plan_name = plan_label(purchase.tier.display_name(), Some(purchase.cycle.to_string().as_str()));
        match self
            .db
            .insert_billing_entry(NewBillingEntry {
                user_id: user.id.clone(),
                plan_name: plan_name.clone(),
                amount: purchase.amount,
                currency: self.currency.clone(),
                status: BillingStatus::Paid,
                invoice_id: purchase.invoice_id.clone(),
            })
            .await
        {
            Ok(entry) => report.billing_entry = Some(entry),
            Err(e) => return report.fail(FlowStep::InsertBillingRecord, e),
        }

        self.functions
            .send_subscription_email(
                SubscriptionEmail::Upgrade,
                &user.email,
                &display_name(user),
                &plan_name,
                Some(purchase.amount),
            )
            .await;

        if let Some(token) = access_token {
            match self.auth.refresh_session(token).await {
                Ok(session) => report.session = Some(session),
                Err(e) => return report.fail(FlowStep::RefreshSession, e),
            }
        }

        log::info!(
            "User {} upgraded to {} ({}) for {} {}",
            user.id,
            purchase.tier,
            purchase.cycle,
            purchase.amount,
            self.currency
        );
        report
    }

    /// Record a checkout that did not go through; the profile is left alone.
    pub async fn record_unsuccessful(
        &self,
        user: &AuthUser,
        status: ReturnStatus,
        plan_name: &str,
        amount: Decimal,
        invoice_id: &str,
    ) -> FlowReport {
        let report = FlowReport::new();

        let (billing_status, email) = match status {
            ReturnStatus::Failed => (BillingStatus::Interrupted, SubscriptionEmail::Failed),
            ReturnStatus::Cancelled => (BillingStatus::Cancelled, SubscriptionEmail::Interrupted),
            ReturnStatus::Success => {
                return report.fail(FlowStep::InsertBillingRecord, "a successful payment is not unsuccessful")
            }
        };

        match self.db.find_billing_entry(&user.id, invoice_id, billing_status).await {
            Ok(Some(entry)) => {
                return FlowReport {
                    billing_entry: Some(entry),
                    already_applied: true,
                    ..report
                }
            }
            Ok(None) => {}
            Err(e) => return report.fail(FlowStep::InsertBillingRecord, e),
        }

        let entry = match self
            .db
            .insert_billing_entry(NewBillingEntry {
                user_id: user.id.clone(),
                plan_name: plan_name.to_string(),
                amount,
                currency: self.currency.clone(),
                status: billing_status,
                invoice_id: invoice_id.to_string(),
            })
            .await
        {
            Ok(entry) => entry,
            Err(e) => return report.fail(FlowStep::InsertBillingRecord, e),
        };

        self.functions
            .send_subscription_email(email, &user.email, &display_name(user), plan_name, Some(amount))
            .await;

        log::info!("Recorded {} checkout {} for user {}", billing_status, invoice_id, user.id);
        FlowReport {
            billing_entry: Some(entry),
            ..report
        }
    }

    /// Downgrade the session's user to the free tier.
    pub async fn cancel(&self, session: &Session, confirmed: bool) -> AppResult<CancellationReport> {
        if !confirmed {
            return Err(AppError::Validation(
                "Cancellation must be confirmed".to_string(),
            ));
        }

        let user = &session.user;
        let profile = self
            .db
            .get_profile(&user.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Profile".to_string()))?;

        if !profile.subscription_tier.is_paid() {
            return Err(AppError::Validation("There is no paid plan to cancel".to_string()));
        }

        let previous_plan = plan_label(
            profile.subscription_tier.display_name(),
            profile.billing_cycle.map(|c| c.to_string()).as_deref(),
        );
        let mut report = FlowReport::new();
        let now = Utc::now();

        let report = 'flow: {
            if let Err(e) = self
                .auth
                .update_user_metadata(
                    &user.id,
                    json!({ "subscription_tier": SubscriptionTier::Free, "billing_cycle": null }),
                )
                .await
            {
                break 'flow report.fail(FlowStep::UpdateAuthMetadata, e);
            }

            match self
                .db
                .apply_subscription_patch(&user.id, &SubscriptionPatch::cancellation(now))
                .await
            {
                Ok(profile) => report.profile = Some(profile),
                Err(e) => break 'flow report.fail(FlowStep::UpdateProfile, e),
            }

            match self
                .db
                .insert_billing_entry(NewBillingEntry {
                    user_id: user.id.clone(),
                    plan_name: previous_plan.clone(),
                    amount: Decimal::ZERO,
                    currency: self.currency.clone(),
                    status: BillingStatus::Cancelled,
                    invoice_id: format!("cancel_{}", now.timestamp_millis()),
                })
                .await
            {
                Ok(entry) => report.billing_entry = Some(entry),
                Err(e) => break 'flow report.fail(FlowStep::InsertBillingRecord, e),
            }

            self.functions
                .send_subscription_email(
                    SubscriptionEmail::Downgrade,
                    &user.email,
                    &display_name(user),
                    &previous_plan,
                    None,
                )
                .await;

            match self.auth.refresh_session(&session.access_token).await {
                Ok(session) => report.session = Some(session),
                Err(e) => break 'flow report.fail(FlowStep::RefreshSession, e),
            }
            report
        };

        let toast = if report.completed() {
            log::info!("User {} cancelled {}", user.id, previous_plan);
            Toast::info(
                "Subscription cancelled",
                "You're now on the Free plan. You can upgrade again at any time.",
            )
        } else {
            Toast::destructive(
                "Cancellation incomplete",
                "We couldn't finish cancelling your plan. Please refresh and try again.",
            )
        };

        Ok(CancellationReport {
            flow: report,
            toast,
            reload_after_ms: self.reload_delay_ms,
        })
    }

    pub async fn load_user(&self, user_id: &str) -> AppResult<AuthUser> {
        let record = self
            .db
            .get_auth_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;
        Ok(AuthUser::from(&record))
    }
}

fn display_name(user: &AuthUser) -> String {
    user.user_metadata
        .get("display_name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| user.email.clone())
}
