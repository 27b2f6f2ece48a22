use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BillingStatus {
    Paid,
    Failed,
    Cancelled,
    Interrupted,
}

impl std::fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingStatus::Paid => write!(f, "Paid"),
            BillingStatus::Failed => write!(f, "Failed"),
            BillingStatus::Cancelled => write!(f, "Cancelled"),
            BillingStatus::Interrupted => write!(f, "Interrupted"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingHistoryEntry {
    pub entry_id: String,
    pub user_id: String,
    pub plan_name: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: BillingStatus,
    pub invoice_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBillingEntry {
    pub user_id: String,
    pub plan_name: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: BillingStatus,
    pub invoice_id: String,
}

impl BillingHistoryEntry {
    pub fn new(entry: NewBillingEntry) -> Self {
        Self {
            entry_id: Uuid::new_v4().simple().to_string(),
            user_id: entry.user_id,
            plan_name: entry.plan_name,
            amount: entry.amount,
            currency: entry.currency,
            status: entry.status,
            invoice_id: entry.invoice_id,
            created_at: Utc::now(),
        }
    }
}

/// Plan label as it appears on billing rows, e.g. "Pro (annual)".
pub fn plan_label(tier_name: &str, cycle: Option<&str>) -> String {
    match cycle {
        Some(cycle) => format!("{} ({})", tier_name, cycle),
        None => tier_name.to_string(),
    }
}
