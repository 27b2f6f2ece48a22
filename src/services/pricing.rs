use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::models::{
    common::BillingCycle,
    profile::{SubscriptionStatus, SubscriptionTier},
};

/// List price in cents for a paid tier.
fn price_cents(tier: SubscriptionTier, cycle: BillingCycle) -> Option<i64> {
    let cents = match (tier, cycle) {
        (SubscriptionTier::Free, _) => return None,
        (SubscriptionTier::Go, BillingCycle::Monthly) => 4_99,
        (SubscriptionTier::Go, BillingCycle::Annual) => 49_99,
        (SubscriptionTier::Pro, BillingCycle::Monthly) => 9_99,
        (SubscriptionTier::Pro, BillingCycle::Annual) => 99_99,
        (SubscriptionTier::Premium, BillingCycle::Monthly) => 19_99,
        (SubscriptionTier::Premium, BillingCycle::Annual) => 199_99,
    };
    Some(cents)
}

pub fn list_price(tier: SubscriptionTier, cycle: BillingCycle) -> Option<Decimal> {
    price_cents(tier, cycle).map(|cents| Decimal::new(cents, 2))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub tier: SubscriptionTier,
    pub cycle: BillingCycle,
    pub list_price: Decimal,
    pub upgrade_credit: Decimal,
    pub total: Decimal,
}

/// Price a plan purchase for a user currently on `current`.
///
/// Moving from an active paid tier to a higher one credits the price
/// already paid for the current tier in the same cycle; the total never
/// goes below zero.
pub fn quote(
    current: SubscriptionTier,
    current_status: SubscriptionStatus,
    target: SubscriptionTier,
    cycle: BillingCycle,
) -> AppResult<Quote> {
    let price = list_price(target, cycle)
        .ok_or_else(|| AppError::Validation(format!("{} is not a purchasable plan", target.display_name())))?;

    let is_upgrade = current.is_paid()
        && current_status == SubscriptionStatus::Active
        && target.rank() > current.rank();

    let upgrade_credit = if is_upgrade {
        list_price(current, cycle).unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    let total = (price - upgrade_credit).max(Decimal::ZERO);

    Ok(Quote {
        tier: target,
        cycle,
        list_price: price,
        upgrade_credit,
        total,
    })
}
