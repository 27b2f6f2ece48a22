use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::common::BillingCycle;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]{3,30}$").unwrap());

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Go,
    Pro,
    Premium,
}

impl SubscriptionTier {
    pub fn is_paid(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }

    /// Ordering used to decide whether a plan change is an upgrade.
    pub fn rank(&self) -> u8 {
        match self {
            SubscriptionTier::Free => 0,
            SubscriptionTier::Go => 1,
            SubscriptionTier::Pro => 2,
            SubscriptionTier::Premium => 3,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "Free",
            SubscriptionTier::Go => "Go",
            SubscriptionTier::Pro => "Pro",
            SubscriptionTier::Premium => "Premium",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Some(SubscriptionTier::Free),
            "go" => Some(SubscriptionTier::Go),
            "pro" => Some(SubscriptionTier::Pro),
            "premium" => Some(SubscriptionTier::Premium),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name().to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
    Trial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    pub bio: Option<String>,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub billing_cycle: Option<BillingCycle>,
    pub followers_count: u32,
    pub following_count: u32,
    pub streak_days: u32,
    pub watch_hours: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written by the upgrade, cancellation and webhook flows.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionPatch {
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub billing_cycle: Option<BillingCycle>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPatch {
    pub fn upgrade(tier: SubscriptionTier, cycle: BillingCycle, now: DateTime<Utc>) -> Self {
        Self {
            subscription_tier: tier,
            subscription_status: SubscriptionStatus::Active,
            subscription_start_date: Some(now),
            subscription_end_date: Some(now + Duration::days(cycle.duration_days())),
            billing_cycle: Some(cycle),
            updated_at: now,
        }
    }

    pub fn cancellation(now: DateTime<Utc>) -> Self {
        Self {
            subscription_tier: SubscriptionTier::Free,
            subscription_status: SubscriptionStatus::Cancelled,
            subscription_start_date: None,
            subscription_end_date: Some(now),
            billing_cycle: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(custom = "validate_username")]
    pub username: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Display name must be between 1 and 50 characters"))]
    pub display_name: Option<String>,

    #[validate(length(max = 280, message = "Bio must be at most 280 characters"))]
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
}

impl UserProfile {
    pub fn new(user_id: String, username: &str, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            username: normalize_username(username),
            display_name,
            avatar_url: None,
            banner_url: None,
            bio: None,
            subscription_tier: SubscriptionTier::Free,
            subscription_status: SubscriptionStatus::Active,
            subscription_start_date: None,
            subscription_end_date: None,
            billing_cycle: None,
            followers_count: 0,
            following_count: 0,
            streak_days: 0,
            watch_hours: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&mut self, request: UpdateProfileRequest) {
        if let Some(username) = request.username {
            self.username = normalize_username(&username);
        }
        if let Some(display_name) = request.display_name {
            self.display_name = Some(display_name);
        }
        if let Some(bio) = request.bio {
            self.bio = Some(bio);
        }
        self.updated_at = Utc::now();
    }
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME_RE.is_match(&normalize_username(username)) {
        Ok(())
    } else {
        let mut error = ValidationError::new("invalid_username");
        error.message = Some("Username must be 3-30 characters: letters, digits or underscore".into());
        Err(error)
    }
}
