use anyhow::{anyhow, Result};
use serde::Serialize;
use surrealdb::{
    engine::local::{Db, Mem},
    Surreal,
};

use crate::models::{
    billing::{BillingHistoryEntry, BillingStatus, NewBillingEntry},
    learning_path::LearningPath,
    profile::{normalize_username, SubscriptionPatch, UserProfile},
    session::AuthUserRecord,
};

const AUTH_USERS: &str = "auth_users";
const PROFILES: &str = "user_profiles";
const BILLING: &str = "billing_history";
const LEARNING_PATHS: &str = "learning_paths";

#[derive(Clone)]
pub struct DatabaseService {
    db: Surreal<Db>,
}

impl DatabaseService {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = if database_url.starts_with("memory://") {
            Surreal::new::<Mem>(()).await?
        } else {
            return Err(anyhow!("Unsupported database URL: {}", database_url));
        };

        db.use_ns("microlearn").use_db("main").await?;

        let service = Self { db };
        service.initialize_schema().await?;

        Ok(service)
    }

    async fn initialize_schema(&self) -> Result<()> {
        self.db
            .query(
                "
            DEFINE TABLE auth_users SCHEMALESS;
            DEFINE INDEX unique_auth_email ON auth_users COLUMNS email UNIQUE;

            DEFINE TABLE user_profiles SCHEMALESS;
            DEFINE INDEX unique_username ON user_profiles COLUMNS username UNIQUE;

            DEFINE TABLE billing_history SCHEMALESS;
            DEFINE INDEX billing_by_user ON billing_history COLUMNS user_id;
            DEFINE INDEX unique_billing_invoice ON billing_history COLUMNS user_id, invoice_id, status UNIQUE;

            DEFINE TABLE learning_paths SCHEMALESS;
        ",
            )
            .await?
            .check()?;

        log::info!("Database schema initialized successfully");
        Ok(())
    }

    // Identity operations
    pub async fn create_auth_user(&self, record: &AuthUserRecord) -> Result<AuthUserRecord> {
        let created: Option<AuthUserRecord> = self
            .db
            .create((AUTH_USERS, record.user_id.as_str()))
            .content(record)
            .await?;

        created.ok_or_else(|| anyhow!("Failed to create auth user"))
    }

    pub async fn get_auth_user(&self, user_id: &str) -> Result<Option<AuthUserRecord>> {
        let user: Option<AuthUserRecord> = self.db.select((AUTH_USERS, user_id)).await?;
        Ok(user)
    }

    pub async fn get_auth_user_by_email(&self, email: &str) -> Result<Option<AuthUserRecord>> {
        let user: Option<AuthUserRecord> = self
            .db
            .query("SELECT * FROM auth_users WHERE email = $email LIMIT 1")
            .bind(("email", email.to_lowercase()))
            .await?
            .take(0)?;
        Ok(user)
    }

    pub async fn get_auth_user_by_confirmation_token(&self, token: &str) -> Result<Option<AuthUserRecord>> {
        let user: Option<AuthUserRecord> = self
            .db
            .query("SELECT * FROM auth_users WHERE confirmation_token = $lookup LIMIT 1")
            .bind(("lookup", token.to_string()))
            .await?
            .take(0)?;
        Ok(user)
    }

    pub async fn get_auth_user_by_recovery_token(&self, token: &str) -> Result<Option<AuthUserRecord>> {
        let user: Option<AuthUserRecord> = self
            .db
            .query("SELECT * FROM auth_users WHERE recovery_token = $lookup LIMIT 1")
            .bind(("lookup", token.to_string()))
            .await?
            .take(0)?;
        Ok(user)
    }

    pub async fn update_auth_user(&self, record: &AuthUserRecord) -> Result<AuthUserRecord> {
        let updated: Option<AuthUserRecord> = self
            .db
            .update((AUTH_USERS, record.user_id.as_str()))
            .content(record)
            .await?;

        updated.ok_or_else(|| anyhow!("Failed to update auth user"))
    }

    pub async fn delete_auth_user(&self, user_id: &str) -> Result<()> {
        let _deleted: Option<AuthUserRecord> = self.db.delete((AUTH_USERS, user_id)).await?;
        Ok(())
    }

    // Profile operations
    pub async fn create_profile(&self, profile: &UserProfile) -> Result<UserProfile> {
        let created: Option<UserProfile> = self
            .db
            .create((PROFILES, profile.user_id.as_str()))
            .content(profile)
            .await?;

        created.ok_or_else(|| anyhow!("Failed to create profile"))
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let profile: Option<UserProfile> = self.db.select((PROFILES, user_id)).await?;
        Ok(profile)
    }

    pub async fn get_profile_by_username(&self, username: &str) -> Result<Option<UserProfile>> {
        let profile: Option<UserProfile> = self
            .db
            .query("SELECT * FROM user_profiles WHERE username = $username LIMIT 1")
            .bind(("username", normalize_username(username)))
            .await?
            .take(0)?;
        Ok(profile)
    }

    /// A username held by `excluding_user` itself still counts as available.
    pub async fn is_username_available(&self, username: &str, excluding_user: Option<&str>) -> Result<bool> {
        let available = match self.get_profile_by_username(username).await? {
            None => true,
            Some(owner) => excluding_user == Some(owner.user_id.as_str()),
        };
        Ok(available)
    }

    pub async fn update_profile(&self, profile: &UserProfile) -> Result<UserProfile> {
        let updated: Option<UserProfile> = self
            .db
            .update((PROFILES, profile.user_id.as_str()))
            .content(profile)
            .await?;

        updated.ok_or_else(|| anyhow!("Failed to update profile"))
    }

    pub async fn apply_subscription_patch(&self, user_id: &str, patch: &SubscriptionPatch) -> Result<UserProfile> {
        self.merge_profile(user_id, patch).await
    }

    pub async fn set_avatar_url(&self, user_id: &str, url: &str) -> Result<UserProfile> {
        self.merge_profile(user_id, serde_json::json!({ "avatar_url": url, "updated_at": chrono::Utc::now() }))
            .await
    }

    pub async fn set_banner_url(&self, user_id: &str, url: &str) -> Result<UserProfile> {
        self.merge_profile(user_id, serde_json::json!({ "banner_url": url, "updated_at": chrono::Utc::now() }))
            .await
    }

    async fn merge_profile<P: Serialize>(&self, user_id: &str, patch: P) -> Result<UserProfile> {
        // merge on a missing record would create it, so check first
        if self.get_profile(user_id).await?.is_none() {
            return Err(anyhow!("Profile not found for user {}", user_id));
        }

        let updated: Option<UserProfile> = self.db.update((PROFILES, user_id)).merge(patch).await?;
        updated.ok_or_else(|| anyhow!("Failed to update profile"))
    }

    // Billing history operations

    pub async fn find_billing_entry(
        &self,
        user_id: &str,
        invoice_id: &str,
        status: BillingStatus,
    ) -> Result<Option<BillingHistoryEntry>> {
        let existing: Option<BillingHistoryEntry> = self
            .db
            .query(
                "SELECT * FROM billing_history WHERE user_id = $user_id AND invoice_id = $invoice_id AND status = $status LIMIT 1",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("invoice_id", invoice_id.to_string()))
            .bind(("status", status.to_string()))
            .await?
            .take(0)?;
        Ok(existing)
    }

    /// Inserting the same (user, invoice, status) twice returns the first row.
    pub async fn insert_billing_entry(&self, entry: NewBillingEntry) -> Result<BillingHistoryEntry> {
        let existing = self
            .find_billing_entry(&entry.user_id, &entry.invoice_id, entry.status)
            .await?;

        if let Some(existing) = existing {
            log::info!(
                "Billing entry for invoice {} ({}) already recorded, skipping insert",
                existing.invoice_id,
                existing.status
            );
            return Ok(existing);
        }

        let entry = BillingHistoryEntry::new(entry);
        let created: Result<Option<BillingHistoryEntry>, surrealdb::Error> = self
            .db
            .create((BILLING, entry.entry_id.as_str()))
            .content(&entry)
            .await;

        match created {
            Ok(created) => created.ok_or_else(|| anyhow!("Failed to insert billing entry")),
            // a concurrent insert of the same row won the unique index
            Err(e) => match self
                .find_billing_entry(&entry.user_id, &entry.invoice_id, entry.status)
                .await?
            {
                Some(existing) => {
                    log::info!(
                        "Billing entry for invoice {} ({}) inserted concurrently, using it",
                        existing.invoice_id,
                        existing.status
                    );
                    Ok(existing)
                }
                None => Err(e.into()),
            },
        }
    }

    /// Newest first.
    pub async fn list_billing_history(&self, user_id: &str) -> Result<Vec<BillingHistoryEntry>> {
        let mut entries: Vec<BillingHistoryEntry> = self
            .db
            .query("SELECT * FROM billing_history WHERE user_id = $user_id")
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// Deletes only rows owned by `user_id`; returns whether a row was removed.
    pub async fn delete_billing_entry(&self, user_id: &str, entry_id: &str) -> Result<bool> {
        let entry: Option<BillingHistoryEntry> = self.db.select((BILLING, entry_id)).await?;
        match entry {
            Some(entry) if entry.user_id == user_id => {
                let _deleted: Option<BillingHistoryEntry> = self.db.delete((BILLING, entry_id)).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // Learning paths
    pub async fn seed_learning_paths(&self, paths: &[LearningPath]) -> Result<usize> {
        let existing: Vec<LearningPath> = self.db.select(LEARNING_PATHS).await?;
        if !existing.is_empty() {
            return Ok(0);
        }

        for path in paths {
            let _created: Option<LearningPath> = self
                .db
                .create((LEARNING_PATHS, path.path_id.as_str()))
                .content(path)
                .await?;
        }
        log::info!("Seeded {} learning paths", paths.len());
        Ok(paths.len())
    }

    pub async fn search_learning_paths(&self, needle: &str, limit: usize) -> Result<Vec<LearningPath>> {
        let mut paths: Vec<LearningPath> = self.db.select(LEARNING_PATHS).await?;
        paths.sort_by(|a, b| a.title.cmp(&b.title));

        let needle = needle.trim();
        Ok(paths
            .into_iter()
            .filter(|p| needle.is_empty() || p.matches(needle))
            .take(limit)
            .collect())
    }

    // Utility methods
    pub async fn health_check(&self) -> Result<()> {
        self.db.health().await?;
        Ok(())
    }

    pub async fn get_statistics(&self) -> Result<DatabaseStats> {
        let profile_count: Vec<serde_json::Value> = self
            .db
            .query("SELECT count() FROM user_profiles GROUP ALL")
            .await?
            .take(0)?;

        let paid_profiles: Vec<serde_json::Value> = self
            .db
            .query("SELECT count() FROM user_profiles WHERE subscription_tier != 'free' GROUP ALL")
            .await?
            .take(0)?;

        let billing_count: Vec<serde_json::Value> = self
            .db
            .query("SELECT count() FROM billing_history GROUP ALL")
            .await?
            .take(0)?;

        Ok(DatabaseStats {
            total_profiles: extract_count(&profile_count),
            paid_profiles: extract_count(&paid_profiles),
            billing_entries: extract_count(&billing_count),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DatabaseStats {
    pub total_profiles: u64,
    pub paid_profiles: u64,
    pub billing_entries: u64,
}

fn extract_count(result: &[serde_json::Value]) -> u64 {
    result
        .first()
        .and_then(|v| v.get("count"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}
