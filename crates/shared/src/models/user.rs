//! User: identity plus billing state

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{SubscriptionStatus, UserRole};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub name: String,
    pub provider: String,
    pub role: String,
    pub is_active: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: String,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    pub price_id: Option<String>,
    pub subscription_updated_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// Fields for a new credentials-provider account
#[derive(Debug)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub name: &'a str,
    pub provider: &'a str,
}

/// Partial subscription state applied by the Stripe reconciler.
///
/// `None` fields are left untouched; `subscription_updated_at` is always
/// bumped.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionUpdate {
    pub stripe_subscription_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: Option<bool>,
    pub price_id: Option<String>,
}

const USER_COLUMNS: &str = "id, email, password_hash, name, provider, role, is_active, \
     stripe_customer_id, stripe_subscription_id, subscription_status, \
     current_period_start, current_period_end, cancel_at_period_end, \
     price_id, subscription_updated_at, created_at";

impl User {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::parse(&self.subscription_status).unwrap_or(SubscriptionStatus::None)
    }

    pub fn has_active_subscription(&self) -> bool {
        self.status().is_active()
    }

    pub fn is_admin(&self) -> bool {
        UserRole::parse(&self.role) == Some(UserRole::Admin)
    }

    /// Admins bypass the subscription check.
    pub fn can_access_platform(&self) -> bool {
        self.is_admin() || self.has_active_subscription()
    }

    pub async fn insert(pool: &PgPool, new: NewUser<'_>) -> Result<User, sqlx::Error> {
        let sql = format!(
            "INSERT INTO users (email, password_hash, name, provider) \
             VALUES (LOWER($1), $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as(&sql)
            .bind(new.email)
            .bind(new.password_hash)
            .bind(new.name)
            .bind(new.provider)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as(&sql).bind(id).fetch_optional(pool).await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = LOWER($1)");
        sqlx::query_as(&sql).bind(email).fetch_optional(pool).await
    }

    pub async fn find_by_stripe_customer_id(
        pool: &PgPool,
        customer_id: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE stripe_customer_id = $1");
        sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_stripe_subscription_id(
        pool: &PgPool,
        subscription_id: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE stripe_subscription_id = $1");
        sqlx::query_as(&sql)
            .bind(subscription_id)
            .fetch_optional(pool)
            .await
    }

    /// Heal write: persist the Stripe customer id a fallback lookup found,
    /// so future lookups by the primary key succeed.
    pub async fn set_stripe_customer_id(
        pool: &PgPool,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(customer_id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Apply a partial subscription update; untouched fields keep their
    /// stored values.
    pub async fn update_subscription(
        pool: &PgPool,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users SET
                stripe_subscription_id = COALESCE($1, stripe_subscription_id),
                subscription_status = COALESCE($2, subscription_status),
                current_period_start = COALESCE($3, current_period_start),
                current_period_end = COALESCE($4, current_period_end),
                cancel_at_period_end = COALESCE($5, cancel_at_period_end),
                price_id = COALESCE($6, price_id),
                subscription_updated_at = NOW(),
                updated_at = NOW()
            WHERE id = $7
            "#,
        )
        .bind(update.stripe_subscription_id.as_deref())
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.current_period_start)
        .bind(update.current_period_end)
        .bind(update.cancel_at_period_end)
        .bind(update.price_id.as_deref())
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Reset subscription state to `none` (subscription deleted).
    pub async fn clear_subscription(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users SET
                stripe_subscription_id = NULL,
                subscription_status = 'none',
                current_period_start = NULL,
                current_period_end = NULL,
                cancel_at_period_end = FALSE,
                price_id = NULL,
                subscription_updated_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(role: &str, status: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: "cap@example.com".into(),
            password_hash: None,
            name: "Cap".into(),
            provider: "credentials".into(),
            role: role.into(),
            is_active: true,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_status: status.into(),
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            price_id: None,
            subscription_updated_at: OffsetDateTime::now_utc(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn trialing_counts_as_active_subscription() {
        assert!(user_with("captain", "trialing").has_active_subscription());
        assert!(!user_with("captain", "past_due").has_active_subscription());
    }

    #[test]
    fn admin_bypasses_subscription_check() {
        assert!(user_with("admin", "none").can_access_platform());
        assert!(!user_with("captain", "none").can_access_platform());
        assert!(user_with("captain", "active").can_access_platform());
    }

    #[test]
    fn unknown_status_text_is_treated_as_none() {
        assert_eq!(user_with("captain", "garbage").status(), SubscriptionStatus::None);
    }
}
