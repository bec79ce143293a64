//! Customer: booking-intent profile keyed on (captain_id, phone_number)

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub captain_id: Uuid,
    pub customer_name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub preferred_dates: Vec<String>,
    pub party_size: Option<i32>,
    pub trip_type: Option<String>,
    pub experience: Option<String>,
    pub special_requests: Option<String>,
    pub budget: Option<String>,
    pub callback_requested: bool,
    pub urgency: String,
    pub total_calls: i32,
    pub last_call_date: OffsetDateTime,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Sanitized booking-intent fields from one `collect_customer_info` tool
/// call. `None` means absent-or-empty in the payload; a `None` field never
/// erases stored data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerPatch {
    pub customer_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub preferred_dates: Option<Vec<String>>,
    pub party_size: Option<i32>,
    pub trip_type: Option<String>,
    pub experience: Option<String>,
    pub special_requests: Option<String>,
    pub budget: Option<String>,
    pub callback_requested: Option<bool>,
    pub urgency: Option<String>,
}

const CUSTOMER_COLUMNS: &str = "id, captain_id, customer_name, phone_number, email, preferred_dates, \
     party_size, trip_type, experience, special_requests, budget, \
     callback_requested, urgency, total_calls, last_call_date, status, \
     notes, created_at";

impl Customer {
    /// Atomic per-field merge upsert.
    ///
    /// Insert creates the customer with `total_calls = 1` and status `new`;
    /// conflict on (captain_id, phone_number) keeps any stored value a
    /// `None` patch field would erase, bumps `total_calls` by exactly 1,
    /// and refreshes `last_call_date`. The counter deliberately counts
    /// every delivery, duplicates included (per-delivery engagement
    /// counting). Returns the post-write `total_calls`.
    pub async fn upsert_from_patch(
        pool: &PgPool,
        captain_id: Uuid,
        phone_number: &str,
        patch: &CustomerPatch,
    ) -> Result<i32, sqlx::Error> {
        let (total_calls,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO customers (
                captain_id, customer_name, phone_number, email,
                preferred_dates, party_size, trip_type, experience,
                special_requests, budget, callback_requested, urgency,
                total_calls, last_call_date, status
            )
            VALUES (
                $1, COALESCE($3, 'Unknown'), $2, $4,
                COALESCE($5, ARRAY[]::TEXT[]), $6, $7, $8,
                $9, $10, COALESCE($11, FALSE), COALESCE($12, 'medium'),
                1, NOW(), 'new'
            )
            ON CONFLICT (captain_id, phone_number) DO UPDATE SET
                customer_name = COALESCE($3, customers.customer_name),
                email = COALESCE($4, customers.email),
                preferred_dates = COALESCE($5, customers.preferred_dates),
                party_size = COALESCE($6, customers.party_size),
                trip_type = COALESCE($7, customers.trip_type),
                experience = COALESCE($8, customers.experience),
                special_requests = COALESCE($9, customers.special_requests),
                budget = COALESCE($10, customers.budget),
                callback_requested = COALESCE($11, customers.callback_requested),
                urgency = COALESCE($12, customers.urgency),
                total_calls = customers.total_calls + 1,
                last_call_date = NOW(),
                updated_at = NOW()
            RETURNING total_calls
            "#,
        )
        .bind(captain_id)
        .bind(phone_number)
        .bind(patch.customer_name.as_deref())
        .bind(patch.email.as_deref())
        .bind(patch.preferred_dates.as_deref())
        .bind(patch.party_size)
        .bind(patch.trip_type.as_deref())
        .bind(patch.experience.as_deref())
        .bind(patch.special_requests.as_deref())
        .bind(patch.budget.as_deref())
        .bind(patch.callback_requested)
        .bind(patch.urgency.as_deref())
        .fetch_one(pool)
        .await?;
        Ok(total_calls)
    }

    pub async fn list_for_captain(
        pool: &PgPool,
        captain_id: Uuid,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Customer>, sqlx::Error> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers \
             WHERE captain_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY last_call_date DESC LIMIT $3"
        );
        sqlx::query_as(&sql)
            .bind(captain_id)
            .bind(status)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Dashboard pipeline update (status / notes).
    pub async fn update_status(
        pool: &PgPool,
        customer_id: Uuid,
        captain_id: Uuid,
        status: Option<&str>,
        notes: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE customers SET status = COALESCE($1, status), \
             notes = COALESCE($2, notes), updated_at = NOW() \
             WHERE id = $3 AND captain_id = $4",
        )
        .bind(status)
        .bind(notes)
        .bind(customer_id)
        .bind(captain_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
