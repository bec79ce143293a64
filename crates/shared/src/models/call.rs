//! Call: one record per telephony session
//!
//! `call_id` is provider-assigned and globally unique; it is the key every
//! webhook reconciliation path hangs off, so creation paths are
//! single-statement upserts rather than find-then-insert.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::customer::CustomerPatch;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Call {
    pub id: Uuid,
    pub call_id: String,
    pub captain_id: Uuid,
    pub assistant_id: String,
    pub customer_phone: String,
    pub status: String,
    pub started_at: OffsetDateTime,
    pub ended_at: Option<OffsetDateTime>,
    pub duration_secs: Option<i32>,
    pub cost: Option<f64>,
    pub transcript: Option<String>,
    pub recording_url: Option<String>,
    pub ended_reason: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub preferred_dates: Vec<String>,
    pub party_size: Option<i32>,
    pub trip_type: Option<String>,
    pub experience: Option<String>,
    pub special_requests: Option<String>,
    pub budget: Option<String>,
    pub callback_requested: Option<bool>,
    pub urgency: Option<String>,
    pub sms_sent: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct NewCall<'a> {
    pub call_id: &'a str,
    pub captain_id: Uuid,
    pub assistant_id: &'a str,
    pub customer_phone: &'a str,
    pub started_at: OffsetDateTime,
}

/// Terminal fields applied when a call completes
#[derive(Debug)]
pub struct CallCompletion<'a> {
    pub ended_at: OffsetDateTime,
    pub duration_secs: i32,
    pub cost: Option<f64>,
    pub recording_url: Option<&'a str>,
    pub ended_reason: Option<&'a str>,
}

const CALL_COLUMNS: &str = "id, call_id, captain_id, assistant_id, customer_phone, status, \
     started_at, ended_at, duration_secs, cost, transcript, recording_url, \
     ended_reason, customer_name, customer_email, preferred_dates, \
     party_size, trip_type, experience, special_requests, budget, \
     callback_requested, urgency, sms_sent, created_at";

impl Call {
    /// Record a call-started event. A duplicate delivery for the same
    /// call_id is a no-op (returns false).
    pub async fn insert_started(pool: &PgPool, new: NewCall<'_>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO calls (call_id, captain_id, assistant_id, customer_phone, status, started_at)
            VALUES ($1, $2, $3, $4, 'in-progress', $5)
            ON CONFLICT (call_id) DO NOTHING
            "#,
        )
        .bind(new.call_id)
        .bind(new.captain_id)
        .bind(new.assistant_id)
        .bind(new.customer_phone)
        .bind(new.started_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_call_id(
        pool: &PgPool,
        call_id: &str,
        captain_id: Uuid,
    ) -> Result<Option<Call>, sqlx::Error> {
        let sql = format!("SELECT {CALL_COLUMNS} FROM calls WHERE call_id = $1 AND captain_id = $2");
        sqlx::query_as(&sql)
            .bind(call_id)
            .bind(captain_id)
            .fetch_optional(pool)
            .await
    }

    /// Mark the call completed. Duration is supplied by the caller,
    /// recomputed from the stored timestamps rather than trusted from the
    /// provider payload.
    pub async fn complete(
        pool: &PgPool,
        call_id: &str,
        captain_id: Uuid,
        completion: CallCompletion<'_>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE calls SET
                status = 'completed',
                ended_at = $1,
                duration_secs = $2,
                cost = COALESCE($3, cost),
                recording_url = COALESCE($4, recording_url),
                ended_reason = COALESCE($5, ended_reason),
                updated_at = NOW()
            WHERE call_id = $6 AND captain_id = $7
            "#,
        )
        .bind(completion.ended_at)
        .bind(completion.duration_secs)
        .bind(completion.cost)
        .bind(completion.recording_url)
        .bind(completion.ended_reason)
        .bind(call_id)
        .bind(captain_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the transcript wholesale — last value wins, no merge.
    pub async fn set_transcript(
        pool: &PgPool,
        call_id: &str,
        captain_id: Uuid,
        transcript: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE calls SET transcript = $1, updated_at = NOW() \
             WHERE call_id = $2 AND captain_id = $3",
        )
        .bind(transcript)
        .bind(call_id)
        .bind(captain_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Attach collected customer data to the call, synthesizing a completed
    /// record when the call-started event was missed or arrived out of
    /// order. Customer fields are overwritten wholesale on the call record;
    /// the transcript is only replaced by a non-empty one.
    pub async fn apply_customer_data(
        pool: &PgPool,
        call_id: &str,
        captain_id: Uuid,
        assistant_id: &str,
        patch: &CustomerPatch,
        transcript: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO calls (
                call_id, captain_id, assistant_id, customer_phone, status,
                started_at, ended_at, duration_secs, transcript,
                customer_name, customer_email, preferred_dates, party_size,
                trip_type, experience, special_requests, budget,
                callback_requested, urgency
            )
            VALUES (
                $1, $2, $3, COALESCE($4, 'unknown'), 'completed',
                NOW(), NOW(), 0, $5,
                $6, $7, COALESCE($8, ARRAY[]::TEXT[]), $9,
                $10, $11, $12, $13, $14, $15
            )
            ON CONFLICT (call_id) DO UPDATE SET
                transcript = COALESCE(EXCLUDED.transcript, calls.transcript),
                customer_name = EXCLUDED.customer_name,
                customer_email = EXCLUDED.customer_email,
                preferred_dates = EXCLUDED.preferred_dates,
                party_size = EXCLUDED.party_size,
                trip_type = EXCLUDED.trip_type,
                experience = EXCLUDED.experience,
                special_requests = EXCLUDED.special_requests,
                budget = EXCLUDED.budget,
                callback_requested = EXCLUDED.callback_requested,
                urgency = EXCLUDED.urgency,
                updated_at = NOW()
            "#,
        )
        .bind(call_id)
        .bind(captain_id)
        .bind(assistant_id)
        .bind(patch.phone_number.as_deref())
        .bind(transcript)
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
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Atomically claim the single SMS attempt for this call.
    ///
    /// Returns true exactly once per call; concurrent deliveries race the
    /// same UPDATE and only one sees a row change.
    pub async fn claim_sms(
        pool: &PgPool,
        call_id: &str,
        captain_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE calls SET sms_sent = TRUE, updated_at = NOW() \
             WHERE call_id = $1 AND captain_id = $2 AND NOT sms_sent",
        )
        .bind(call_id)
        .bind(captain_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_captain(
        pool: &PgPool,
        captain_id: Uuid,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Call>, sqlx::Error> {
        let sql = format!(
            "SELECT {CALL_COLUMNS} FROM calls \
             WHERE captain_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY started_at DESC LIMIT $3"
        );
        sqlx::query_as(&sql)
            .bind(captain_id)
            .bind(status)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
