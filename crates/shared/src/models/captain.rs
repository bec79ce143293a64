//! Captain: business profile plus telephony/assistant bindings

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Captain {
    pub id: Uuid,
    pub user_id: Uuid,
    pub captain_name: String,
    pub business_name: String,
    pub phone_number: String,
    pub email: String,
    pub location: String,
    pub seasonal_info: String,
    pub trip_types: Vec<String>,
    pub boat_info: String,
    pub pricing_info: String,
    pub custom_instructions: String,
    pub sms_opt_in: bool,
    pub service_enabled: bool,
    pub subscription_active: bool,
    pub vapi_assistant_id: Option<String>,
    pub twilio_phone_number: Option<String>,
    pub twilio_sid: Option<String>,
    pub twilio_status: String,
    pub number_assistant_id: Option<String>,
    pub vapi_phone_number_id: Option<String>,
    pub vapi_phone_number: Option<String>,
    pub vapi_integration_status: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct NewCaptain<'a> {
    pub user_id: Uuid,
    pub captain_name: &'a str,
    pub business_name: &'a str,
    pub phone_number: &'a str,
    pub email: &'a str,
    pub location: &'a str,
    pub trip_types: &'a [String],
}

/// Editable profile fields; `None` leaves the stored value alone.
#[derive(Debug, Default, serde::Deserialize)]
pub struct CaptainProfileUpdate {
    pub captain_name: Option<String>,
    pub business_name: Option<String>,
    pub location: Option<String>,
    pub seasonal_info: Option<String>,
    pub trip_types: Option<Vec<String>>,
    pub boat_info: Option<String>,
    pub pricing_info: Option<String>,
    pub custom_instructions: Option<String>,
}

/// Result of a Twilio number purchase
#[derive(Debug)]
pub struct TwilioNumberUpdate<'a> {
    pub phone_number: &'a str,
    pub sid: &'a str,
    pub status: &'a str,
}

/// Result of importing the number into VAPI and binding an assistant
#[derive(Debug)]
pub struct VapiBinding<'a> {
    pub assistant_id: &'a str,
    pub vapi_phone_number_id: &'a str,
    pub vapi_phone_number: Option<&'a str>,
    pub integration_status: &'a str,
}

const CAPTAIN_COLUMNS: &str = "id, user_id, captain_name, business_name, phone_number, email, \
     location, seasonal_info, trip_types, boat_info, pricing_info, \
     custom_instructions, sms_opt_in, service_enabled, subscription_active, \
     vapi_assistant_id, twilio_phone_number, twilio_sid, twilio_status, \
     number_assistant_id, vapi_phone_number_id, vapi_phone_number, \
     vapi_integration_status, created_at";

impl Captain {
    pub async fn insert(pool: &PgPool, new: NewCaptain<'_>) -> Result<Captain, sqlx::Error> {
        let sql = format!(
            "INSERT INTO captains \
             (user_id, captain_name, business_name, phone_number, email, location, trip_types) \
             VALUES ($1, $2, $3, $4, LOWER($5), $6, $7) RETURNING {CAPTAIN_COLUMNS}"
        );
        sqlx::query_as(&sql)
            .bind(new.user_id)
            .bind(new.captain_name)
            .bind(new.business_name)
            .bind(new.phone_number)
            .bind(new.email)
            .bind(new.location)
            .bind(new.trip_types)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_user_id(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Captain>, sqlx::Error> {
        let sql = format!("SELECT {CAPTAIN_COLUMNS} FROM captains WHERE user_id = $1");
        sqlx::query_as(&sql).bind(user_id).fetch_optional(pool).await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Captain>, sqlx::Error> {
        let sql = format!("SELECT {CAPTAIN_COLUMNS} FROM captains WHERE id = $1");
        sqlx::query_as(&sql).bind(id).fetch_optional(pool).await
    }

    /// Resolve the captain serving a VAPI assistant.
    ///
    /// Calls are only processed for captains whose service is enabled and
    /// whose subscription is active; a lapsed captain is a deliberate miss
    /// even though the assistant still exists on the provider side.
    pub async fn find_active_by_assistant_id(
        pool: &PgPool,
        assistant_id: &str,
    ) -> Result<Option<Captain>, sqlx::Error> {
        let sql = format!(
            "SELECT {CAPTAIN_COLUMNS} FROM captains \
             WHERE number_assistant_id = $1 AND service_enabled AND subscription_active"
        );
        sqlx::query_as(&sql)
            .bind(assistant_id)
            .fetch_optional(pool)
            .await
    }

    /// Diagnostic lookup ignoring the activity flags, used to log why an
    /// event was dropped.
    pub async fn find_any_by_assistant_id(
        pool: &PgPool,
        assistant_id: &str,
    ) -> Result<Option<Captain>, sqlx::Error> {
        let sql = format!("SELECT {CAPTAIN_COLUMNS} FROM captains WHERE number_assistant_id = $1");
        sqlx::query_as(&sql)
            .bind(assistant_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn update_profile(
        pool: &PgPool,
        captain_id: Uuid,
        update: &CaptainProfileUpdate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE captains SET
                captain_name = COALESCE($1, captain_name),
                business_name = COALESCE($2, business_name),
                location = COALESCE($3, location),
                seasonal_info = COALESCE($4, seasonal_info),
                trip_types = COALESCE($5, trip_types),
                boat_info = COALESCE($6, boat_info),
                pricing_info = COALESCE($7, pricing_info),
                custom_instructions = COALESCE($8, custom_instructions),
                updated_at = NOW()
            WHERE id = $9
            "#,
        )
        .bind(update.captain_name.as_deref())
        .bind(update.business_name.as_deref())
        .bind(update.location.as_deref())
        .bind(update.seasonal_info.as_deref())
        .bind(update.trip_types.as_deref())
        .bind(update.boat_info.as_deref())
        .bind(update.pricing_info.as_deref())
        .bind(update.custom_instructions.as_deref())
        .bind(captain_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_sms_opt_in(
        pool: &PgPool,
        captain_id: Uuid,
        opt_in: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE captains SET sms_opt_in = $1, updated_at = NOW() WHERE id = $2")
            .bind(opt_in)
            .bind(captain_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Mirror the owning user's subscription state onto the captain.
    ///
    /// Returns false when the user has no captain yet (onboarding may
    /// complete after billing) — that is a no-op, not an error.
    pub async fn set_subscription_active_for_user(
        pool: &PgPool,
        user_id: Uuid,
        active: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE captains SET subscription_active = $1, updated_at = NOW() WHERE user_id = $2",
        )
        .bind(active)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_vapi_assistant_id(
        pool: &PgPool,
        captain_id: Uuid,
        assistant_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE captains SET vapi_assistant_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(assistant_id)
            .bind(captain_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_twilio_number(
        pool: &PgPool,
        captain_id: Uuid,
        update: TwilioNumberUpdate<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE captains SET
                twilio_phone_number = $1,
                twilio_sid = $2,
                twilio_status = $3,
                twilio_purchased_at = NOW(),
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(update.phone_number)
        .bind(update.sid)
        .bind(update.status)
        .bind(captain_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_vapi_binding(
        pool: &PgPool,
        captain_id: Uuid,
        binding: VapiBinding<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE captains SET
                number_assistant_id = $1,
                vapi_phone_number_id = $2,
                vapi_phone_number = COALESCE($3, vapi_phone_number),
                vapi_integration_status = $4,
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(binding.assistant_id)
        .bind(binding.vapi_phone_number_id)
        .bind(binding.vapi_phone_number)
        .bind(binding.integration_status)
        .bind(captain_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
