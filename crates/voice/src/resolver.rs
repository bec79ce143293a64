//! Assistant-to-captain resolution
//!
//! Every VAPI event is attributed through the assistant id bound to the
//! inbound phone number. A miss is silent from the caller's point of view
//! (the webhook still acknowledges), but we log enough here to tell an
//! unknown assistant apart from a lapsed captain.

use charterline_shared::models::Captain;
use sqlx::PgPool;

use crate::error::VoiceResult;

/// Resolve the active captain behind an assistant id, or `None` when the
/// event should be dropped.
pub async fn resolve_active_captain(
    pool: &PgPool,
    assistant_id: &str,
) -> VoiceResult<Option<Captain>> {
    if let Some(captain) = Captain::find_active_by_assistant_id(pool, assistant_id).await? {
        return Ok(Some(captain));
    }

    // Diagnose why the lookup missed before dropping the event.
    match Captain::find_any_by_assistant_id(pool, assistant_id).await? {
        Some(inactive) => {
            tracing::warn!(
                assistant_id = %assistant_id,
                captain_id = %inactive.id,
                service_enabled = inactive.service_enabled,
                subscription_active = inactive.subscription_active,
                "dropping event for inactive captain"
            );
        }
        None => {
            tracing::warn!(
                assistant_id = %assistant_id,
                "dropping event for unknown assistant"
            );
        }
    }
    Ok(None)
}
