//! Stripe event to user resolution
//!
//! Subscription events do not reliably carry our user id, so attribution
//! is a declared cascade of strategies tried in order: the stored
//! subscription id, then the Stripe customer id, then the userEmail we
//! stamp into subscription metadata at checkout. Fallback hits heal the
//! user row so the next event resolves on the first try.
//!
//! Identifier extraction and strategy selection are pure; the async
//! resolvers only walk the candidate list and run the lookups.

use charterline_shared::models::User;
use sqlx::PgPool;
use stripe::{Expandable, Invoice, Object, Subscription};

use crate::error::BillingResult;

/// Which strategy attributed the event, recorded in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPath {
    SubscriptionId,
    CustomerId,
    MetadataEmail,
}

impl ResolutionPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionPath::SubscriptionId => "subscription_id",
            ResolutionPath::CustomerId => "customer_id",
            ResolutionPath::MetadataEmail => "metadata_email",
        }
    }

    /// Only an email hit heals the stored customer id: the other two
    /// paths already matched on an id we have on file.
    pub fn heals_customer_id(self) -> bool {
        matches!(self, ResolutionPath::MetadataEmail)
    }
}

pub fn expandable_id<T: Object>(expandable: &Expandable<T>) -> String
where
    T::Id: std::fmt::Display,
{
    match expandable {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(object) => object.id().to_string(),
    }
}

/// Everything a subscription event offers for attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionIdentifiers {
    pub subscription_id: String,
    pub customer_id: String,
    pub metadata_email: Option<String>,
}

impl SubscriptionIdentifiers {
    pub fn from_subscription(subscription: &Subscription) -> Self {
        Self {
            subscription_id: subscription.id.to_string(),
            customer_id: expandable_id(&subscription.customer),
            metadata_email: normalize_metadata_email(
                subscription.metadata.get("userEmail").map(String::as_str),
            ),
        }
    }

    /// Strategies to try, in order. The email fallback is only a
    /// candidate when checkout stamped one into the metadata.
    pub fn candidate_paths(&self) -> Vec<ResolutionPath> {
        let mut paths = vec![ResolutionPath::SubscriptionId, ResolutionPath::CustomerId];
        if self.metadata_email.is_some() {
            paths.push(ResolutionPath::MetadataEmail);
        }
        paths
    }
}

/// Checkout never writes an empty userEmail, but a dashboard metadata
/// edit can; treat it as absent.
fn normalize_metadata_email(email: Option<&str>) -> Option<String> {
    email.filter(|email| !email.is_empty()).map(String::from)
}

/// Invoices carry no metadata of ours, so the cascade stops after the
/// customer id; both ids are optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceIdentifiers {
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
}

impl InvoiceIdentifiers {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        Self {
            subscription_id: invoice.subscription.as_ref().map(expandable_id),
            customer_id: invoice.customer.as_ref().map(expandable_id),
        }
    }

    pub fn candidate_paths(&self) -> Vec<ResolutionPath> {
        let mut paths = Vec::new();
        if self.subscription_id.is_some() {
            paths.push(ResolutionPath::SubscriptionId);
        }
        if self.customer_id.is_some() {
            paths.push(ResolutionPath::CustomerId);
        }
        paths
    }
}

/// Attribute a subscription event to a user.
pub async fn resolve_user_for_subscription(
    pool: &PgPool,
    subscription: &Subscription,
) -> BillingResult<Option<(User, ResolutionPath)>> {
    let ids = SubscriptionIdentifiers::from_subscription(subscription);

    for path in ids.candidate_paths() {
        let user = match path {
            ResolutionPath::SubscriptionId => {
                User::find_by_stripe_subscription_id(pool, &ids.subscription_id).await?
            }
            ResolutionPath::CustomerId => {
                User::find_by_stripe_customer_id(pool, &ids.customer_id).await?
            }
            ResolutionPath::MetadataEmail => match ids.metadata_email.as_deref() {
                Some(email) => User::find_by_email(pool, email).await?,
                None => None,
            },
        };
        let Some(user) = user else { continue };

        if path.heals_customer_id() {
            // Heal so the next event resolves without the fallback.
            User::set_stripe_customer_id(pool, user.id, &ids.customer_id).await?;
        }
        if path != ResolutionPath::SubscriptionId {
            tracing::info!(
                user_id = %user.id,
                subscription_id = %ids.subscription_id,
                path = path.as_str(),
                "resolved subscription event via fallback"
            );
        }
        return Ok(Some((user, path)));
    }

    tracing::warn!(
        subscription_id = %ids.subscription_id,
        customer_id = %ids.customer_id,
        "subscription event could not be attributed to a user"
    );
    Ok(None)
}

/// Attribute an invoice event to a user.
pub async fn resolve_user_for_invoice(
    pool: &PgPool,
    invoice: &Invoice,
) -> BillingResult<Option<(User, ResolutionPath)>> {
    let ids = InvoiceIdentifiers::from_invoice(invoice);

    for path in ids.candidate_paths() {
        let user = match path {
            ResolutionPath::SubscriptionId => match ids.subscription_id.as_deref() {
                Some(subscription_id) => {
                    User::find_by_stripe_subscription_id(pool, subscription_id).await?
                }
                None => None,
            },
            ResolutionPath::CustomerId => match ids.customer_id.as_deref() {
                Some(customer_id) => User::find_by_stripe_customer_id(pool, customer_id).await?,
                None => None,
            },
            ResolutionPath::MetadataEmail => None,
        };
        if let Some(user) = user {
            return Ok(Some((user, path)));
        }
    }

    tracing::warn!(
        invoice_id = %invoice.id,
        "invoice event could not be attributed to a user"
    );
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription_ids(email: Option<&str>) -> SubscriptionIdentifiers {
        SubscriptionIdentifiers {
            subscription_id: "sub_123".into(),
            customer_id: "cus_456".into(),
            metadata_email: email.map(String::from),
        }
    }

    #[test]
    fn subscription_cascade_tries_stored_id_then_customer_then_email() {
        let ids = subscription_ids(Some("captain@example.com"));
        assert_eq!(
            ids.candidate_paths(),
            vec![
                ResolutionPath::SubscriptionId,
                ResolutionPath::CustomerId,
                ResolutionPath::MetadataEmail,
            ]
        );
    }

    #[test]
    fn subscription_without_metadata_email_skips_the_email_fallback() {
        let ids = subscription_ids(None);
        assert_eq!(
            ids.candidate_paths(),
            vec![ResolutionPath::SubscriptionId, ResolutionPath::CustomerId]
        );
    }

    #[test]
    fn empty_metadata_email_is_treated_as_absent() {
        assert_eq!(normalize_metadata_email(None), None);
        assert_eq!(normalize_metadata_email(Some("")), None);
        assert_eq!(
            normalize_metadata_email(Some("captain@example.com")).as_deref(),
            Some("captain@example.com")
        );
    }

    #[test]
    fn only_the_email_path_heals_the_customer_id() {
        assert!(!ResolutionPath::SubscriptionId.heals_customer_id());
        assert!(!ResolutionPath::CustomerId.heals_customer_id());
        assert!(ResolutionPath::MetadataEmail.heals_customer_id());
    }

    #[test]
    fn invoice_cascade_stops_after_customer_id() {
        let ids = InvoiceIdentifiers {
            subscription_id: Some("sub_123".into()),
            customer_id: Some("cus_456".into()),
        };
        assert_eq!(
            ids.candidate_paths(),
            vec![ResolutionPath::SubscriptionId, ResolutionPath::CustomerId]
        );
    }

    #[test]
    fn invoice_missing_ids_yields_no_candidates() {
        let ids = InvoiceIdentifiers {
            subscription_id: None,
            customer_id: None,
        };
        assert!(ids.candidate_paths().is_empty());

        let customer_only = InvoiceIdentifiers {
            subscription_id: None,
            customer_id: Some("cus_456".into()),
        };
        assert_eq!(
            customer_only.candidate_paths(),
            vec![ResolutionPath::CustomerId]
        );
    }
}
