//! Purchase reconciliation.
//!
//! A completed checkout reaches the backend through two independent paths:
//! the Stripe webhook delivery and the success page polling the verification
//! endpoint. Both funnel into [`reconcile`], which must therefore be safe to
//! run any number of times for the same checkout session.
//!
//! The idempotency boundary is the purchases row: its UNIQUE session id
//! constraint means exactly one caller records the purchase and grants
//! access, every other caller observes [`ReconcileOutcome::AlreadyProcessed`].

use rusqlite::Connection;

use crate::accounts::{self, ProvisionedAccount};
use crate::db::queries;
use crate::error::AppError;
use crate::models::{ContentType, CreateContentAccess, CreatePurchase, ProductType, Purchase};
use crate::payments::{CheckoutMetadata, ContentGrant, StripeCheckoutSession};
use crate::util::expiry_from_days;

/// Default access window for a purchase.
pub const DEFAULT_ACCESS_DAYS: i64 = 365;

/// Everything reconciliation needs from a checkout session, regardless of
/// whether it arrived via webhook payload or API retrieval.
#[derive(Debug, Clone)]
pub struct CheckoutDescriptor {
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub amount_total: i64,
    pub currency: String,
    pub metadata: Option<CheckoutMetadata>,
}

impl CheckoutDescriptor {
    pub fn from_session(session: &StripeCheckoutSession) -> Self {
        Self {
            session_id: session.id.clone(),
            payment_intent_id: session.payment_intent.clone(),
            customer_id: session.customer.clone(),
            customer_email: session.customer_email().map(String::from),
            // A fully discounted session can come back without a total
            amount_total: session.amount_total.unwrap_or(0),
            currency: session
                .currency
                .clone()
                .unwrap_or_else(|| "eur".to_string()),
            metadata: session.metadata.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The session lacks a field reconciliation cannot proceed without.
    /// Retrying the same payload can never succeed.
    #[error("missing required checkout field: {0}")]
    MissingMetadata(&'static str),
    /// A metadata field was present but unusable (bad JSON, unknown enum value)
    #[error("invalid checkout metadata: {0}")]
    InvalidMetadata(String),
    #[error(transparent)]
    Db(#[from] AppError),
}

impl From<rusqlite::Error> for ReconcileError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Db(AppError::Database(e))
    }
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    /// This call recorded the purchase and granted access.
    Completed {
        purchase: Purchase,
        user_id: String,
        customer_email: String,
        /// True when the account was provisioned by this purchase
        new_account: bool,
        /// Plaintext temporary password for the welcome email, when one was issued
        temp_password: Option<String>,
        grants_created: usize,
    },
    /// Another caller already recorded this session. Nothing was changed.
    AlreadyProcessed { purchase: Purchase },
}

/// The validated, decoded fields of a checkout's metadata bag.
struct ValidatedCheckout<'a> {
    product_id: &'a str,
    product_name: &'a str,
    product_type: ProductType,
    course_type: String,
    grants: Vec<ContentGrant>,
}

fn validate_metadata(data: &CheckoutDescriptor) -> Result<ValidatedCheckout<'_>, ReconcileError> {
    let metadata = data
        .metadata
        .as_ref()
        .ok_or(ReconcileError::MissingMetadata("metadata"))?;

    let product_id = metadata
        .product_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(ReconcileError::MissingMetadata("productId"))?;
    let product_name = metadata
        .product_name
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(ReconcileError::MissingMetadata("productName"))?;
    let product_type: ProductType = metadata
        .product_type
        .as_deref()
        .ok_or(ReconcileError::MissingMetadata("productType"))?
        .parse()
        .map_err(|_| {
            ReconcileError::InvalidMetadata(format!(
                "unknown productType: {:?}",
                metadata.product_type
            ))
        })?;

    let grants = decode_grants(metadata)?;
    let course_type = metadata
        .course_type
        .clone()
        .or_else(|| grants.iter().find_map(|g| g.course_type.clone()))
        .ok_or(ReconcileError::MissingMetadata("courseType"))?;

    Ok(ValidatedCheckout {
        product_id,
        product_name,
        product_type,
        course_type,
        grants,
    })
}

/// Decode the JSON-encoded grant list from metadata.
///
/// An absent or empty list is not an error here; the caller substitutes the
/// fallback grant. Malformed JSON is an error: granting a guessed subset of
/// a corrupted list would silently underfulfill the purchase.
fn decode_grants(metadata: &CheckoutMetadata) -> Result<Vec<ContentGrant>, ReconcileError> {
    match metadata.content_access.as_deref() {
        None | Some("") => Ok(Vec::new()),
        Some(json) => serde_json::from_str(json)
            .map_err(|e| ReconcileError::InvalidMetadata(format!("contentAccess: {}", e))),
    }
}

/// Process a paid checkout session, idempotently.
///
/// Safe to call concurrently from the webhook handler and the verification
/// endpoint for the same session. On success the purchase row and all its
/// access grants are committed atomically; notifications are the caller's
/// responsibility and happen after commit.
pub fn reconcile(
    conn: &mut Connection,
    data: &CheckoutDescriptor,
    access_days: i64,
) -> Result<ReconcileOutcome, ReconcileError> {
    // Fast path: a replayed event does no account or validation work
    if let Some(purchase) = queries::get_purchase_by_session(conn, &data.session_id)? {
        tracing::info!(session_id = %data.session_id, "Checkout already reconciled, skipping");
        return Ok(ReconcileOutcome::AlreadyProcessed { purchase });
    }

    let checkout = validate_metadata(data)?;
    let email = data
        .customer_email
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(ReconcileError::MissingMetadata("customer email"))?;

    let ProvisionedAccount {
        user_id,
        is_new,
        temp_password,
    } = accounts::provision_account(conn, email, data.customer_id.as_deref())?;

    let expires_at = expiry_from_days(queries::now(), access_days);

    let tx = conn.transaction()?;

    let Some(purchase) = queries::try_insert_purchase(
        &tx,
        &CreatePurchase {
            user_id: user_id.clone(),
            stripe_session_id: data.session_id.clone(),
            stripe_payment_intent_id: data.payment_intent_id.clone(),
            product_id: checkout.product_id.to_string(),
            product_name: checkout.product_name.to_string(),
            product_type: checkout.product_type,
            course_type: checkout.course_type.clone(),
            amount: data.amount_total,
            currency: data.currency.to_lowercase(),
            expires_at,
        },
    )?
    else {
        // Lost the insert race after the fast-path check
        drop(tx);
        let purchase = queries::get_purchase_by_session(conn, &data.session_id)?.ok_or_else(
            || AppError::Internal("Purchase vanished after unique conflict".into()),
        )?;
        tracing::info!(session_id = %data.session_id, "Checkout reconciled concurrently, skipping");
        return Ok(ReconcileOutcome::AlreadyProcessed { purchase });
    };

    let grants = if checkout.grants.is_empty() {
        // Degraded metadata: grant the full course for the course family so
        // the customer is never left with a paid, accessless purchase
        let fallback_id = format!("{}-completo", checkout.course_type.to_lowercase());
        tracing::warn!(
            session_id = %data.session_id,
            content_id = %fallback_id,
            "No content grants in metadata, applying fallback course grant"
        );
        vec![ContentGrant {
            content_type: ContentType::Course.as_str().to_string(),
            id: fallback_id,
            course_type: Some(checkout.course_type.clone()),
        }]
    } else {
        checkout.grants
    };

    let mut grants_created = 0;
    for grant in &grants {
        let content_type: ContentType = grant.content_type.parse().map_err(|_| {
            ReconcileError::InvalidMetadata(format!("unknown grant type: {}", grant.content_type))
        })?;
        queries::create_content_access(
            &tx,
            &CreateContentAccess {
                user_id: user_id.clone(),
                purchase_id: purchase.id.clone(),
                content_type,
                content_id: grant.id.clone(),
                course_type: grant
                    .course_type
                    .clone()
                    .unwrap_or_else(|| checkout.course_type.clone()),
                expires_at,
            },
        )?;
        grants_created += 1;
    }

    tx.commit()?;

    tracing::info!(
        session_id = %data.session_id,
        purchase_id = %purchase.id,
        user_id = %user_id,
        grants_created,
        new_account = is_new,
        "Checkout reconciled"
    );

    Ok(ReconcileOutcome::Completed {
        purchase,
        user_id,
        customer_email: email.to_string(),
        new_account: is_new,
        temp_password,
        grants_created,
    })
}
