use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::email::{spawn_purchase_notifications, PurchaseNotification};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::models::Purchase;
use crate::reconcile::{
    reconcile, CheckoutDescriptor, ReconcileError, ReconcileOutcome, DEFAULT_ACCESS_DAYS,
};

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentQuery {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    /// Whether the purchase row exists (this call may have just created it)
    pub is_processed: bool,
    pub session_id: String,
    pub payment_status: String,
    pub amount_total: i64,
    pub currency: String,
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase: Option<Purchase>,
}

/// Server-side payment verification, polled by the success page.
///
/// The webhook usually wins the race and the purchase already exists here.
/// When webhook delivery is delayed or lost, this endpoint reconciles the
/// session itself so the buyer is never stuck waiting on a retry queue.
pub async fn verify_payment(
    State(state): State<AppState>,
    Query(query): Query<VerifyPaymentQuery>,
) -> Result<Json<VerifyPaymentResponse>> {
    let session = state
        .stripe
        .retrieve_checkout_session(&query.session_id)
        .await?;

    // The buyer may land on the success page with an abandoned session id
    if session.status.as_deref() == Some("open") {
        return Err(AppError::BadRequest("Checkout not completed".into()));
    }
    if !session.is_paid() {
        return Err(AppError::BadRequest("Payment not completed".into()));
    }

    let descriptor = CheckoutDescriptor::from_session(&session);
    let customer_email = session.customer_email().map(String::from);

    let mut conn = state.db.get()?;
    let outcome = match reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS) {
        Ok(outcome) => outcome,
        Err(ReconcileError::MissingMetadata(field)) => {
            return Err(AppError::BadRequest(format!(
                "Checkout session is missing {}",
                field
            )));
        }
        Err(ReconcileError::InvalidMetadata(detail)) => {
            return Err(AppError::BadRequest(detail));
        }
        Err(ReconcileError::Db(e)) => return Err(e),
    };

    let purchase = match outcome {
        ReconcileOutcome::AlreadyProcessed { purchase } => purchase,
        ReconcileOutcome::Completed {
            purchase,
            customer_email,
            temp_password,
            ..
        } => {
            spawn_purchase_notifications(
                state.notifier.clone(),
                PurchaseNotification {
                    to_email: customer_email,
                    product_name: purchase.product_name.clone(),
                    amount: purchase.amount,
                    currency: purchase.currency.clone(),
                    expires_at: purchase.expires_at,
                    temp_password,
                },
            );
            purchase
        }
    };

    Ok(Json(VerifyPaymentResponse {
        success: true,
        is_processed: true,
        session_id: session.id,
        payment_status: session.payment_status,
        amount_total: session.amount_total.unwrap_or(0),
        currency: session.currency.unwrap_or_else(|| "eur".to_string()),
        customer_email,
        purchase: Some(purchase),
    }))
}
