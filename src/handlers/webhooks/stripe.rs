use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::{queries, AppState};
use crate::email::{spawn_purchase_notifications, PurchaseNotification};
use crate::payments::{StripeCheckoutSession, StripePaymentIntent, StripeWebhookEvent};
use crate::reconcile::{
    reconcile, CheckoutDescriptor, ReconcileError, ReconcileOutcome, DEFAULT_ACCESS_DAYS,
};

/// Webhook responses are a status code plus a short reason. Anything but a
/// 2xx makes Stripe redeliver, so unprocessable-but-understood events return
/// OK to stop the retry queue.
pub type WebhookResult = (StatusCode, &'static str);

/// Axum handler for Stripe webhooks.
///
/// The signature is verified against the raw body before anything is parsed;
/// an unsigned or tampered payload never reaches event handling.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = match extract_signature(&headers) {
        Ok(s) => s,
        Err(result) => return result,
    };

    match state.stripe.verify_webhook_signature(&body, &signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Err(e) => {
            tracing::error!("Signature verification error: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid signature header");
        }
    }

    let event: StripeWebhookEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to parse Stripe webhook: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    match event.event_type.as_str() {
        "checkout.session.completed" => handle_checkout_completed(&state, &event).await,
        "payment_intent.payment_failed" => handle_payment_failed(&state, &event),
        other => {
            tracing::debug!(event_type = %other, "Ignoring Stripe event");
            (StatusCode::OK, "Ignored")
        }
    }
}

fn extract_signature(headers: &HeaderMap) -> Result<String, WebhookResult> {
    headers
        .get("stripe-signature")
        .ok_or((StatusCode::BAD_REQUEST, "Missing stripe-signature header"))?
        .to_str()
        .map(|s| s.to_string())
        .map_err(|e| {
            tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid signature header")
        })
}

async fn handle_checkout_completed(state: &AppState, event: &StripeWebhookEvent) -> WebhookResult {
    let session: StripeCheckoutSession = match serde_json::from_value(event.data.object.clone()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to parse checkout session: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid checkout session");
        }
    };

    // Sessions completed without settled payment (async payment methods)
    // get their own completion event later
    if !session.is_paid() {
        tracing::info!(session_id = %session.id, payment_status = %session.payment_status, "Checkout completed but not paid, ignoring");
        return (StatusCode::OK, "Not paid");
    }

    let descriptor = CheckoutDescriptor::from_session(&session);

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to get DB connection: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable");
        }
    };

    match reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS) {
        Ok(ReconcileOutcome::Completed {
            purchase,
            customer_email,
            temp_password,
            ..
        }) => {
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
            (StatusCode::OK, "Processed")
        }
        Ok(ReconcileOutcome::AlreadyProcessed { .. }) => (StatusCode::OK, "Already processed"),
        // A payload missing required metadata will never become processable;
        // acknowledge it so Stripe stops redelivering
        Err(ReconcileError::MissingMetadata(field)) => {
            tracing::warn!(session_id = %session.id, field, "Checkout session missing metadata, acknowledging");
            (StatusCode::OK, "Missing metadata")
        }
        Err(ReconcileError::InvalidMetadata(detail)) => {
            tracing::warn!(session_id = %session.id, detail = %detail, "Checkout session has invalid metadata, acknowledging");
            (StatusCode::OK, "Invalid metadata")
        }
        Err(ReconcileError::Db(e)) => {
            tracing::error!(session_id = %session.id, "Reconciliation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Processing failed")
        }
    }
}

fn handle_payment_failed(state: &AppState, event: &StripeWebhookEvent) -> WebhookResult {
    let intent: StripePaymentIntent = match serde_json::from_value(event.data.object.clone()) {
        Ok(i) => i,
        Err(e) => {
            tracing::error!("Failed to parse payment intent: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid payment intent");
        }
    };

    let reason = intent
        .last_payment_error
        .as_ref()
        .and_then(|e| e.message.as_deref())
        .unwrap_or("unknown");

    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to get DB connection: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable");
        }
    };

    match queries::mark_purchase_failed(&conn, &intent.id) {
        Ok(true) => {
            tracing::warn!(payment_intent = %intent.id, reason = %reason, "Purchase marked failed");
            (StatusCode::OK, "Marked failed")
        }
        Ok(false) => {
            // Most failures precede any purchase row; nothing to update
            tracing::info!(payment_intent = %intent.id, reason = %reason, "Payment failed, no purchase recorded");
            (StatusCode::OK, "No purchase to update")
        }
        Err(e) => {
            tracing::error!(payment_intent = %intent.id, "Failed to mark purchase: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Processing failed")
        }
    }
}
