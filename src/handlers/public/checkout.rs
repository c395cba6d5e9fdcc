use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::db::AppState;
use crate::error::{msg, OptionExt, Result};
use crate::extractors::Json;
use crate::payments::CheckoutRequest;

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub product_id: String,
    /// Pre-fills the email field on the hosted checkout page
    #[serde(default)]
    pub customer_email: Option<String>,
    /// Optional Stripe coupon id, passed through as-is
    #[serde(default)]
    pub coupon: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

/// List the purchasable catalog.
pub async fn list_products() -> Json<Vec<catalog::ProductInfo>> {
    Json(catalog::list_products().to_vec())
}

/// Start a hosted checkout for a catalog product.
///
/// The session metadata carries everything reconciliation needs later, so a
/// webhook delivery alone can fulfill the purchase even if the buyer never
/// returns to the success page.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>> {
    let product = catalog::get_product(&request.product_id).or_not_found(msg::PRODUCT_NOT_FOUND)?;

    let success_url = format!(
        "{}?session_id={{CHECKOUT_SESSION_ID}}",
        state.success_page_url
    );
    let cancel_url = format!("{}/payment/cancelled", state.base_url);

    let (session_id, checkout_url) = state
        .stripe
        .create_checkout_session(&CheckoutRequest {
            price_id: product.price_id,
            customer_email: request.customer_email.as_deref(),
            coupon: request.coupon.as_deref(),
            success_url: &success_url,
            cancel_url: &cancel_url,
            metadata: product.checkout_metadata(),
        })
        .await?;

    tracing::info!(
        session_id = %session_id,
        product_id = %product.id,
        "Checkout session created"
    );

    Ok(Json(CreateCheckoutResponse {
        checkout_url,
        session_id,
    }))
}
