mod access;
mod checkout;
mod purchases;
mod verify;

pub use access::*;
pub use checkout::*;
pub use purchases::*;
pub use verify::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/products", get(list_products))
        .route("/checkout", post(create_checkout))
        // Polled by the success page until the purchase is reconciled
        .route("/verify-payment", get(verify_payment))
        .route("/access", get(check_access))
        .route("/purchases", get(list_purchases))
}
