use axum::extract::State;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{ContentAccess, Purchase};

#[derive(Debug, Deserialize)]
pub struct PurchasesQuery {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct PurchasesResponse {
    /// Full purchase history, newest first, failed purchases included
    pub purchases: Vec<Purchase>,
    /// Currently live grants only; expired and deactivated rows are omitted
    pub content_access: Vec<ContentAccess>,
}

/// Assemble a user's purchase history and live entitlements.
pub fn user_purchases(conn: &Connection, email: &str) -> Result<PurchasesResponse> {
    let Some(user) = queries::get_user_by_email(conn, email)? else {
        return Ok(PurchasesResponse {
            purchases: Vec::new(),
            content_access: Vec::new(),
        });
    };

    Ok(PurchasesResponse {
        purchases: queries::list_purchases_for_user(conn, &user.id)?,
        content_access: queries::list_active_access_for_user(conn, &user.id)?,
    })
}

/// What a user has bought and what they can currently open.
///
/// An unknown email answers with empty lists, matching the access check's
/// negative results.
pub async fn list_purchases(
    State(state): State<AppState>,
    Query(query): Query<PurchasesQuery>,
) -> Result<Json<PurchasesResponse>> {
    let conn = state.db.get()?;
    Ok(Json(user_purchases(&conn, &query.email)?))
}
