use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::ContentType;

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub email: String,
    pub content_type: ContentType,
    pub content_id: String,
    /// Course family, used to honor whole-course grants for module lookups
    #[serde(default)]
    pub course_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub granted: bool,
    /// Null when not granted; clients key off `granted` either way
    pub expires_at: Option<i64>,
}

/// Check whether a user currently has access to a content item.
///
/// No-access is a negative result, not an error: unknown users, expired
/// grants and deactivated grants all answer `granted: false`. A whole-course
/// grant covers every module and lesson of its course family.
pub async fn check_access(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<AccessResponse>> {
    let conn = state.db.get()?;

    let Some(user) = queries::get_user_by_email(&conn, &query.email)? else {
        return Ok(Json(AccessResponse {
            granted: false,
            expires_at: None,
        }));
    };

    let mut grant =
        queries::find_active_access(&conn, &user.id, query.content_type, &query.content_id)?;

    // A module or lesson is also covered by a live whole-course grant
    if grant.is_none() && query.content_type != ContentType::Course {
        if let Some(ref course_type) = query.course_type {
            grant = queries::find_active_course_access(&conn, &user.id, course_type)?;
        }
    }

    Ok(Json(AccessResponse {
        granted: grant.is_some(),
        expires_at: grant.map(|g| g.expires_at),
    }))
}
