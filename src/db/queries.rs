use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    query_all, query_one, CONTENT_ACCESS_COLS, PURCHASE_COLS, USER_COLS,
};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Users ============

/// Create a user.
pub fn create_user(conn: &Connection, input: &CreateUser) -> Result<User> {
    let id = EntityType::User.gen_id();
    let now = now();
    let email = input.email.trim().to_lowercase();

    conn.execute(
        "INSERT INTO users (id, email, password_hash, email_verified, created_via_purchase, stripe_customer_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            &email,
            &input.password_hash,
            input.email_verified as i32,
            input.created_via_purchase as i32,
            &input.stripe_customer_id,
            now,
            now
        ],
    )?;

    Ok(User {
        id,
        email,
        password_hash: input.password_hash.clone(),
        email_verified: input.email_verified,
        created_via_purchase: input.created_via_purchase,
        stripe_customer_id: input.stripe_customer_id.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

/// Look up a user by email. Emails are stored trimmed and lowercased, so the
/// input is normalized the same way before matching.
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
        &[&email],
    )
}

/// Replace a user's password hash.
pub fn update_password(conn: &Connection, user_id: &str, password_hash: &str) -> Result<()> {
    conn.execute(
        "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
        params![password_hash, now(), user_id],
    )?;
    Ok(())
}

// ============ Purchases ============

/// Try to record a purchase. Returns `None` if a purchase for the same
/// checkout session already exists.
///
/// Uses INSERT OR IGNORE against the UNIQUE(stripe_session_id) constraint so
/// that of two concurrent recorders (webhook delivery vs. client polling)
/// exactly one observes the insert.
pub fn try_insert_purchase(conn: &Connection, input: &CreatePurchase) -> Result<Option<Purchase>> {
    let id = EntityType::Purchase.gen_id();
    let now = now();

    let affected = conn.execute(
        "INSERT OR IGNORE INTO purchases (id, user_id, stripe_session_id, stripe_payment_intent_id, product_id, product_name, product_type, course_type, amount, currency, status, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            &id,
            &input.user_id,
            &input.stripe_session_id,
            &input.stripe_payment_intent_id,
            &input.product_id,
            &input.product_name,
            input.product_type.as_str(),
            &input.course_type,
            input.amount,
            &input.currency,
            PurchaseStatus::Completed.as_str(),
            input.expires_at,
            now
        ],
    )?;

    if affected == 0 {
        return Ok(None);
    }

    Ok(Some(Purchase {
        id,
        user_id: input.user_id.clone(),
        stripe_session_id: input.stripe_session_id.clone(),
        stripe_payment_intent_id: input.stripe_payment_intent_id.clone(),
        product_id: input.product_id.clone(),
        product_name: input.product_name.clone(),
        product_type: input.product_type,
        course_type: input.course_type.clone(),
        amount: input.amount,
        currency: input.currency.clone(),
        status: PurchaseStatus::Completed,
        expires_at: input.expires_at,
        created_at: now,
    }))
}

pub fn get_purchase_by_session(
    conn: &Connection,
    stripe_session_id: &str,
) -> Result<Option<Purchase>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM purchases WHERE stripe_session_id = ?1",
            PURCHASE_COLS
        ),
        &[&stripe_session_id],
    )
}

pub fn list_purchases_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Purchase>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM purchases WHERE user_id = ?1 ORDER BY created_at DESC",
            PURCHASE_COLS
        ),
        &[&user_id],
    )
}

/// Mark a completed purchase as failed, by payment intent id.
/// Returns true if a row was updated.
pub fn mark_purchase_failed(conn: &Connection, stripe_payment_intent_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE purchases SET status = ?1 WHERE stripe_payment_intent_id = ?2 AND status = ?3",
        params![
            PurchaseStatus::Failed.as_str(),
            stripe_payment_intent_id,
            PurchaseStatus::Completed.as_str()
        ],
    )?;
    Ok(affected > 0)
}

// ============ Content Access ============

/// Create a content access grant.
pub fn create_content_access(
    conn: &Connection,
    input: &CreateContentAccess,
) -> Result<ContentAccess> {
    let id = EntityType::ContentAccess.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO content_access (id, user_id, purchase_id, content_type, content_id, course_type, expires_at, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
        params![
            &id,
            &input.user_id,
            &input.purchase_id,
            input.content_type.as_str(),
            &input.content_id,
            &input.course_type,
            input.expires_at,
            now
        ],
    )?;

    Ok(ContentAccess {
        id,
        user_id: input.user_id.clone(),
        purchase_id: input.purchase_id.clone(),
        content_type: input.content_type,
        content_id: input.content_id.clone(),
        course_type: input.course_type.clone(),
        expires_at: input.expires_at,
        is_active: true,
        created_at: now,
    })
}

/// Find an active, unexpired grant for a specific content item.
///
/// When multiple grants cover the same item (repeat purchase after expiry),
/// the earliest-expiring live grant is returned so callers see the most
/// conservative window.
pub fn find_active_access(
    conn: &Connection,
    user_id: &str,
    content_type: ContentType,
    content_id: &str,
) -> Result<Option<ContentAccess>> {
    let now = now();
    query_one(
        conn,
        &format!(
            "SELECT {} FROM content_access
             WHERE user_id = ?1 AND content_type = ?2 AND content_id = ?3
               AND is_active != 0 AND expires_at > ?4
             ORDER BY expires_at ASC LIMIT 1",
            CONTENT_ACCESS_COLS
        ),
        &[&user_id, &content_type.as_str(), &content_id, &now],
    )
}

/// Find a live whole-course grant for a course family. Covers module and
/// lesson lookups when no item-level grant exists.
pub fn find_active_course_access(
    conn: &Connection,
    user_id: &str,
    course_type: &str,
) -> Result<Option<ContentAccess>> {
    let now = now();
    query_one(
        conn,
        &format!(
            "SELECT {} FROM content_access
             WHERE user_id = ?1 AND content_type = 'course' AND course_type = ?2
               AND is_active != 0 AND expires_at > ?3
             ORDER BY expires_at ASC LIMIT 1",
            CONTENT_ACCESS_COLS
        ),
        &[&user_id, &course_type, &now],
    )
}

/// All grants for a user, live or not. Callers filter on expiry as needed.
pub fn list_access_for_user(conn: &Connection, user_id: &str) -> Result<Vec<ContentAccess>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM content_access WHERE user_id = ?1 ORDER BY created_at DESC",
            CONTENT_ACCESS_COLS
        ),
        &[&user_id],
    )
}

/// Live grants only, soonest-expiring first. Backs the purchase overview.
pub fn list_active_access_for_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<ContentAccess>> {
    let now = now();
    query_all(
        conn,
        &format!(
            "SELECT {} FROM content_access
             WHERE user_id = ?1 AND is_active != 0 AND expires_at > ?2
             ORDER BY expires_at ASC",
            CONTENT_ACCESS_COLS
        ),
        &[&user_id, &now],
    )
}

pub fn list_access_for_purchase(conn: &Connection, purchase_id: &str) -> Result<Vec<ContentAccess>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM content_access WHERE purchase_id = ?1 ORDER BY created_at ASC",
            CONTENT_ACCESS_COLS
        ),
        &[&purchase_id],
    )
}
