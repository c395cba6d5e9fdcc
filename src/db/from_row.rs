//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// This provides graceful error handling instead of panicking when the database
/// contains invalid enum values (from corruption, migration errors, etc.).
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
///
/// Implementing this trait allows using the `query_one` and `query_all`
/// helper functions, reducing repetitive row mapping closures.
pub trait FromRow: Sized {
    /// Construct an instance from a database row.
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, password_hash, email_verified, created_via_purchase, stripe_customer_id, created_at, updated_at";

pub const PURCHASE_COLS: &str = "id, user_id, stripe_session_id, stripe_payment_intent_id, product_id, product_name, product_type, course_type, amount, currency, status, expires_at, created_at";

pub const CONTENT_ACCESS_COLS: &str = "id, user_id, purchase_id, content_type, content_id, course_type, expires_at, is_active, created_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            email_verified: row.get::<_, i32>(3)? != 0,
            created_via_purchase: row.get::<_, i32>(4)? != 0,
            stripe_customer_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for Purchase {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Purchase {
            id: row.get(0)?,
            user_id: row.get(1)?,
            stripe_session_id: row.get(2)?,
            stripe_payment_intent_id: row.get(3)?,
            product_id: row.get(4)?,
            product_name: row.get(5)?,
            product_type: parse_enum(row, 6, "product_type")?,
            course_type: row.get(7)?,
            amount: row.get(8)?,
            currency: row.get(9)?,
            status: parse_enum(row, 10, "status")?,
            expires_at: row.get(11)?,
            created_at: row.get(12)?,
        })
    }
}

impl FromRow for ContentAccess {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ContentAccess {
            id: row.get(0)?,
            user_id: row.get(1)?,
            purchase_id: row.get(2)?,
            content_type: parse_enum(row, 3, "content_type")?,
            content_id: row.get(4)?,
            course_type: row.get(5)?,
            expires_at: row.get(6)?,
            is_active: row.get::<_, i32>(7)? != 0,
            created_at: row.get(8)?,
        })
    }
}
