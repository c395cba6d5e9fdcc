//! Test utilities and fixtures for Aula integration tests

#![allow(dead_code)]

use rusqlite::Connection;

pub use aula::db::{init_db, queries};
pub use aula::models::*;
pub use aula::payments::{CheckoutMetadata, ContentGrant};
pub use aula::reconcile::CheckoutDescriptor;

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a future timestamp (days from now)
pub fn future_timestamp(days: i64) -> i64 {
    now() + (days * 86400)
}

/// Get a past timestamp (days ago)
pub fn past_timestamp(days: i64) -> i64 {
    now() - (days * 86400)
}

/// Create a test user with default values
pub fn create_test_user(conn: &Connection, email: &str) -> User {
    let input = CreateUser {
        email: email.to_string(),
        password_hash: "hash".to_string(),
        email_verified: true,
        created_via_purchase: false,
        stripe_customer_id: None,
    };
    queries::create_user(conn, &input).expect("Failed to create test user")
}

/// Metadata for a complete course purchase (course grant plus three modules)
pub fn course_metadata() -> CheckoutMetadata {
    let grants = vec![
        ContentGrant {
            content_type: "course".to_string(),
            id: "ciencias".to_string(),
            course_type: Some("CIENCIAS".to_string()),
        },
        ContentGrant {
            content_type: "module".to_string(),
            id: "algebra-ciencias".to_string(),
            course_type: Some("CIENCIAS".to_string()),
        },
        ContentGrant {
            content_type: "module".to_string(),
            id: "geometria-ciencias".to_string(),
            course_type: Some("CIENCIAS".to_string()),
        },
        ContentGrant {
            content_type: "module".to_string(),
            id: "analisis-ciencias".to_string(),
            course_type: Some("CIENCIAS".to_string()),
        },
    ];
    CheckoutMetadata {
        product_id: Some("curso-ciencias".to_string()),
        product_name: Some("Curso completo Ciencias".to_string()),
        product_type: Some("course".to_string()),
        course_type: Some("CIENCIAS".to_string()),
        content_access: Some(serde_json::to_string(&grants).unwrap()),
    }
}

/// Metadata for a single-module purchase
pub fn module_metadata() -> CheckoutMetadata {
    let grants = vec![ContentGrant {
        content_type: "module".to_string(),
        id: "algebra-ccss".to_string(),
        course_type: Some("CCSS".to_string()),
    }];
    CheckoutMetadata {
        product_id: Some("modulo-algebra-ccss".to_string()),
        product_name: Some("Algebra (CCSS)".to_string()),
        product_type: Some("module".to_string()),
        course_type: Some("CCSS".to_string()),
        content_access: Some(serde_json::to_string(&grants).unwrap()),
    }
}

/// A paid checkout descriptor ready for reconciliation
pub fn test_descriptor(session_id: &str, email: &str, metadata: CheckoutMetadata) -> CheckoutDescriptor {
    CheckoutDescriptor {
        session_id: session_id.to_string(),
        payment_intent_id: Some(format!("pi_{}", session_id)),
        customer_id: Some("cus_test".to_string()),
        customer_email: Some(email.to_string()),
        amount_total: 14900,
        currency: "eur".to_string(),
        metadata: Some(metadata),
    }
}
