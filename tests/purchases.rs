//! Purchase overview tests: history plus live entitlements per user.

mod common;

use common::*;

use rusqlite::Connection;

use aula::handlers::public::user_purchases;
use aula::reconcile::{reconcile, DEFAULT_ACCESS_DAYS};

fn grant(
    conn: &Connection,
    user_id: &str,
    purchase_id: &str,
    content_id: &str,
    expires_at: i64,
) -> ContentAccess {
    queries::create_content_access(
        conn,
        &CreateContentAccess {
            user_id: user_id.to_string(),
            purchase_id: purchase_id.to_string(),
            content_type: ContentType::Module,
            content_id: content_id.to_string(),
            course_type: "CCSS".to_string(),
            expires_at,
        },
    )
    .expect("Failed to create grant")
}

fn test_purchase(conn: &Connection, user_id: &str, session_id: &str) -> Purchase {
    queries::try_insert_purchase(
        conn,
        &CreatePurchase {
            user_id: user_id.to_string(),
            stripe_session_id: session_id.to_string(),
            stripe_payment_intent_id: None,
            product_id: "modulo-algebra-ccss".to_string(),
            product_name: "Algebra (CCSS)".to_string(),
            product_type: ProductType::Module,
            course_type: "CCSS".to_string(),
            amount: 2900,
            currency: "eur".to_string(),
            expires_at: future_timestamp(365),
        },
    )
    .expect("Failed to insert purchase")
    .expect("Purchase should be new")
}

#[test]
fn test_overview_after_reconciled_purchase() {
    let mut conn = setup_test_db();
    let descriptor = test_descriptor("cs_over_1", "buyer@example.com", course_metadata());
    reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap();

    let overview = user_purchases(&conn, "buyer@example.com").unwrap();
    assert_eq!(overview.purchases.len(), 1);
    assert_eq!(overview.purchases[0].stripe_session_id, "cs_over_1");
    assert_eq!(overview.content_access.len(), 4);
    assert!(overview
        .content_access
        .iter()
        .any(|g| g.content_type == ContentType::Course && g.content_id == "ciencias"));
}

#[test]
fn test_overview_omits_dead_grants_but_keeps_history() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "student@example.com");
    let purchase = test_purchase(&conn, &user.id, "cs_over_2");

    grant(&conn, &user.id, &purchase.id, "algebra-ccss", future_timestamp(30));
    grant(&conn, &user.id, &purchase.id, "analisis-ccss", past_timestamp(1));
    let off = grant(&conn, &user.id, &purchase.id, "estadistica-ccss", future_timestamp(30));
    conn.execute(
        "UPDATE content_access SET is_active = 0 WHERE id = ?1",
        [&off.id],
    )
    .unwrap();

    let overview = user_purchases(&conn, "student@example.com").unwrap();
    // The purchase stays visible even though most of its grants are dead
    assert_eq!(overview.purchases.len(), 1);
    assert_eq!(overview.content_access.len(), 1);
    assert_eq!(overview.content_access[0].content_id, "algebra-ccss");
}

#[test]
fn test_overview_includes_failed_purchases() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "student@example.com");
    let mut input = CreatePurchase {
        user_id: user.id.clone(),
        stripe_session_id: "cs_over_3".to_string(),
        stripe_payment_intent_id: Some("pi_over_3".to_string()),
        product_id: "modulo-algebra-ccss".to_string(),
        product_name: "Algebra (CCSS)".to_string(),
        product_type: ProductType::Module,
        course_type: "CCSS".to_string(),
        amount: 2900,
        currency: "eur".to_string(),
        expires_at: future_timestamp(365),
    };
    queries::try_insert_purchase(&conn, &input).unwrap();
    queries::mark_purchase_failed(&conn, "pi_over_3").unwrap();

    input.stripe_session_id = "cs_over_4".to_string();
    input.stripe_payment_intent_id = Some("pi_over_4".to_string());
    queries::try_insert_purchase(&conn, &input).unwrap();

    let overview = user_purchases(&conn, "student@example.com").unwrap();
    assert_eq!(overview.purchases.len(), 2);
    assert!(overview
        .purchases
        .iter()
        .any(|p| p.status == PurchaseStatus::Failed));
}

#[test]
fn test_overview_for_unknown_email_is_empty() {
    let conn = setup_test_db();

    let overview = user_purchases(&conn, "nobody@example.com").unwrap();
    assert!(overview.purchases.is_empty());
    assert!(overview.content_access.is_empty());
}

#[test]
fn test_overview_is_scoped_to_the_user() {
    let mut conn = setup_test_db();
    reconcile(
        &mut conn,
        &test_descriptor("cs_over_5", "alice@example.com", course_metadata()),
        DEFAULT_ACCESS_DAYS,
    )
    .unwrap();
    reconcile(
        &mut conn,
        &test_descriptor("cs_over_6", "bob@example.com", module_metadata()),
        DEFAULT_ACCESS_DAYS,
    )
    .unwrap();

    let bob = user_purchases(&conn, "bob@example.com").unwrap();
    assert_eq!(bob.purchases.len(), 1);
    assert_eq!(bob.purchases[0].stripe_session_id, "cs_over_6");
    assert_eq!(bob.content_access.len(), 1);
}
