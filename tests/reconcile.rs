//! Reconciliation flow tests: idempotency, provisioning, grants, fallback.

mod common;

use common::*;

use aula::reconcile::{reconcile, ReconcileError, ReconcileOutcome, DEFAULT_ACCESS_DAYS};

fn count(conn: &rusqlite::Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        .unwrap()
}

#[test]
fn test_paid_checkout_creates_account_purchase_and_grants() {
    let mut conn = setup_test_db();
    let descriptor = test_descriptor("cs_test_1", "buyer@example.com", course_metadata());

    let outcome = reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap();

    let ReconcileOutcome::Completed {
        purchase,
        user_id,
        new_account,
        temp_password,
        customer_email,
        grants_created,
    } = outcome
    else {
        panic!("Expected Completed outcome");
    };

    assert!(new_account);
    assert!(temp_password.is_some());
    assert_eq!(customer_email, "buyer@example.com");
    assert_eq!(grants_created, 4);

    assert_eq!(purchase.stripe_session_id, "cs_test_1");
    assert_eq!(purchase.product_id, "curso-ciencias");
    assert_eq!(purchase.product_type, ProductType::Course);
    assert_eq!(purchase.status, PurchaseStatus::Completed);
    assert_eq!(purchase.amount, 14900);
    assert!(purchase.expires_at > now());

    let user = queries::get_user_by_email(&conn, "buyer@example.com")
        .unwrap()
        .expect("User should have been provisioned");
    assert_eq!(user.id, user_id);
    assert!(user.created_via_purchase);
    assert!(user.email_verified);

    let grants = queries::list_access_for_purchase(&conn, &purchase.id).unwrap();
    assert_eq!(grants.len(), 4);
    assert!(grants
        .iter()
        .any(|g| g.content_type == ContentType::Course && g.content_id == "ciencias"));
    assert!(grants.iter().all(|g| g.is_active));
    assert!(grants.iter().all(|g| g.expires_at == purchase.expires_at));
}

#[test]
fn test_replayed_checkout_is_a_no_op() {
    let mut conn = setup_test_db();
    let descriptor = test_descriptor("cs_test_2", "buyer@example.com", course_metadata());

    let first = reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap();
    let ReconcileOutcome::Completed { purchase, .. } = first else {
        panic!("Expected Completed outcome");
    };

    // Webhook redelivery and success-page polling both replay the session
    for _ in 0..3 {
        let outcome = reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap();
        let ReconcileOutcome::AlreadyProcessed { purchase: seen } = outcome else {
            panic!("Expected AlreadyProcessed outcome");
        };
        assert_eq!(seen.id, purchase.id);
    }

    assert_eq!(count(&conn, "users"), 1);
    assert_eq!(count(&conn, "purchases"), 1);
    assert_eq!(count(&conn, "content_access"), 4);
}

#[test]
fn test_existing_account_is_reused() {
    let mut conn = setup_test_db();
    let existing = create_test_user(&conn, "regular@example.com");

    let descriptor = test_descriptor("cs_test_3", "regular@example.com", module_metadata());
    let outcome = reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap();

    let ReconcileOutcome::Completed {
        user_id,
        new_account,
        temp_password,
        ..
    } = outcome
    else {
        panic!("Expected Completed outcome");
    };

    assert_eq!(user_id, existing.id);
    assert!(!new_account);
    assert!(temp_password.is_none(), "No welcome credentials for existing accounts");
    assert_eq!(count(&conn, "users"), 1);
}

#[test]
fn test_email_is_matched_case_insensitively() {
    let mut conn = setup_test_db();
    let existing = create_test_user(&conn, "buyer@example.com");

    let descriptor = test_descriptor("cs_test_4", " Buyer@Example.COM ", module_metadata());
    let outcome = reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap();

    let ReconcileOutcome::Completed { user_id, new_account, .. } = outcome else {
        panic!("Expected Completed outcome");
    };
    assert_eq!(user_id, existing.id);
    assert!(!new_account);
}

#[test]
fn test_missing_metadata_leaves_no_partial_state() {
    let mut conn = setup_test_db();

    let mut descriptor = test_descriptor("cs_test_5", "buyer@example.com", course_metadata());
    descriptor.metadata = None;

    let err = reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap_err();
    assert!(matches!(err, ReconcileError::MissingMetadata("metadata")));

    let mut no_product = test_descriptor("cs_test_5", "buyer@example.com", course_metadata());
    if let Some(ref mut m) = no_product.metadata {
        m.product_id = None;
    }
    let err = reconcile(&mut conn, &no_product, DEFAULT_ACCESS_DAYS).unwrap_err();
    assert!(matches!(err, ReconcileError::MissingMetadata("productId")));

    let mut no_email = test_descriptor("cs_test_5", "buyer@example.com", course_metadata());
    no_email.customer_email = None;
    let err = reconcile(&mut conn, &no_email, DEFAULT_ACCESS_DAYS).unwrap_err();
    assert!(matches!(err, ReconcileError::MissingMetadata("customer email")));

    assert_eq!(count(&conn, "users"), 0);
    assert_eq!(count(&conn, "purchases"), 0);
    assert_eq!(count(&conn, "content_access"), 0);
}

#[test]
fn test_malformed_grant_list_is_rejected_before_any_write() {
    let mut conn = setup_test_db();

    let mut metadata = course_metadata();
    metadata.content_access = Some("not json".to_string());
    let descriptor = test_descriptor("cs_test_6", "buyer@example.com", metadata);

    let err = reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidMetadata(_)));

    assert_eq!(count(&conn, "users"), 0);
    assert_eq!(count(&conn, "purchases"), 0);
}

#[test]
fn test_missing_grant_list_falls_back_to_course_grant() {
    let mut conn = setup_test_db();

    let mut metadata = course_metadata();
    metadata.content_access = None;
    let descriptor = test_descriptor("cs_test_7", "buyer@example.com", metadata);

    let outcome = reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap();
    let ReconcileOutcome::Completed { purchase, grants_created, .. } = outcome else {
        panic!("Expected Completed outcome");
    };

    assert_eq!(grants_created, 1);
    let grants = queries::list_access_for_purchase(&conn, &purchase.id).unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].content_type, ContentType::Course);
    assert_eq!(grants[0].content_id, "ciencias-completo");
    assert_eq!(grants[0].course_type, "CIENCIAS");
}

#[test]
fn test_fully_discounted_purchase_flows_like_a_paid_one() {
    let mut conn = setup_test_db();

    let mut descriptor = test_descriptor("cs_test_8", "buyer@example.com", module_metadata());
    descriptor.amount_total = 0;
    descriptor.payment_intent_id = None;

    let outcome = reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap();
    let ReconcileOutcome::Completed { purchase, .. } = outcome else {
        panic!("Expected Completed outcome");
    };

    assert_eq!(purchase.amount, 0);
    assert_eq!(purchase.status, PurchaseStatus::Completed);
    assert_eq!(count(&conn, "content_access"), 1);
}

#[test]
fn test_access_window_uses_configured_days() {
    let mut conn = setup_test_db();
    let descriptor = test_descriptor("cs_test_9", "buyer@example.com", module_metadata());

    let outcome = reconcile(&mut conn, &descriptor, 30).unwrap();
    let ReconcileOutcome::Completed { purchase, .. } = outcome else {
        panic!("Expected Completed outcome");
    };

    let expected = now() + 30 * 86400;
    assert!((purchase.expires_at - expected).abs() <= 5);
}

#[test]
fn test_retry_after_interrupted_provisioning_still_delivers_a_credential() {
    let mut conn = setup_test_db();

    // An earlier attempt provisioned the account but died before the
    // purchase committed, so the welcome email never went out
    aula::accounts::provision_account(&mut conn, "buyer@example.com", None).unwrap();

    let descriptor = test_descriptor("cs_test_11", "buyer@example.com", module_metadata());
    let outcome = reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap();

    let ReconcileOutcome::Completed { new_account, temp_password, .. } = outcome else {
        panic!("Expected Completed outcome");
    };
    assert!(!new_account);
    assert!(
        temp_password.is_some(),
        "Reused provisioned account without purchases needs a fresh credential"
    );
    assert_eq!(count(&conn, "users"), 1);
}

#[test]
fn test_try_insert_purchase_conflict_returns_none() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "buyer@example.com");

    let input = CreatePurchase {
        user_id: user.id.clone(),
        stripe_session_id: "cs_dup".to_string(),
        stripe_payment_intent_id: None,
        product_id: "modulo-algebra-ccss".to_string(),
        product_name: "Algebra (CCSS)".to_string(),
        product_type: ProductType::Module,
        course_type: "CCSS".to_string(),
        amount: 2900,
        currency: "eur".to_string(),
        expires_at: future_timestamp(365),
    };

    assert!(queries::try_insert_purchase(&conn, &input).unwrap().is_some());
    assert!(queries::try_insert_purchase(&conn, &input).unwrap().is_none());
    assert_eq!(count(&conn, "purchases"), 1);
}

#[test]
fn test_mark_purchase_failed() {
    let mut conn = setup_test_db();
    let descriptor = test_descriptor("cs_test_10", "buyer@example.com", module_metadata());
    reconcile(&mut conn, &descriptor, DEFAULT_ACCESS_DAYS).unwrap();

    // Unknown payment intent updates nothing
    assert!(!queries::mark_purchase_failed(&conn, "pi_unknown").unwrap());

    assert!(queries::mark_purchase_failed(&conn, "pi_cs_test_10").unwrap());
    let purchase = queries::get_purchase_by_session(&conn, "cs_test_10")
        .unwrap()
        .unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Failed);

    // Already failed, second update is a no-op
    assert!(!queries::mark_purchase_failed(&conn, "pi_cs_test_10").unwrap());
}
