use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// SHA-256 hash of the password (temporary password for purchase-provisioned accounts)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Purchase implies a processor-validated email, so provisioned accounts start verified
    pub email_verified: bool,
    /// True when the account was auto-created by the reconciler rather than self-registered
    pub created_via_purchase: bool,
    /// Stripe customer id captured at checkout (cus_xxx), if any
    pub stripe_customer_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub created_via_purchase: bool,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
}
