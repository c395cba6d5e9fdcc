use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What kind of product a purchase covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Course,
    Module,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::Module => "module",
        }
    }
}

impl FromStr for ProductType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(Self::Course),
            "module" => Ok(Self::Module),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Completed,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PurchaseStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// One completed (or later failed) checkout, keyed by the Stripe checkout
/// session id. The unique index on `stripe_session_id` is the idempotency
/// boundary for the whole reconciliation flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    pub user_id: String,
    pub stripe_session_id: String,
    pub stripe_payment_intent_id: Option<String>,
    pub product_id: String,
    pub product_name: String,
    pub product_type: ProductType,
    /// Domain label for the course family (e.g. "CIENCIAS", "CCSS")
    pub course_type: String,
    /// Amount charged in minor currency units (0 for fully discounted purchases)
    pub amount: i64,
    pub currency: String,
    pub status: PurchaseStatus,
    pub expires_at: i64,
    pub created_at: i64,
}

#[derive(Debug)]
pub struct CreatePurchase {
    pub user_id: String,
    pub stripe_session_id: String,
    pub stripe_payment_intent_id: Option<String>,
    pub product_id: String,
    pub product_name: String,
    pub product_type: ProductType,
    pub course_type: String,
    pub amount: i64,
    pub currency: String,
    pub expires_at: i64,
}
