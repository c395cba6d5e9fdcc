//! Prefixed ID generation for Aula entities.
//!
//! All IDs use an `au_` brand prefix to guarantee collision avoidance with
//! payment provider IDs (Stripe's `cs_`, `pi_`, `cus_`, `prod_`, etc.).
//!
//! Format: `au_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// Entity types that have prefixed IDs in Aula.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    User,
    Purchase,
    ContentAccess,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::User => "au_usr",
            Self::Purchase => "au_pur",
            Self::ContentAccess => "au_acc",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
