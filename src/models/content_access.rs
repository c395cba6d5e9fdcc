use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Granularity of a content grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Course,
    Module,
    Lesson,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::Module => "module",
            Self::Lesson => "lesson",
        }
    }
}

impl FromStr for ContentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(Self::Course),
            "module" => Ok(Self::Module),
            "lesson" => Ok(Self::Lesson),
            _ => Err(()),
        }
    }
}

/// A time-bounded entitlement: one content item unlocked for one user by one
/// purchase. Expiry is passive - rows are never swept, access checks compare
/// `expires_at` against now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentAccess {
    pub id: String,
    pub user_id: String,
    pub purchase_id: String,
    pub content_type: ContentType,
    /// Domain-level slug (e.g. "ciencias", "algebra-ccss")
    pub content_id: String,
    pub course_type: String,
    pub expires_at: i64,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug)]
pub struct CreateContentAccess {
    pub user_id: String,
    pub purchase_id: String,
    pub content_type: ContentType,
    pub content_id: String,
    pub course_type: String,
    pub expires_at: i64,
}
