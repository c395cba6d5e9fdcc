//! Static product catalog.
//!
//! The storefront sells two complete courses and their individual modules.
//! The catalog is the single source of truth for what a checkout session's
//! metadata promises: product identity plus the exact set of content grants
//! the purchase unlocks.

use serde::Serialize;

use crate::models::{ContentType, ProductType};
use crate::payments::{CheckoutMetadata, ContentGrant};

/// One content item a product unlocks.
#[derive(Debug, Clone, Copy)]
pub struct GrantDef {
    pub content_type: ContentType,
    pub content_id: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProductInfo {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(rename = "product_type")]
    pub product_type: ProductType,
    pub course_type: &'static str,
    /// Stripe Price ID for the hosted checkout line item
    #[serde(skip)]
    pub price_id: &'static str,
    #[serde(skip)]
    pub grants: &'static [GrantDef],
}

const CIENCIAS_FULL: &[GrantDef] = &[
    GrantDef { content_type: ContentType::Course, content_id: "ciencias" },
    GrantDef { content_type: ContentType::Module, content_id: "algebra-ciencias" },
    GrantDef { content_type: ContentType::Module, content_id: "geometria-ciencias" },
    GrantDef { content_type: ContentType::Module, content_id: "analisis-ciencias" },
];

const CCSS_FULL: &[GrantDef] = &[
    GrantDef { content_type: ContentType::Course, content_id: "ccss" },
    GrantDef { content_type: ContentType::Module, content_id: "algebra-ccss" },
    GrantDef { content_type: ContentType::Module, content_id: "analisis-ccss" },
    GrantDef { content_type: ContentType::Module, content_id: "estadistica-ccss" },
];

const PRODUCTS: &[ProductInfo] = &[
    ProductInfo {
        id: "curso-ciencias",
        name: "Matematicas II (Ciencias) - Curso completo",
        product_type: ProductType::Course,
        course_type: "CIENCIAS",
        price_id: "price_curso_ciencias",
        grants: CIENCIAS_FULL,
    },
    ProductInfo {
        id: "curso-ccss",
        name: "Matematicas CCSS - Curso completo",
        product_type: ProductType::Course,
        course_type: "CCSS",
        price_id: "price_curso_ccss",
        grants: CCSS_FULL,
    },
    ProductInfo {
        id: "modulo-algebra-ciencias",
        name: "Algebra (Ciencias)",
        product_type: ProductType::Module,
        course_type: "CIENCIAS",
        price_id: "price_mod_algebra_ciencias",
        grants: &[GrantDef { content_type: ContentType::Module, content_id: "algebra-ciencias" }],
    },
    ProductInfo {
        id: "modulo-geometria-ciencias",
        name: "Geometria (Ciencias)",
        product_type: ProductType::Module,
        course_type: "CIENCIAS",
        price_id: "price_mod_geometria_ciencias",
        grants: &[GrantDef { content_type: ContentType::Module, content_id: "geometria-ciencias" }],
    },
    ProductInfo {
        id: "modulo-analisis-ciencias",
        name: "Analisis (Ciencias)",
        product_type: ProductType::Module,
        course_type: "CIENCIAS",
        price_id: "price_mod_analisis_ciencias",
        grants: &[GrantDef { content_type: ContentType::Module, content_id: "analisis-ciencias" }],
    },
    ProductInfo {
        id: "modulo-algebra-ccss",
        name: "Algebra (CCSS)",
        product_type: ProductType::Module,
        course_type: "CCSS",
        price_id: "price_mod_algebra_ccss",
        grants: &[GrantDef { content_type: ContentType::Module, content_id: "algebra-ccss" }],
    },
    ProductInfo {
        id: "modulo-analisis-ccss",
        name: "Analisis (CCSS)",
        product_type: ProductType::Module,
        course_type: "CCSS",
        price_id: "price_mod_analisis_ccss",
        grants: &[GrantDef { content_type: ContentType::Module, content_id: "analisis-ccss" }],
    },
    ProductInfo {
        id: "modulo-estadistica-ccss",
        name: "Estadistica (CCSS)",
        product_type: ProductType::Module,
        course_type: "CCSS",
        price_id: "price_mod_estadistica_ccss",
        grants: &[GrantDef { content_type: ContentType::Module, content_id: "estadistica-ccss" }],
    },
];

pub fn get_product(product_id: &str) -> Option<&'static ProductInfo> {
    PRODUCTS.iter().find(|p| p.id == product_id)
}

pub fn list_products() -> &'static [ProductInfo] {
    PRODUCTS
}

impl ProductInfo {
    /// Build the metadata bag for a checkout session. The reconciler reads
    /// this back from the webhook payload, so it must be self-contained.
    pub fn checkout_metadata(&self) -> CheckoutMetadata {
        let grants: Vec<ContentGrant> = self
            .grants
            .iter()
            .map(|g| ContentGrant {
                content_type: g.content_type.as_str().to_string(),
                id: g.content_id.to_string(),
                course_type: Some(self.course_type.to_string()),
            })
            .collect();

        CheckoutMetadata {
            product_id: Some(self.id.to_string()),
            product_name: Some(self.name.to_string()),
            product_type: Some(self.product_type.as_str().to_string()),
            course_type: Some(self.course_type.to_string()),
            // Metadata values must be strings, so the grant list is JSON-encoded
            content_access: serde_json::to_string(&grants).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert!(get_product("curso-ciencias").is_some());
        assert!(get_product("modulo-estadistica-ccss").is_some());
        assert!(get_product("curso-latin").is_none());
    }

    #[test]
    fn test_full_courses_grant_their_modules() {
        let course = get_product("curso-ciencias").unwrap();
        assert_eq!(course.grants.len(), 4);
        assert!(course
            .grants
            .iter()
            .any(|g| g.content_type == ContentType::Course && g.content_id == "ciencias"));
    }

    #[test]
    fn test_checkout_metadata_round_trips_grants() {
        let product = get_product("modulo-algebra-ccss").unwrap();
        let metadata = product.checkout_metadata();
        let json = metadata.content_access.unwrap();
        let grants: Vec<ContentGrant> = serde_json::from_str(&json).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].id, "algebra-ccss");
        assert_eq!(grants[0].content_type, "module");
    }
}
