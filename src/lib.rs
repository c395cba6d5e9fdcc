//! Aula - course storefront backend
//!
//! This library provides the core functionality for the Aula storefront,
//! including database operations, Stripe checkout integration, the
//! purchase-to-entitlement reconciler, and API handlers.

pub mod accounts;
pub mod catalog;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod models;
pub mod payments;
pub mod reconcile;
pub mod util;
