mod from_row;
mod schema;
pub mod queries;

pub use from_row::{query_all, query_one, FromRow};
pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::email::NotificationService;
use crate::payments::StripeClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (users, purchases, content access)
    pub db: DbPool,
    /// Stripe API client (checkout sessions, webhook verification)
    pub stripe: StripeClient,
    /// Transactional email dispatcher (welcome + purchase confirmation)
    pub notifier: Arc<NotificationService>,
    /// Public base URL of this service
    pub base_url: String,
    /// Where Stripe redirects the buyer after checkout
    pub success_page_url: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
