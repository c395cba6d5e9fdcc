use rusqlite::Connection;

/// Initialize the database schema
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        -- Users (identity - source of truth for email)
        -- Accounts are either self-registered or provisioned during
        -- purchase reconciliation (created_via_purchase = 1)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            email_verified INTEGER NOT NULL DEFAULT 0,
            created_via_purchase INTEGER NOT NULL DEFAULT 0,
            stripe_customer_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

        -- Purchases (one row per completed checkout)
        -- UNIQUE(stripe_session_id) is the idempotency boundary: webhook and
        -- polling verification race to insert, exactly one wins
        CREATE TABLE IF NOT EXISTS purchases (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            stripe_session_id TEXT NOT NULL UNIQUE,
            stripe_payment_intent_id TEXT,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            product_type TEXT NOT NULL CHECK (product_type IN ('course', 'module')),
            course_type TEXT NOT NULL,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('completed', 'failed')),
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_purchases_user ON purchases(user_id);
        CREATE INDEX IF NOT EXISTS idx_purchases_payment_intent ON purchases(stripe_payment_intent_id);

        -- Content access (entitlements granted by a purchase)
        -- Expiry is passive: rows stay, access checks compare expires_at to now
        CREATE TABLE IF NOT EXISTS content_access (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            purchase_id TEXT NOT NULL REFERENCES purchases(id) ON DELETE CASCADE,
            content_type TEXT NOT NULL CHECK (content_type IN ('course', 'module', 'lesson')),
            content_id TEXT NOT NULL,
            course_type TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_content_access_lookup ON content_access(user_id, content_type, content_id);
        CREATE INDEX IF NOT EXISTS idx_content_access_purchase ON content_access(purchase_id);
        "#,
    )
}
