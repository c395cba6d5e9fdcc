//! Account provisioning for purchase reconciliation.
//!
//! Checkout does not require an existing account. When a purchase arrives
//! for an unknown email, an account is created on the spot with a temporary
//! password that is delivered in the welcome email.

use rand::seq::SliceRandom;
use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::db::queries;
use crate::error::Result;
use crate::models::CreateUser;

/// Temporary password length for provisioned accounts.
const TEMP_PASSWORD_LEN: usize = 12;

/// Allowed characters for temporary passwords.
const TEMP_PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// Generate a random temporary password.
pub fn generate_temp_password() -> String {
    let mut rng = rand::thread_rng();
    (0..TEMP_PASSWORD_LEN)
        .map(|_| {
            let b = TEMP_PASSWORD_CHARSET
                .choose(&mut rng)
                .copied()
                .unwrap_or(b'x');
            b as char
        })
        .collect()
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Outcome of looking up or creating the account for a purchase.
#[derive(Debug)]
pub struct ProvisionedAccount {
    pub user_id: String,
    pub is_new: bool,
    /// Plaintext temporary password, present when a credential needs to reach
    /// the buyer: new accounts, or reuse of a provisioned account whose
    /// purchase never committed. It exists solely for the welcome email.
    pub temp_password: Option<String>,
}

/// Find the account for `email`, creating one if none exists.
///
/// Two reconcilers can race here for the same unseen email. The UNIQUE
/// constraint on users.email makes the second insert fail, in which case the
/// account the winner created is looked up and reused.
pub fn provision_account(
    conn: &Connection,
    email: &str,
    stripe_customer_id: Option<&str>,
) -> Result<ProvisionedAccount> {
    if let Some(user) = queries::get_user_by_email(conn, email)? {
        // A purchase-provisioned account with no recorded purchase means an
        // earlier reconciliation died between provisioning and commit. The
        // welcome email only goes out after commit, so the stored credential
        // was never delivered; issue a fresh one for this attempt.
        let temp_password = if user.created_via_purchase
            && queries::list_purchases_for_user(conn, &user.id)?.is_empty()
        {
            let password = generate_temp_password();
            queries::update_password(conn, &user.id, &hash_password(&password))?;
            tracing::warn!(user_id = %user.id, "Reissued undelivered credential for provisioned account");
            Some(password)
        } else {
            None
        };

        return Ok(ProvisionedAccount {
            user_id: user.id,
            is_new: false,
            temp_password,
        });
    }

    let temp_password = generate_temp_password();
    let input = CreateUser {
        email: email.to_string(),
        password_hash: hash_password(&temp_password),
        email_verified: true,
        created_via_purchase: true,
        stripe_customer_id: stripe_customer_id.map(String::from),
    };

    match queries::create_user(conn, &input) {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "Provisioned account for purchase");
            Ok(ProvisionedAccount {
                user_id: user.id,
                is_new: true,
                temp_password: Some(temp_password),
            })
        }
        Err(e) if is_unique_violation(&e) => {
            // Lost the race, the other reconciler created the account
            let user = queries::get_user_by_email(conn, email)?.ok_or_else(|| {
                crate::error::AppError::Internal("User vanished after unique conflict".into())
            })?;
            Ok(ProvisionedAccount {
                user_id: user.id,
                is_new: false,
                temp_password: None,
            })
        }
        Err(e) => Err(e),
    }
}

fn is_unique_violation(err: &crate::error::AppError) -> bool {
    matches!(
        err,
        crate::error::AppError::Database(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_password_length_and_charset() {
        let password = generate_temp_password();
        assert_eq!(password.len(), TEMP_PASSWORD_LEN);
        assert!(password
            .bytes()
            .all(|b| TEMP_PASSWORD_CHARSET.contains(&b)));
    }

    #[test]
    fn test_temp_passwords_differ() {
        assert_ne!(generate_temp_password(), generate_temp_password());
    }

    #[test]
    fn test_hash_password_is_stable_hex() {
        let h = hash_password("secret");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_password("secret"));
        assert_ne!(h, hash_password("Secret"));
    }
}
