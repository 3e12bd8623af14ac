//! Password hashing via bcrypt.

use super::AuthError;

/// bcrypt cost factor.
pub const BCRYPT_COST: u32 = 10;

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    hash_password_with_cost(password, BCRYPT_COST)
}

/// Hash a password with an explicit bcrypt cost.
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, AuthError> {
    if password.is_empty() {
        return Err(AuthError::EmptyPassword);
    }
    bcrypt::hash(password, cost).map_err(|e| AuthError::Hashing(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
///
/// Empty input and unparseable hashes verify as `false`.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if password.is_empty() || hash.is_empty() {
        return false;
    }
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn hash_then_verify_accepts_same_password() {
        let hash = hash_password_with_cost("secret1", TEST_COST).unwrap();
        assert!(verify_password("secret1", &hash));
    }

    #[test]
    fn verify_rejects_different_password() {
        let hash = hash_password_with_cost("secret1", TEST_COST).unwrap();
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("Secret1", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password_with_cost("same", TEST_COST).unwrap();
        let b = hash_password_with_cost("same", TEST_COST).unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn empty_password_is_rejected_when_hashing() {
        assert!(matches!(
            hash_password_with_cost("", TEST_COST),
            Err(AuthError::EmptyPassword)
        ));
    }

    #[test]
    fn verify_never_errors_on_bad_input() {
        let hash = hash_password_with_cost("secret1", TEST_COST).unwrap();
        assert!(!verify_password("", &hash));
        assert!(!verify_password("secret1", ""));
        assert!(!verify_password("secret1", "not-a-bcrypt-hash"));
    }

    #[test]
    fn default_cost_hash_verifies() {
        let hash = hash_password("secret1").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("secret1", &hash));
    }
}
