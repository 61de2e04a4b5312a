/// Hash a plaintext password with a fresh bcrypt salt.
pub fn hash(plaintext: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plaintext, cost)
}

/// Verify plaintext against a stored hash - constant-time via bcrypt.
/// A malformed stored hash never verifies.
pub fn verify(plaintext: &str, stored_hash: &str) -> bool {
    bcrypt::verify(plaintext, stored_hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    #[test]
    fn hash_is_not_plaintext() {
        let h = hash("hunter2", COST).unwrap();
        assert_ne!(h, "hunter2");
        assert!(h.starts_with("$2"));
    }

    #[test]
    fn verify_accepts_only_matching_password() {
        let h = hash("hunter2", COST).unwrap();
        assert!(verify("hunter2", &h));
        assert!(!verify("hunter3", &h));
    }

    #[test]
    fn same_password_gets_different_salts() {
        let a = hash("same", COST).unwrap();
        let b = hash("same", COST).unwrap();
        assert_ne!(a, b);
        assert!(verify("same", &a) && verify("same", &b));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify("anything", "not-a-bcrypt-hash"));
    }
}
