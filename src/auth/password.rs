/// Password Hashing and Verification
///
/// bcrypt with a configurable cost factor. Strength rules live in
/// `validators`; this type only hashes and compares.

use bcrypt::{hash, verify};

use crate::error::AppError;

pub struct PasswordHasher {
    cost: u32,
    /// Hash of a throwaway value, compared against when the user does not exist
    dummy_hash: String,
}

impl PasswordHasher {
    /// # Errors
    /// Returns error if `cost` is outside bcrypt's supported range
    pub fn new(cost: u32) -> Result<Self, AppError> {
        let dummy_hash = hash("not-a-real-password", cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;
        Ok(Self { cost, dummy_hash })
    }

    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }

    /// Spend one verification's worth of work without a real hash. Always false.
    pub fn verify_dummy(&self, password: &str) -> bool {
        let _ = verify(password, &self.dummy_hash);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4).expect("cost 4 is valid")
    }

    #[test]
    fn test_hash_password() {
        let password = "ValidPassword123!";
        let hash = hasher().hash(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_verify_password() {
        let hasher = hasher();
        let hash = hasher.hash("ValidPassword123!").unwrap();

        assert!(hasher.verify("ValidPassword123!", &hash).unwrap());
        assert!(!hasher.verify("WrongPassword123!", &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_salt() {
        let hasher = hasher();
        assert_ne!(hasher.hash("Same1!pass").unwrap(), hasher.hash("Same1!pass").unwrap());
    }

    #[test]
    fn test_dummy_verification_never_succeeds() {
        assert!(!hasher().verify_dummy("not-a-real-password"));
    }

    #[test]
    fn test_invalid_cost() {
        assert!(PasswordHasher::new(2).is_err());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(hasher().verify("whatever", "not-a-bcrypt-hash").is_err());
    }
}
