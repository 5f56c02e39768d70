//! Password hashing with bcrypt.

use vidhub_core::AppError;

pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    bcrypt::hash(password, cost)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    bcrypt::verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // cost 4 keeps the tests fast; production cost comes from config
    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("Abcdef12", 4).unwrap();
        assert!(verify_password("Abcdef12", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("Abcdef12", 4).unwrap();
        let b = hash_password("Abcdef12", 4).unwrap();
        assert_ne!(a, b);
    }
}
