/// bcrypt wrapper. The salt is random per call and embedded in the hash string.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, plaintext: &str) -> anyhow::Result<String> {
        Ok(bcrypt::hash(plaintext, self.cost)?)
    }

    /// Malformed hashes verify as `false` instead of erroring.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        bcrypt::verify(plaintext, hash).unwrap_or(false)
    }

    /// bcrypt is CPU-bound; run it off the async workers.
    pub async fn hash_async(&self, plaintext: String) -> anyhow::Result<String> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext)).await?
    }

    pub async fn verify_async(&self, plaintext: String, hash: String) -> anyhow::Result<bool> {
        let hasher = *self;
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &hash)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_round_trip() {
        let hasher = PasswordHasher::new(TEST_COST);
        let hash = hasher.hash("User@123").unwrap();
        assert!(hasher.verify("User@123", &hash));
        assert!(!hasher.verify("User@124", &hash));
    }

    #[test]
    fn test_same_input_gets_a_fresh_salt() {
        let hasher = PasswordHasher::new(TEST_COST);
        let a = hasher.hash("same").unwrap();
        let b = hasher.hash("same").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("same", &a) && hasher.verify("same", &b));
    }

    #[test]
    fn test_malformed_hash_is_false_not_error() {
        let hasher = PasswordHasher::new(TEST_COST);
        assert!(!hasher.verify("anything", "not-a-bcrypt-hash"));
        assert!(!hasher.verify("anything", ""));
    }

    #[tokio::test]
    async fn test_async_variants() {
        let hasher = PasswordHasher::new(TEST_COST);
        let hash = hasher.hash_async("Admin@123".into()).await.unwrap();
        assert!(hasher.verify_async("Admin@123".into(), hash).await.unwrap());
    }
}
