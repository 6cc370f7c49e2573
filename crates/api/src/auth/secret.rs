//! Static bearer secret for internal routes.
//!
//! Only the SHA-256 digest of the configured secret is kept in memory, and
//! presented secrets are compared digest-to-digest in constant time.

use sha2::{Digest, Sha256};

#[derive(Clone)]
pub struct InternalSecret {
    digest: [u8; 32],
}

impl InternalSecret {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: digest(secret),
        }
    }

    pub fn matches(&self, presented: &str) -> bool {
        let presented = digest(presented);
        self.digest
            .iter()
            .zip(presented.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for InternalSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InternalSecret(<redacted>)")
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_the_configured_secret() {
        let secret = InternalSecret::new("s3cret-value");
        assert!(secret.matches("s3cret-value"));
        assert!(!secret.matches("s3cret-valuE"));
        assert!(!secret.matches(""));
    }

    #[test]
    fn debug_does_not_leak() {
        let secret = InternalSecret::new("s3cret-value");
        assert_eq!(format!("{secret:?}"), "InternalSecret(<redacted>)");
    }
}
