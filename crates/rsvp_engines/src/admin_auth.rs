#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};

/// Shared-secret check for admin requests. Holds only the digest of the secret.
#[derive(Clone)]
pub struct SharedSecretAuthenticator {
    secret_digest: Option<[u8; 32]>,
}

impl SharedSecretAuthenticator {
    /// A missing or blank secret yields an authenticator that rejects everything.
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret_digest: secret.filter(|s| !s.trim().is_empty()).map(digest),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret_digest.is_some()
    }

    /// Byte-for-byte equality of the presented secret, compared via digests.
    pub fn verify(&self, presented: Option<&str>) -> bool {
        let (Some(expected), Some(presented)) = (self.secret_digest.as_ref(), presented) else {
            return false;
        };
        let got = digest(presented);
        expected
            .iter()
            .zip(got.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for SharedSecretAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretAuthenticator")
            .field("configured", &self.is_configured())
            .finish()
    }
}

fn digest(raw: &str) -> [u8; 32] {
    Sha256::digest(raw.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_auth_01_exact_match_only() {
        let auth = SharedSecretAuthenticator::new(Some("s3cret"));
        assert!(auth.verify(Some("s3cret")));
        assert!(!auth.verify(Some("s3cret ")));
        assert!(!auth.verify(Some("S3CRET")));
        assert!(!auth.verify(Some("")));
        assert!(!auth.verify(None));
    }

    #[test]
    fn at_auth_02_unconfigured_rejects_everything() {
        for secret in [None, Some(""), Some("   ")] {
            let auth = SharedSecretAuthenticator::new(secret);
            assert!(!auth.is_configured());
            assert!(!auth.verify(Some("")));
            assert!(!auth.verify(Some("anything")));
        }
    }

    #[test]
    fn at_auth_03_debug_hides_digest() {
        let auth = SharedSecretAuthenticator::new(Some("s3cret"));
        assert_eq!(
            format!("{auth:?}"),
            "SharedSecretAuthenticator { configured: true }"
        );
    }
}
