//! # rf-auth-simple
//!
//! HMAC-SHA256 implementation of `AuthProvider`.
//! Tokens look like `<user_id>.<hex signature>` and carry nothing else.

use hmac::{Hmac, Mac};
use rf_core::models::UserId;
use rf_core::traits::AuthProvider;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct SimpleAuthProvider {
    /// Signing key shared by every instance that must accept the same tokens.
    secret: Vec<u8>,
}

impl SimpleAuthProvider {
    /// Accepts a secret string (e.g., from configuration)
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, user: &str) -> HmacSha256 {
        // HMAC takes keys of any length, so this cannot fail.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
        mac.update(user.as_bytes());
        mac
    }
}

impl AuthProvider for SimpleAuthProvider {
    fn authenticate(&self, token: &str) -> Option<UserId> {
        let (user, signature) = token.split_once('.')?;
        let user_id: UserId = user.parse().ok().filter(|id| *id > 0)?;
        let signature = hex::decode(signature).ok()?;

        // verify_slice compares in constant time.
        match self.mac(user).verify_slice(&signature) {
            Ok(()) => Some(user_id),
            Err(_) => {
                tracing::debug!(user_id, "token signature mismatch");
                None
            }
        }
    }

    fn issue_token(&self, user: UserId) -> String {
        let user = user.to_string();
        let signature = hex::encode(self.mac(&user).finalize().into_bytes());
        format!("{user}.{signature}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_round_trip() {
        let auth = SimpleAuthProvider::new("s3cret");
        let token = auth.issue_token(42);
        assert!(token.starts_with("42."));
        assert_eq!(auth.authenticate(&token), Some(42));
    }

    #[test]
    fn rejects_forged_and_malformed_tokens() {
        let auth = SimpleAuthProvider::new("s3cret");
        let other = SimpleAuthProvider::new("different");

        let token = auth.issue_token(7);
        let (_, sig) = token.split_once('.').unwrap();

        assert_eq!(other.authenticate(&token), None);
        assert_eq!(auth.authenticate(&format!("8.{sig}")), None);
        assert_eq!(auth.authenticate("7"), None);
        assert_eq!(auth.authenticate("7.zz"), None);
        assert_eq!(auth.authenticate(""), None);
    }

    #[test]
    fn non_positive_user_ids_are_refused() {
        let auth = SimpleAuthProvider::new("s3cret");
        assert_eq!(auth.authenticate(&auth.issue_token(0)), None);
    }
}
