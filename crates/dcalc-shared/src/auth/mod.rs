//! # Authentication
//!
//! Bearer-token issuing and verification (HS256) plus password hashing for
//! the user store. Tokens carry the username in the `name` claim and live
//! for one hour.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::AuthError;

const TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    name: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

/// HS256 signing and verification keys derived from the shared secret.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys").finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a bearer token for a verified login.
    pub fn issue(&self, username: &str) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            name: username.to_string(),
            nbf: now,
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Verify a bearer token and return the embedded username.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims.name)
    }
}

/// Hash a password with bcrypt at the default cost.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// Check a password against a stored bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    Ok(bcrypt::verify(password, hash)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify_and_carry_the_username() {
        let keys = JwtKeys::new("test-secret");
        let token = keys.issue("alice").unwrap();
        assert_eq!(keys.verify(&token).unwrap(), "alice");
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let keys = JwtKeys::new("test-secret");
        let token = keys.issue("alice").unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        assert!(keys.verify(&tampered).is_err());
    }

    #[test]
    fn tokens_do_not_verify_across_secrets() {
        let token = JwtKeys::new("secret-a").issue("alice").unwrap();
        assert!(JwtKeys::new("secret-b").verify(&token).is_err());
    }

    #[test]
    fn password_hashing_round_trips() {
        // MIN_COST keeps the test fast; production uses DEFAULT_COST.
        let hash = bcrypt::hash("hunter2", 4).unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
