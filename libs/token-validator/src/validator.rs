// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Token validator and token trait.

use std::{marker::PhantomData, time::SystemTime};

use jsonwebtoken::{
    Algorithm, DecodingKey, TokenData, Validation, decode, errors::Error as JwtError,
};
use serde::Deserialize;
use thiserror::Error;

/// Token is the interface for token claims. It provides the subject, the
/// expiration time and the claims a token must carry.
pub trait Token: std::fmt::Debug + Send + Clone + 'static {
    /// Returns the subject the token was issued to.
    fn subject(&self) -> &str;
    /// Returns the absolute expiration time of the token.
    fn exp_time(&self) -> SystemTime;
    /// Returns the required claims for the token.
    fn required_claims() -> Vec<&'static str>;
}

/// TokenValidator is the interface to validate a JWT token and extract the
/// claims.
pub trait TokenValidator<C>: Send + Sync
where
    C: for<'de> Deserialize<'de> + Token + Clone,
{
    /// Validates the token and returns the claims if the token is valid.
    fn validate(&self, now: SystemTime, token: &str) -> Result<C, TokenValidatorError>;
}

/// Token validation errors.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TokenValidatorError {
    /// JWT errors.
    #[error("JWT error: {0}")]
    JwtError(#[from] JwtError),
    /// Expired token error.
    #[error("token expired: {0:?}")]
    TokenExpired(SystemTime),
}

/// A validator for JWT tokens using the EdDSA algorithm. The validator also
/// checks for the required claims in the token and checks if the token is
/// expired.
#[derive(Clone)]
pub struct Validator<C>
where
    C: for<'de> Deserialize<'de> + Token,
{
    public_key: DecodingKey,
    validator: Validation,

    // `fn() -> C` keeps the validator `Sync` whatever `C` is.
    _marker: PhantomData<fn() -> C>,
}

impl<C> Validator<C>
where
    C: for<'de> Deserialize<'de> + Token,
{
    /// Creates a new token validator.
    ///
    /// # Arguments
    /// * `public_key`: The public key to verify the token signature.
    /// * `audience`: Optional audience to validate the token against. If `None`, the audience is
    ///   not validated.
    pub fn new(public_key: DecodingKey, audience: Option<&[&str]>) -> Self {
        let mut validator = Validation::new(Algorithm::EdDSA);
        validator.set_required_spec_claims(&C::required_claims());
        validator.leeway = 0;
        if let Some(audience) = audience {
            validator.set_audience(audience);
        }

        Self {
            public_key,
            validator,
            _marker: PhantomData,
        }
    }

    /// Creates a validator from a PEM encoded Ed25519 public key.
    pub fn from_public_key_pem(
        pem: &[u8],
        audience: Option<&[&str]>,
    ) -> Result<Self, TokenValidatorError> {
        Ok(Self::new(DecodingKey::from_ed_pem(pem)?, audience))
    }
}

impl<C> TokenValidator<C> for Validator<C>
where
    C: for<'de> Deserialize<'de> + Token,
{
    fn validate(&self, now: SystemTime, token: &str) -> Result<C, TokenValidatorError> {
        let token_data: TokenData<C> = decode::<C>(token, &self.public_key, &self.validator)
            .map_err(TokenValidatorError::JwtError)?;

        let token_exp = token_data.claims.exp_time();
        if now > token_exp {
            return Err(TokenValidatorError::TokenExpired(token_exp));
        }

        Ok(token_data.claims)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use insecure::*;

#[cfg(any(test, feature = "test-util"))]
mod insecure {
    use ed25519_dalek::pkcs8::{EncodePrivateKey, EncodePublicKey};
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use pem::Pem;
    use serde::Serialize;

    /// Returns constant key pair in PEM format for testing purposes.
    pub fn insecure_const_ed25519_key_pair_pem() -> (Pem, Pem) {
        let signing_key = insecure_const_ed25519_signing_key();

        let public_key =
            ed25519_dalek::pkcs8::PublicKeyBytes(*signing_key.verifying_key().as_bytes());

        let kp = ed25519_dalek::pkcs8::KeypairBytes {
            secret_key: *signing_key.as_bytes(),
            public_key: Some(public_key),
        };

        let private_pem = Pem::new("PRIVATE KEY", kp.to_pkcs8_der().unwrap().as_bytes());
        let public_pem = Pem::new(
            "PUBLIC KEY",
            public_key.to_public_key_der().unwrap().as_bytes(),
        );

        (private_pem, public_pem)
    }

    /// Returns a constant Ed25519 signing key for testing purposes.
    pub fn insecure_const_ed25519_signing_key() -> ed25519_dalek::SigningKey {
        let seed = [43u8; 32];
        ed25519_dalek::SigningKey::from_bytes(&seed)
    }

    /// Signs `claims` with the constant test key.
    pub fn insecure_sign<C: Serialize>(claims: &C) -> String {
        let (private_pem, _) = insecure_const_ed25519_key_pair_pem();
        let key = EncodingKey::from_ed_pem(pem::encode(&private_pem).as_bytes()).unwrap();
        encode(&Header::new(Algorithm::EdDSA), claims, &key).unwrap()
    }

    /// The constant test public key, PEM encoded.
    pub fn insecure_public_key_pem() -> String {
        pem::encode(&insecure_const_ed25519_key_pair_pem().1)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use serde::Serialize;

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TestClaims {
        sub: String,
        exp: u64,
    }

    impl Token for TestClaims {
        fn subject(&self) -> &str {
            &self.sub
        }

        fn exp_time(&self) -> SystemTime {
            UNIX_EPOCH + Duration::from_secs(self.exp)
        }

        fn required_claims() -> Vec<&'static str> {
            vec!["sub", "exp"]
        }
    }

    fn validator() -> Validator<TestClaims> {
        Validator::from_public_key_pem(insecure_public_key_pem().as_bytes(), None).unwrap()
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn accepts_valid_token() {
        let token = insecure_sign(&TestClaims {
            sub: "admin@example.com".into(),
            exp: now_secs() + 300,
        });
        let claims = validator().validate(SystemTime::now(), &token).unwrap();
        assert_eq!(claims.subject(), "admin@example.com");
    }

    #[test]
    fn rejects_expired_token() {
        let token = insecure_sign(&TestClaims {
            sub: "admin@example.com".into(),
            exp: now_secs() + 10,
        });
        let later = SystemTime::now() + Duration::from_secs(60);
        assert!(matches!(
            validator().validate(later, &token),
            Err(TokenValidatorError::TokenExpired(_))
        ));
    }

    #[test]
    fn rejects_token_without_required_claim() {
        #[derive(Serialize)]
        struct NoSubject {
            exp: u64,
        }
        let token = insecure_sign(&NoSubject {
            exp: now_secs() + 300,
        });
        assert!(matches!(
            validator().validate(SystemTime::now(), &token),
            Err(TokenValidatorError::JwtError(_))
        ));
    }

    #[test]
    fn rejects_tampered_signature() {
        let token = insecure_sign(&TestClaims {
            sub: "member@example.com".into(),
            exp: now_secs() + 300,
        });
        let (signed, signature) = token.rsplit_once('.').unwrap();
        let flipped = if signature.starts_with('A') { 'B' } else { 'A' };
        let tampered = format!("{signed}.{flipped}{}", &signature[1..]);
        assert!(matches!(
            validator().validate(SystemTime::now(), &tampered),
            Err(TokenValidatorError::JwtError(_))
        ));
    }
}
