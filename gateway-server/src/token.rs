//! Access token issuing and verification.
//!
//! Tokens are HS256 JWTs carrying the subject id, issue and expiry times, and
//! optionally the caller's role and display attributes.

use crate::config::TokenConfig;
use crate::errors::StartupError;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, warn};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Shortest accepted HMAC key, in bytes
pub const MIN_KEY_LEN: usize = 32;
const GENERATED_KEY_LEN: usize = 64;

/// Reasons a presented token is rejected
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Malformed access token")]
    Malformed,
    #[error("Access token signature is invalid")]
    InvalidSignature,
    #[error("Access token has expired")]
    Expired,
}

#[derive(Debug, Error)]
#[error("Failed to sign access token: {0}")]
pub struct IssueError(#[from] jsonwebtoken::errors::Error);

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, String>,
}

/// Identity a token is issued for
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Grant {
    #[serde(alias = "user_id")]
    pub subject: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Grant {
    pub fn subject(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// The verified caller of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub role: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Response body for operations that hand out tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// HMAC key material; never printed
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<{} bytes>)", self.0.len())
    }
}

impl SigningKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, StartupError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_KEY_LEN {
            return Err(StartupError::WeakSigningKey {
                len: bytes.len(),
                min: MIN_KEY_LEN,
            });
        }
        Ok(Self(bytes))
    }

    /// Random key valid for the lifetime of this process only
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; GENERATED_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Resolves the key: inline secret, then key file, then (only if allowed) a generated key
    pub fn from_config(config: &TokenConfig) -> Result<Self, StartupError> {
        if let Some(secret) = &config.secret {
            return Self::new(secret.as_bytes());
        }

        if let Some(path) = &config.secret_file {
            let contents =
                std::fs::read_to_string(path).map_err(|source| StartupError::SigningKeyFile {
                    path: PathBuf::from(path),
                    source,
                })?;
            return Self::new(contents.trim().as_bytes());
        }

        if config.ephemeral_key {
            warn!(
                "Using a generated token signing key; every issued token becomes invalid when the process restarts"
            );
            return Ok(Self::generate());
        }

        Err(StartupError::MissingSigningKey)
    }
}

/// Issues and verifies access tokens with a single signing key
#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: u64,
}

impl TokenAuthority {
    pub fn new(key: &SigningKey, ttl: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(&key.0),
            decoding: DecodingKey::from_secret(&key.0),
            validation,
            ttl,
        }
    }

    /// Token lifetime in seconds
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Issues a token for a bare subject id
    pub fn issue(&self, subject: &str) -> Result<IssuedToken, IssueError> {
        self.issue_for(&Grant::subject(subject))
    }

    pub fn issue_for(&self, grant: &Grant) -> Result<IssuedToken, IssueError> {
        self.issue_at(grant, Utc::now().timestamp())
    }

    pub(crate) fn issue_at(&self, grant: &Grant, issued_at: i64) -> Result<IssuedToken, IssueError> {
        let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: grant.subject.clone(),
            iat: issued_at,
            exp: issued_at.saturating_add(ttl),
            role: grant.role.clone(),
            attrs: grant.attributes.clone(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!("Issued access token for subject '{}'", grant.subject);

        Ok(IssuedToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl,
        })
    }

    /// Checks signature, then expiry, and resolves the caller
    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!("Access token rejected: {e}");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                _ => AuthError::Malformed,
            }
        })?;

        let claims = data.claims;
        Ok(Principal {
            subject: claims.sub,
            role: claims.role,
            attributes: claims.attrs,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test-signing-key-that-is-at-least-32-bytes";

    fn authority(key: &str) -> TokenAuthority {
        TokenAuthority::new(&SigningKey::new(key.as_bytes()).unwrap(), 3600)
    }

    fn token_config() -> TokenConfig {
        TokenConfig {
            secret: None,
            secret_file: None,
            ephemeral_key: false,
            ttl: 3600,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = authority(KEY);
        let issued = tokens.issue("user-42").unwrap();
        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, 3600);

        let principal = tokens.verify(&issued.access_token).unwrap();
        assert_eq!(principal.subject, "user-42");
        assert_eq!(principal.role, None);
        assert_eq!(principal.expires_at - principal.issued_at, 3600);
    }

    #[test]
    fn test_role_and_attributes_round_trip() {
        let tokens = authority(KEY);
        let mut grant = Grant::subject("user-42").with_role("admin");
        grant
            .attributes
            .insert("email".to_string(), "admin@example.com".to_string());

        let issued = tokens.issue_for(&grant).unwrap();
        let principal = tokens.verify(&issued.access_token).unwrap();
        assert_eq!(principal.role.as_deref(), Some("admin"));
        assert_eq!(principal.attributes["email"], "admin@example.com");
    }

    #[test]
    fn test_verify_is_idempotent() {
        let tokens = authority(KEY);
        let issued = tokens.issue("user-42").unwrap();
        let first = tokens.verify(&issued.access_token).unwrap();
        let second = tokens.verify(&issued.access_token).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_expired_token() {
        let tokens = authority(KEY);
        let issued = tokens
            .issue_at(&Grant::subject("user-42"), Utc::now().timestamp() - 7200)
            .unwrap();
        assert_eq!(tokens.verify(&issued.access_token), Err(AuthError::Expired));
    }

    #[test]
    fn test_signature_from_other_key() {
        let issued = authority("another-signing-key-that-is-32-bytes-long")
            .issue("user-42")
            .unwrap();
        assert_eq!(
            authority(KEY).verify(&issued.access_token),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_signature_checked_before_expiry() {
        let issued = authority("another-signing-key-that-is-32-bytes-long")
            .issue_at(&Grant::subject("user-42"), Utc::now().timestamp() - 7200)
            .unwrap();
        assert_eq!(
            authority(KEY).verify(&issued.access_token),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let tokens = authority(KEY);
        for token in ["", "not-a-token", "a.b.c", "eyJhbGciOiJIUzI1NiJ9.e30"] {
            assert_eq!(tokens.verify(token), Err(AuthError::Malformed), "{token:?}");
        }
    }

    #[test]
    fn test_tampered_payload() {
        let tokens = authority(KEY);
        let issued = tokens.issue("user-42").unwrap();
        let other = tokens.issue("user-43").unwrap();

        let parts: Vec<&str> = issued.access_token.split('.').collect();
        let other_parts: Vec<&str> = other.access_token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);

        assert_eq!(tokens.verify(&forged), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(matches!(
            SigningKey::new("short".as_bytes()),
            Err(StartupError::WeakSigningKey { len: 5, min: MIN_KEY_LEN })
        ));
    }

    #[test]
    fn test_key_from_inline_secret() {
        let config = TokenConfig {
            secret: Some(KEY.to_string()),
            ..token_config()
        };
        let key = SigningKey::from_config(&config).unwrap();
        let issued = TokenAuthority::new(&key, 60).issue("user-42").unwrap();
        assert!(authority(KEY).verify(&issued.access_token).is_ok());
    }

    #[test]
    fn test_key_from_file_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt.key");
        std::fs::write(&path, format!("{KEY}\n")).unwrap();
        let config = TokenConfig {
            secret_file: Some(path.to_string_lossy().into_owned()),
            ..token_config()
        };

        let before = TokenAuthority::new(&SigningKey::from_config(&config).unwrap(), 60);
        let issued = before.issue("user-42").unwrap();

        let after = TokenAuthority::new(&SigningKey::from_config(&config).unwrap(), 60);
        assert_eq!(after.verify(&issued.access_token).unwrap().subject, "user-42");
    }

    #[test]
    fn test_missing_key_file() {
        let config = TokenConfig {
            secret_file: Some("/nonexistent/jwt.key".to_string()),
            ..token_config()
        };
        assert!(matches!(
            SigningKey::from_config(&config),
            Err(StartupError::SigningKeyFile { .. })
        ));
    }

    #[test]
    fn test_no_key_without_ephemeral_opt_in() {
        assert!(matches!(
            SigningKey::from_config(&token_config()),
            Err(StartupError::MissingSigningKey)
        ));
    }

    #[test]
    fn test_ephemeral_keys_differ_per_process() {
        let config = TokenConfig {
            ephemeral_key: true,
            ..token_config()
        };
        let first = TokenAuthority::new(&SigningKey::from_config(&config).unwrap(), 60);
        let second = TokenAuthority::new(&SigningKey::from_config(&config).unwrap(), 60);

        let issued = first.issue("user-42").unwrap();
        assert!(first.verify(&issued.access_token).is_ok());
        assert_eq!(
            second.verify(&issued.access_token),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_grant_accepts_user_id_alias() {
        let grant: Grant =
            serde_json::from_str(r#"{"user_id": "42", "role": "admin"}"#).unwrap();
        assert_eq!(grant, Grant::subject("42").with_role("admin"));
    }
}
