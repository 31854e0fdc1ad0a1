//! Credential verification backed by Argon2id password hashes.

use std::collections::HashMap;
use std::path::Path;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use serde::Deserialize;

use crate::AuthError;

/// The identity behind a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

/// Checks a username/secret pair. Owns all hashing and comparison.
///
/// Implementations must return [`AuthError::InvalidCredentials`] for both an
/// unknown username and a wrong secret.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, username: &str, secret: &str) -> Result<Identity, AuthError>;
}

/// Hash a secret into a PHC string using Argon2id with a random salt.
pub fn hash_secret(secret: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(AuthError::verifier)
}

/// `Ok(false)` on mismatch; `Err` only when `hash` is not a valid PHC string.
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(AuthError::verifier)?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

/// One entry of the users seed file.
///
/// `password_hash` (PHC string) is preferred; a plaintext `password` is hashed at load.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// In-memory username → Argon2 hash table.
pub struct Argon2Credentials {
    hashes: HashMap<String, String>,
    // Verified against for unknown usernames so both failure paths cost the same
    dummy_hash: String,
}

impl Argon2Credentials {
    pub fn new() -> Result<Self, AuthError> {
        Ok(Self {
            hashes: HashMap::new(),
            dummy_hash: hash_secret("shelf-dummy-secret")?,
        })
    }

    /// Build from seed records, hashing plaintext passwords.
    pub fn from_records(records: Vec<UserRecord>) -> Result<Self, AuthError> {
        let mut credentials = Self::new()?;
        for record in records {
            let hash = match (record.password_hash, record.password) {
                (Some(hash), _) => {
                    PasswordHash::new(&hash).map_err(|e| {
                        AuthError::Verifier(format!(
                            "invalid password_hash for '{}': {}",
                            record.username, e
                        ))
                    })?;
                    hash
                }
                (None, Some(plain)) => {
                    tracing::warn!(
                        username = %record.username,
                        "users file holds a plaintext password; hashing at load"
                    );
                    hash_secret(&plain)?
                }
                (None, None) => {
                    return Err(AuthError::Verifier(format!(
                        "user '{}' has neither password nor password_hash",
                        record.username
                    )))
                }
            };
            credentials.hashes.insert(record.username, hash);
        }
        Ok(credentials)
    }

    /// Load the users seed file. A missing file yields an empty table.
    pub fn from_users_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "users file not found; no user can sign in");
                return Self::new();
            }
            Err(e) => {
                return Err(AuthError::Verifier(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let records: Vec<UserRecord> = serde_json::from_str(&raw).map_err(|e| {
            AuthError::Verifier(format!("failed to parse {}: {}", path.display(), e))
        })?;
        let credentials = Self::from_records(records)?;
        tracing::info!(users = credentials.len(), path = %path.display(), "loaded users");
        Ok(credentials)
    }

    /// Add or replace a user with an already hashed secret.
    pub fn with_user(mut self, username: impl Into<String>, hash: impl Into<String>) -> Self {
        self.hashes.insert(username.into(), hash.into());
        self
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[async_trait]
impl CredentialVerifier for Argon2Credentials {
    async fn verify(&self, username: &str, secret: &str) -> Result<Identity, AuthError> {
        let stored = self.hashes.get(username).cloned();
        let known = stored.is_some();
        let hash = stored.unwrap_or_else(|| self.dummy_hash.clone());
        let secret = secret.to_owned();

        // Argon2 is deliberately slow; keep it off the async workers
        let matches = tokio::task::spawn_blocking(move || verify_secret(&secret, &hash))
            .await
            .map_err(AuthError::verifier)??;

        if known && matches {
            Ok(Identity {
                username: username.to_string(),
            })
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_secret("password").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("password", &hash).unwrap());
        assert!(!verify_secret("Password", &hash).unwrap());
        assert!(verify_secret("password", "not-a-phc-string").is_err());
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_secret_look_identical() {
        let credentials = Argon2Credentials::new()
            .unwrap()
            .with_user("admin", hash_secret("password").unwrap());

        let wrong_secret = credentials.verify("admin", "nope").await.unwrap_err();
        let unknown_user = credentials.verify("ghost", "password").await.unwrap_err();

        assert!(matches!(wrong_secret, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_secret.to_string(), unknown_user.to_string());

        let identity = credentials.verify("admin", "password").await.unwrap();
        assert_eq!(identity.username, "admin");
    }

    #[tokio::test]
    async fn users_file_accepts_plaintext_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let hash = hash_secret("s3cret").unwrap();
        std::fs::write(
            &path,
            serde_json::json!([
                { "username": "admin", "password": "password" },
                { "username": "editor", "password_hash": hash }
            ])
            .to_string(),
        )
        .unwrap();

        let credentials = Argon2Credentials::from_users_file(&path).unwrap();
        assert_eq!(credentials.len(), 2);
        assert!(credentials.verify("admin", "password").await.is_ok());
        assert!(credentials.verify("editor", "s3cret").await.is_ok());
    }

    #[test]
    fn missing_users_file_is_empty_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Argon2Credentials::from_users_file(dir.path().join("none.json")).unwrap();
        assert!(credentials.is_empty());
    }

    #[test]
    fn records_without_any_secret_are_rejected() {
        let records = vec![UserRecord {
            username: "admin".to_string(),
            password: None,
            password_hash: None,
        }];
        assert!(Argon2Credentials::from_records(records).is_err());
    }
}
