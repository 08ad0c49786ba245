//! Opaque user identity used to tag chat and conversation requests.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tern_core::{generate_local_id, write_text_atomic};

use crate::TernClientError;

const ANONYMOUS_NAME_PREFIX: &str = "anonymous-";
const ANONYMOUS_NAME_SUFFIX_LEN: usize = 5;
const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Anonymous,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Public struct `UserIdentity` used across Tern components.
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: IdentityKind,
}

/// Trait contract for `IdentityProvider` behavior.
pub trait IdentityProvider: Send + Sync {
    fn identity(&self) -> Result<UserIdentity, TernClientError>;
}

#[derive(Debug, Default)]
/// Mints an anonymous identity once and reuses it, optionally across restarts.
pub struct AnonymousIdentityProvider {
    path: Option<PathBuf>,
    cached: Mutex<Option<UserIdentity>>,
}

impl AnonymousIdentityProvider {
    /// Identity that lives only as long as this provider.
    pub fn ephemeral() -> Self {
        Self::default()
    }

    /// Identity persisted as JSON at `path` and reloaded on the next start.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Forgets the identity, removing its file when persisted.
    pub fn clear(&self) -> Result<(), TernClientError> {
        *self.lock_cache()? = None;
        if let Some(path) = self.path.as_deref() {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => {
                    return Err(TernClientError::Identity(format!(
                        "failed to remove {}: {error}",
                        path.display()
                    )))
                }
            }
        }
        Ok(())
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, Option<UserIdentity>>, TernClientError> {
        self.cached
            .lock()
            .map_err(|_| TernClientError::Identity("identity cache lock is poisoned".to_string()))
    }

    fn load(&self, path: &Path) -> Result<Option<UserIdentity>, TernClientError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(TernClientError::Identity(format!(
                    "failed to read {}: {error}",
                    path.display()
                )))
            }
        };
        match serde_json::from_str::<UserIdentity>(&raw) {
            Ok(identity) if !identity.id.trim().is_empty() => Ok(Some(identity)),
            Ok(_) => Ok(None),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "replacing unreadable identity file"
                );
                Ok(None)
            }
        }
    }
}

impl IdentityProvider for AnonymousIdentityProvider {
    fn identity(&self) -> Result<UserIdentity, TernClientError> {
        let mut cached = self.lock_cache()?;
        if let Some(identity) = cached.as_ref() {
            return Ok(identity.clone());
        }

        let loaded = match self.path.as_deref() {
            Some(path) => self.load(path)?,
            None => None,
        };
        let identity = match loaded {
            Some(identity) => identity,
            None => {
                let identity = generate_anonymous_identity();
                if let Some(path) = self.path.as_deref() {
                    let encoded = serde_json::to_string_pretty(&identity)?;
                    write_text_atomic(path, &encoded)
                        .map_err(|error| TernClientError::Identity(format!("{error:#}")))?;
                }
                tracing::info!(user_id = %identity.id, name = %identity.name, "created anonymous identity");
                identity
            }
        };
        *cached = Some(identity.clone());
        Ok(identity)
    }
}

fn generate_anonymous_identity() -> UserIdentity {
    let id = generate_local_id("user");
    let mut hasher = RandomState::new().build_hasher();
    hasher.write(id.as_bytes());
    let mut seed = hasher.finish();
    let mut name = String::from(ANONYMOUS_NAME_PREFIX);
    for _ in 0..ANONYMOUS_NAME_SUFFIX_LEN {
        let index = (seed % NAME_ALPHABET.len() as u64) as usize;
        name.push(char::from(NAME_ALPHABET[index]));
        seed /= NAME_ALPHABET.len() as u64;
    }
    UserIdentity {
        id,
        name,
        kind: IdentityKind::Anonymous,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{AnonymousIdentityProvider, IdentityKind, IdentityProvider, ANONYMOUS_NAME_PREFIX};

    #[test]
    fn unit_anonymous_identity_has_prefixed_name() {
        let provider = AnonymousIdentityProvider::ephemeral();
        let identity = provider.identity().expect("identity");
        assert_eq!(identity.kind, IdentityKind::Anonymous);
        assert!(identity.id.starts_with("user_"));
        let suffix = identity
            .name
            .strip_prefix(ANONYMOUS_NAME_PREFIX)
            .expect("prefixed name");
        assert_eq!(suffix.len(), 5);
        assert!(suffix.chars().all(|ch| ch.is_ascii_alphanumeric()));
        assert_eq!(provider.identity().expect("cached"), identity);
    }

    #[test]
    fn integration_persistent_identity_is_reused_across_providers() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("identity.json");

        let first = AnonymousIdentityProvider::persistent(&path)
            .identity()
            .expect("first identity");
        let raw = std::fs::read_to_string(&path).expect("identity file");
        assert!(raw.contains("\"type\": \"anonymous\""));

        let second = AnonymousIdentityProvider::persistent(&path)
            .identity()
            .expect("second identity");
        assert_eq!(first, second);
    }

    #[test]
    fn functional_clear_forgets_persisted_identity() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("identity.json");
        let provider = AnonymousIdentityProvider::persistent(&path);
        let first = provider.identity().expect("identity");

        provider.clear().expect("clear");
        assert!(!path.exists());
        provider.clear().expect("clear twice");

        let second = provider.identity().expect("new identity");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn regression_corrupt_identity_file_is_replaced() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("identity.json");
        std::fs::write(&path, "{not json").expect("write corrupt file");

        let identity = AnonymousIdentityProvider::persistent(&path)
            .identity()
            .expect("identity");
        let reloaded: super::UserIdentity =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(reloaded, identity);
    }
}
