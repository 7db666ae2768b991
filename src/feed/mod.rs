//! Secret feed: turns versioned secret bundles into published trust key
//! sets.
//!
//! The feed path runs asynchronously, at low frequency, whenever the
//! secrets-store collaborator reports a change. It never calls into the
//! request path; the two share only the [`TrustKeyStore`].

use std::fmt;
use std::sync::Arc;

use zeroize::Zeroize;

use crate::constants::DEFAULT_KEY_SECRET_PATH;
use crate::keyset::{TrustKeySet, VerificationKey};
use crate::observability::warn;
use crate::store::TrustKeyStore;
use crate::token::JwtAlg;

#[cfg(feature = "subscription")]
mod subscription;

/// One version's opaque secret material.
///
/// The raw bytes are zeroized on drop and redacted from `Debug` output.
#[derive(Clone, Eq, PartialEq, Zeroize)]
#[zeroize(drop)]
pub struct SecretPayload {
    inner: Vec<u8>,
}

impl From<Vec<u8>> for SecretPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self { inner: bytes }
    }
}

impl From<&[u8]> for SecretPayload {
    fn from(bytes: &[u8]) -> Self {
        Self {
            inner: bytes.to_vec(),
        }
    }
}

impl From<&str> for SecretPayload {
    fn from(s: &str) -> Self {
        Self {
            inner: s.as_bytes().to_vec(),
        }
    }
}

impl From<String> for SecretPayload {
    fn from(s: String) -> Self {
        Self {
            inner: s.into_bytes(),
        }
    }
}

impl AsRef<[u8]> for SecretPayload {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretPayload(<{} bytes redacted>)", self.inner.len())
    }
}

/// A read-only snapshot of one versioned secret: the secret material of
/// every live version, in the order the secrets store supplies them.
///
/// Owned by the secrets-store collaborator; handed to this crate on each
/// update.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct VersionedSecret {
    versions: Vec<SecretPayload>,
}

impl VersionedSecret {
    /// Creates a snapshot from version payloads in store order.
    pub fn new(versions: Vec<SecretPayload>) -> Self {
        Self { versions }
    }

    /// Returns an iterator over the version payloads in store order.
    pub fn versions(&self) -> impl Iterator<Item = &SecretPayload> {
        self.versions.iter()
    }

    /// Returns the number of versions in the snapshot.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns `true` if the snapshot contains no versions.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl<P: Into<SecretPayload>> FromIterator<P> for VersionedSecret {
    fn from_iter<T: IntoIterator<Item = P>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// The seam to the secrets-store collaborator: fetch the versioned secret
/// published at a path.
///
/// The client's own polling/refresh scheduling stays on its side of this
/// trait; this crate only consumes snapshots.
pub trait SecretSource {
    /// Error returned by the secrets-store client.
    type Error: std::error::Error;

    /// Fetches the current versioned secret at `path`.
    fn versioned_secret(&self, path: &str) -> Result<VersionedSecret, Self::Error>;
}

/// Converts versioned secret bundles into [`TrustKeySet`]s and publishes
/// them to the shared store.
///
/// One bad version never aborts a whole update, and an update that yields
/// zero usable keys is discarded so the previously published set stays
/// live (availability over freshness). Updates cannot fail terminally;
/// the next upstream notification is the natural retry.
#[derive(Debug)]
pub struct SecretFeedAdapter {
    store: Arc<TrustKeyStore>,
    algorithm: JwtAlg,
    secret_path: String,
}

impl SecretFeedAdapter {
    /// Creates an adapter publishing to `store`, parsing key material for
    /// `algorithm`, watching the default secret path.
    pub fn new(store: Arc<TrustKeyStore>, algorithm: JwtAlg) -> Self {
        Self {
            store,
            algorithm,
            secret_path: DEFAULT_KEY_SECRET_PATH.to_owned(),
        }
    }

    /// Overrides the secrets-store path the adapter fetches from.
    #[must_use]
    pub fn with_secret_path(mut self, path: impl Into<String>) -> Self {
        self.secret_path = path.into();
        self
    }

    /// Returns the secrets-store path this adapter watches.
    pub fn secret_path(&self) -> &str {
        &self.secret_path
    }

    /// Ingests one versioned secret bundle.
    ///
    /// Each version's payload is parsed into a [`VerificationKey`]; parse
    /// failures are logged and skipped. If at least one version parses,
    /// the resulting set (in bundle order) replaces the published set
    /// wholesale; otherwise the update is discarded and the previous set,
    /// if any, remains live.
    pub fn on_secret_update(&self, bundle: &VersionedSecret) {
        let mut keys = Vec::with_capacity(bundle.len());

        for (version, payload) in bundle.versions().enumerate() {
            match VerificationKey::from_pem(payload.as_ref(), self.algorithm) {
                Ok(key) => keys.push(key),
                Err(_e) => {
                    warn!(
                        "Failed to parse trust key: version={}, error={}",
                        version, _e
                    );
                }
            }
        }

        if keys.is_empty() {
            warn!(
                "No usable trust keys in update; keeping previous set: path={}",
                self.secret_path
            );
            return;
        }

        self.store.publish(Arc::new(TrustKeySet::new(keys)));
    }

    /// Fetches the versioned secret at the configured path from `source`
    /// and ingests it.
    ///
    /// A fetch failure is logged and leaves the published set unchanged.
    /// Intended to be registered as the subscription callback with the
    /// secrets-store client.
    pub fn refresh_from<S: SecretSource>(&self, source: &S) {
        match source.versioned_secret(&self.secret_path) {
            Ok(bundle) => self.on_secret_update(&bundle),
            Err(_e) => {
                warn!(
                    "Failed to fetch trust key secret: path={}, error={}",
                    self.secret_path, _e
                );
            }
        }
    }
}
