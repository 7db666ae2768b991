//! Trust key set types.
//!
//! A [`TrustKeySet`] is the ordered collection of public keys a service
//! currently accepts as having signed valid identity tokens. Keys carry no
//! persistent identifier; they are addressed only by their position in the
//! set, and replaced wholesale on rotation.

use std::fmt;

use jsonwebtoken::DecodingKey;
use thiserror::Error;

use crate::token::JwtAlg;

/// An error that can arise parsing a [`VerificationKey`] from key material.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyParseError {
    /// The payload is empty.
    #[error("empty key material")]
    Empty,

    /// The payload is not a parseable public key for the configured
    /// algorithm family.
    #[error("cannot parse public key material")]
    Decode(#[source] jsonwebtoken::errors::Error),
}

/// One asymmetric public key, usable to check identity-token signatures
/// under a single algorithm.
#[derive(Clone)]
pub struct VerificationKey {
    key: DecodingKey,
    algorithm: JwtAlg,
}

impl VerificationKey {
    /// Parses a verification key from PEM-encoded public key material for
    /// the given algorithm family.
    ///
    /// Parsing happens once, at ingestion time, so that the request path
    /// never pays for key decoding.
    ///
    /// # Errors
    ///
    /// Returns [`KeyParseError`] if the payload is empty or is not a
    /// PEM public key of the family `algorithm` verifies with.
    pub fn from_pem(pem: &[u8], algorithm: JwtAlg) -> Result<Self, KeyParseError> {
        if pem.is_empty() {
            return Err(KeyParseError::Empty);
        }

        let key = if algorithm.is_rsa() {
            DecodingKey::from_rsa_pem(pem)
        } else {
            DecodingKey::from_ec_pem(pem)
        }
        .map_err(KeyParseError::Decode)?;

        Ok(Self { key, algorithm })
    }

    /// Returns the algorithm this key verifies.
    pub const fn algorithm(&self) -> JwtAlg {
        self.algorithm
    }

    pub(crate) const fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("key", &"<DecodingKey>")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// The ordered set of all currently trusted verification keys.
///
/// Order is the order supplied by the secret bundle; the validator tries
/// keys in this order. Sets are immutable once built and replaced as a
/// whole by the feed adapter.
#[derive(Debug, Clone, Default)]
pub struct TrustKeySet {
    keys: Vec<VerificationKey>,
}

impl TrustKeySet {
    /// Creates a key set from keys in bundle order.
    pub fn new(keys: Vec<VerificationKey>) -> Self {
        Self { keys }
    }

    /// Returns the number of trusted keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set contains no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns an iterator over the keys in trust order.
    pub fn iter(&self) -> impl Iterator<Item = &VerificationKey> {
        self.keys.iter()
    }
}

impl From<Vec<VerificationKey>> for TrustKeySet {
    fn from(keys: Vec<VerificationKey>) -> Self {
        Self::new(keys)
    }
}

impl FromIterator<VerificationKey> for TrustKeySet {
    fn from_iter<T: IntoIterator<Item = VerificationKey>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
