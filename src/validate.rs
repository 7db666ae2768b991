//! Token validation against the published trust key set.
//!
//! The validator runs inline with request handling: it reads whichever
//! [`TrustKeySet`] snapshot is currently published and verifies the
//! presented token against each trusted key in order. Failures caused by
//! the token's own shape or claims abort immediately (no other key can
//! change the outcome); only a pure signature mismatch moves on to the
//! next key, because that is the one failure rotation can fix.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;

use crate::keyset::TrustKeySet;
use crate::store::TrustKeyStore;
use crate::token::{self, AuthenticationToken, JwtAlg, TokenError};

/// What the validation loop does after one key attempt fails.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Disposition {
    /// The failure is a property of the token itself; stop immediately.
    Abort,
    /// A different trusted key could still verify this token; keep going.
    TryNextKey,
}

/// Classified outcome of one failed key attempt.
///
/// This taxonomy is owned by this crate; it is deliberately decoupled
/// from the verification library's internal error codes so the
/// short-circuit table below stays closed and directly testable.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum RejectKind {
    /// The token is not structurally a signed-claims token.
    Malformed,
    /// The token's audience does not match the expected audience.
    AudienceMismatch,
    /// The token's expiry is in the past.
    Expired,
    /// The token claims to have been issued, or to become valid, in the
    /// future.
    IssuedInFuture,
    /// The token's issuer does not match the expected issuer.
    IssuerMismatch,
    /// The token's ID claim is present but invalid.
    InvalidId,
    /// A required claim is missing or malformed.
    InvalidClaims,
    /// The signature did not verify under the attempted key, or the
    /// failure could not be attributed to the token itself.
    SignatureMismatch,
}

impl RejectKind {
    /// The short-circuit table: whether a failure of this kind aborts the
    /// validation loop or moves on to the next trusted key.
    ///
    /// Everything except [`RejectKind::SignatureMismatch`] is a property
    /// of the presented token, independent of which key was tried, so
    /// retrying other keys cannot change the outcome.
    pub const fn disposition(self) -> Disposition {
        match self {
            Self::Malformed
            | Self::AudienceMismatch
            | Self::Expired
            | Self::IssuedInFuture
            | Self::IssuerMismatch
            | Self::InvalidId
            | Self::InvalidClaims => Disposition::Abort,
            Self::SignatureMismatch => Disposition::TryNextKey,
        }
    }

    /// Returns a stable, low-cardinality label for this kind, suitable
    /// for diagnostics and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::AudienceMismatch => "audience_mismatch",
            Self::Expired => "expired",
            Self::IssuedInFuture => "issued_in_future",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::InvalidId => "invalid_id",
            Self::InvalidClaims => "invalid_claims",
            Self::SignatureMismatch => "signature_mismatch",
        }
    }
}

impl fmt::Display for RejectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`TokenValidator::validate`].
///
/// All rejection variants are opaque authentication failures to callers;
/// the carried [`RejectKind`] exists for diagnostics, not for branching
/// authorization decisions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ValidateError {
    /// No trust key set has ever been published.
    ///
    /// A startup/availability condition, not a property of the presented
    /// token; it resolves itself once the secret feed publishes a set.
    #[error("no trust keys available")]
    NoKeysAvailable,

    /// The token failed validation.
    #[error("authentication token rejected: {0}")]
    Rejected(RejectKind),
}

impl ValidateError {
    /// Returns the rejection kind, if this is a rejection.
    pub const fn reject_kind(&self) -> Option<RejectKind> {
        match self {
            Self::Rejected(kind) => Some(*kind),
            Self::NoKeysAvailable => None,
        }
    }
}

/// Maps a verification-library error into this crate's taxonomy.
///
/// Anything the mapping cannot attribute to the token itself lands in
/// [`RejectKind::SignatureMismatch`], the only kind the loop retries.
fn classify(err: &jsonwebtoken::errors::Error) -> RejectKind {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::Json(_) => RejectKind::Malformed,
        ErrorKind::ExpiredSignature => RejectKind::Expired,
        ErrorKind::ImmatureSignature => RejectKind::IssuedInFuture,
        ErrorKind::InvalidAudience => RejectKind::AudienceMismatch,
        ErrorKind::InvalidIssuer => RejectKind::IssuerMismatch,
        ErrorKind::InvalidSubject | ErrorKind::MissingRequiredClaim(_) => RejectKind::InvalidClaims,
        _ => RejectKind::SignatureMismatch,
    }
}

fn reject_structural(err: TokenError) -> ValidateError {
    let kind = match err {
        TokenError::InvalidExpiration => RejectKind::InvalidClaims,
        _ => RejectKind::Malformed,
    };
    ValidateError::Rejected(kind)
}

/// Builder for [`TokenValidator`].
#[derive(Debug, Clone, Default)]
pub struct TokenValidatorBuilder {
    algorithm: JwtAlg,
    audience: Option<Vec<String>>,
    issuer: Option<String>,
    leeway: u64,
}

impl TokenValidatorBuilder {
    /// Creates a builder with the defaults: RS256, no expected audience or
    /// issuer, zero clock-skew leeway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the single accepted signing algorithm.
    #[must_use]
    pub fn algorithm(mut self, algorithm: JwtAlg) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Requires the token audience to intersect `audience`.
    #[must_use]
    pub fn audience<I, T>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.audience = Some(audience.into_iter().map(Into::into).collect());
        self
    }

    /// Requires the token issuer to equal `issuer`.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Allows `seconds` of clock skew when evaluating temporal claims.
    #[must_use]
    pub fn leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    /// Builds a validator reading trust keys from `store`.
    pub fn build(self, store: Arc<TrustKeyStore>) -> TokenValidator {
        let mut validation = jsonwebtoken::Validation::new(self.algorithm.to_jsonwebtoken());
        validation.leeway = self.leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Audience is enforced by this crate in `check_claims` (only when an
        // expected audience is configured); disable jsonwebtoken's own
        // audience check so a token carrying an `aud` claim is not rejected
        // when no expected audience is configured.
        validation.validate_aud = false;
        if let Some(aud) = &self.audience {
            validation.set_audience(aud);
        }
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }

        TokenValidator {
            store,
            audience: self.audience,
            issuer: self.issuer,
            leeway: self.leeway,
            validation,
        }
    }
}

/// Verifies presented identity tokens against the current trust key set.
///
/// `validate` performs no I/O and never suspends; it is safe to call from
/// unboundedly many concurrent request handlers. Its cost is bounded by
/// the number of trusted keys, a small constant. Requests in flight while
/// a rotation publishes may observe either the old or the new set; a
/// token signed by a just-rotated-out key can therefore succeed for some
/// concurrent requests and fail for others during the switch window.
#[derive(Debug)]
pub struct TokenValidator {
    store: Arc<TrustKeyStore>,
    audience: Option<Vec<String>>,
    issuer: Option<String>,
    leeway: u64,
    validation: jsonwebtoken::Validation,
}

impl TokenValidator {
    /// Creates a validator with default configuration (RS256, no audience
    /// or issuer requirement, zero leeway).
    pub fn new(store: Arc<TrustKeyStore>) -> Self {
        TokenValidatorBuilder::new().build(store)
    }

    /// Creates a builder for configuring a validator.
    pub fn builder() -> TokenValidatorBuilder {
        TokenValidatorBuilder::new()
    }

    /// Validates a presented token and returns its decoded claims.
    ///
    /// Trusted keys are tried in stored order; the first key that
    /// verifies the token wins. Failures that are properties of the token
    /// itself (shape, expiry, audience, issuer, claims) abort without
    /// trying further keys.
    ///
    /// # Errors
    ///
    /// - [`ValidateError::NoKeysAvailable`] if no trust key set has ever
    ///   been published.
    /// - [`ValidateError::Rejected`] if the token fails validation; the
    ///   carried [`RejectKind`] is [`RejectKind::SignatureMismatch`] when
    ///   the token is well-formed but signed by no trusted key.
    pub fn validate(&self, token: &str) -> Result<AuthenticationToken, ValidateError> {
        let Some(keys) = self.store.load() else {
            return Err(ValidateError::NoKeysAvailable);
        };
        // The feed adapter never publishes an empty set; treat one as the
        // same availability condition rather than a token failure.
        if keys.is_empty() {
            return Err(ValidateError::NoKeysAvailable);
        }

        // Structural decode and claim evaluation happen before any
        // signature work, so short-circuit failures cost zero key
        // attempts no matter how many keys are trusted.
        let unverified = token::parse_unverified(token).map_err(reject_structural)?;
        self.check_claims(&unverified)?;

        self.verify_signature(token, &keys)
    }

    /// Evaluates temporal and audience/issuer claims against configuration.
    fn check_claims(&self, claims: &AuthenticationToken) -> Result<(), ValidateError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let leeway = i64::try_from(self.leeway).unwrap_or(i64::MAX);

        if claims.exp() < now.saturating_sub(leeway) {
            return Err(ValidateError::Rejected(RejectKind::Expired));
        }
        if let Some(iat) = claims.issued_at() {
            if iat > now.saturating_add(leeway) {
                return Err(ValidateError::Rejected(RejectKind::IssuedInFuture));
            }
        }
        if let Some(nbf) = claims.not_before() {
            if nbf > now.saturating_add(leeway) {
                return Err(ValidateError::Rejected(RejectKind::IssuedInFuture));
            }
        }
        if claims.subject().is_empty() {
            return Err(ValidateError::Rejected(RejectKind::InvalidClaims));
        }
        if let Some(jti) = claims.token_id() {
            if jti.is_empty() {
                return Err(ValidateError::Rejected(RejectKind::InvalidId));
            }
        }
        if let Some(expected) = &self.audience {
            let matches = claims
                .audience()
                .iter()
                .any(|aud| expected.iter().any(|e| e == aud));
            if !matches {
                return Err(ValidateError::Rejected(RejectKind::AudienceMismatch));
            }
        }
        if let Some(expected) = &self.issuer {
            if claims.issuer() != Some(expected.as_str()) {
                return Err(ValidateError::Rejected(RejectKind::IssuerMismatch));
            }
        }

        Ok(())
    }

    /// Tries each trusted key in order, applying the short-circuit table
    /// to every failure.
    fn verify_signature(
        &self,
        token: &str,
        keys: &TrustKeySet,
    ) -> Result<AuthenticationToken, ValidateError> {
        let mut last = RejectKind::SignatureMismatch;

        for key in keys.iter() {
            match jsonwebtoken::decode::<AuthenticationToken>(
                token,
                key.decoding_key(),
                &self.validation,
            ) {
                Ok(data) => return Ok(data.claims),
                Err(e) => {
                    let kind = classify(&e);
                    match kind.disposition() {
                        Disposition::Abort => return Err(ValidateError::Rejected(kind)),
                        Disposition::TryNextKey => last = kind,
                    }
                }
            }
        }

        Err(ValidateError::Rejected(last))
    }
}
