//! Identity token types.
//!
//! An identity token is a standard three-part signed-claims token
//! (`header.claims.signature`) minted by the upstream gateway. This module
//! owns the claims type and the **structural** (signature-free) decode;
//! signature verification against the trust key set lives in
//! [`crate::validate`].

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

/// Signature algorithms a service can accept for identity tokens.
///
/// Only asymmetric families are representable: trust keys are public keys
/// distributed through the secrets store, so HMAC has no place in this
/// trust model.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JwtAlg {
    /// RSASSA-PKCS1-v1_5 using SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    RS512,
    /// ECDSA using P-256 and SHA-256
    ES256,
    /// ECDSA using P-384 and SHA-384
    ES384,
    /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256
    PS256,
    /// RSASSA-PSS using SHA-384 and MGF1 with SHA-384
    PS384,
    /// RSASSA-PSS using SHA-512 and MGF1 with SHA-512
    PS512,
}

impl JwtAlg {
    pub(crate) fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "RS256" => Self::RS256,
            "RS384" => Self::RS384,
            "RS512" => Self::RS512,
            "ES256" => Self::ES256,
            "ES384" => Self::ES384,
            "PS256" => Self::PS256,
            "PS384" => Self::PS384,
            "PS512" => Self::PS512,
            _ => return None,
        })
    }

    /// Returns the standard name of the algorithm (the `alg` header value).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
        }
    }

    /// Whether this algorithm verifies with RSA key material.
    pub(crate) const fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::RS256 | Self::RS384 | Self::RS512 | Self::PS256 | Self::PS384 | Self::PS512
        )
    }

    pub(crate) const fn to_jsonwebtoken(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::RS256 => jsonwebtoken::Algorithm::RS256,
            Self::RS384 => jsonwebtoken::Algorithm::RS384,
            Self::RS512 => jsonwebtoken::Algorithm::RS512,
            Self::ES256 => jsonwebtoken::Algorithm::ES256,
            Self::ES384 => jsonwebtoken::Algorithm::ES384,
            Self::PS256 => jsonwebtoken::Algorithm::PS256,
            Self::PS384 => jsonwebtoken::Algorithm::PS384,
            Self::PS512 => jsonwebtoken::Algorithm::PS512,
        }
    }
}

impl Default for JwtAlg {
    /// RS256, the algorithm the gateway signs with.
    fn default() -> Self {
        Self::RS256
    }
}

impl fmt::Display for JwtAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can arise decoding the structure of an identity token,
/// before any signature verification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// Token does not have 3 dot-separated parts.
    #[error("malformed token: expected 3 dot-separated parts")]
    InvalidFormat,

    /// Invalid base64url encoding in the token header or claims.
    #[error("malformed token: invalid base64url encoding")]
    InvalidBase64,

    /// Invalid JSON in the token header or claims.
    #[error("malformed token: invalid json")]
    InvalidJson(#[source] serde_json::Error),

    /// The header `typ` contains a value other than 'JWT' or 'JOSE'.
    #[error("token header 'typ' should be 'JWT' or 'JOSE'")]
    InvalidTyp,

    /// The algorithm in the `alg` header is not supported by this crate.
    #[error("algorithm in 'alg' header is not supported")]
    UnsupportedAlgorithm,

    /// The `exp` claim is not a representable timestamp.
    #[error("invalid token expiration ('exp') claim")]
    InvalidExpiration,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
struct Header {
    #[serde(default)]
    typ: Option<String>,
    alg: String,
}

/// Decoded claims of an identity token.
///
/// Produced only by successful validation (or by the explicitly untrusted
/// [`AuthenticationToken::parse_insecure`]); immutable and owned by the
/// caller once returned. Service-defined identity fields beyond the
/// standard claims are carried opaquely and can be re-serialized into
/// request-scoped state unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationToken {
    sub: String,
    exp: i64,
    #[serde(
        default,
        deserialize_with = "string_or_seq_string",
        skip_serializing_if = "Vec::is_empty"
    )]
    aud: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jti: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl AuthenticationToken {
    /// Returns the subject identity (the `sub` claim).
    pub fn subject(&self) -> &str {
        &self.sub
    }

    /// Returns the audience (the `aud` claim); empty if the token carries
    /// none.
    pub fn audience(&self) -> &[String] {
        &self.aud
    }

    /// Returns the expiration timestamp (the `exp` claim), seconds since
    /// the Unix epoch.
    pub const fn exp(&self) -> i64 {
        self.exp
    }

    /// Returns the expiration as an [`OffsetDateTime`], if representable.
    pub fn expiry(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.exp).ok()
    }

    /// Returns the issuer (the `iss` claim), if present.
    pub fn issuer(&self) -> Option<&str> {
        self.iss.as_deref()
    }

    /// Returns the issued-at timestamp (the `iat` claim), if present.
    pub const fn issued_at(&self) -> Option<i64> {
        self.iat
    }

    /// Returns the not-before timestamp (the `nbf` claim), if present.
    pub const fn not_before(&self) -> Option<i64> {
        self.nbf
    }

    /// Returns the token ID (the `jti` claim), if present.
    pub fn token_id(&self) -> Option<&str> {
        self.jti.as_deref()
    }

    /// Returns a service-defined claim by name, if the token carries it.
    ///
    /// These claims are not interpreted by this crate; they are whatever
    /// identity fields the gateway attached beyond the standard set.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// Returns all service-defined claims.
    pub const fn claims(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Decodes a token **without verifying its signature**.
    ///
    /// Only token structure and required claims are checked. The returned
    /// claims must not be trusted for authentication; use
    /// [`TokenValidator::validate`](crate::TokenValidator::validate) for
    /// that. This is intended for diagnostics and for middleware that
    /// needs to inspect a token it has already validated elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] if:
    /// - the token is not a 3-part `header.claims.signature` string,
    /// - header/claims are not valid base64url or JSON,
    /// - the `sub` or `exp` claim is missing, or `exp` is out of range,
    /// - the `alg` header is not supported,
    /// - the optional `typ` header is present but not `JWT` or `JOSE`.
    pub fn parse_insecure(token: &str) -> Result<Self, TokenError> {
        parse_unverified(token)
    }
}

impl FromStr for AuthenticationToken {
    type Err = TokenError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::parse_insecure(token)
    }
}

/// Structurally decodes a token without verifying its signature.
///
/// Checks shape, encodings, the `typ` header, that the declared algorithm
/// is one this crate can verify, and that required claims are present and
/// representable.
pub(crate) fn parse_unverified(token: &str) -> Result<AuthenticationToken, TokenError> {
    // Split token parts.
    let mut it = token.split('.');
    let header_b64 = it.next().ok_or(TokenError::InvalidFormat)?;
    let claims_b64 = it.next().ok_or(TokenError::InvalidFormat)?;
    let _sig_b64 = it.next().ok_or(TokenError::InvalidFormat)?;
    if it.next().is_some() {
        return Err(TokenError::InvalidFormat);
    }

    let header_json = decode_b64url_to_vec(header_b64)?;
    let claims_json = decode_b64url_to_vec(claims_b64)?;

    let header: Header = serde_json::from_slice(&header_json).map_err(TokenError::InvalidJson)?;
    let claims: AuthenticationToken =
        serde_json::from_slice(&claims_json).map_err(TokenError::InvalidJson)?;

    // Validate typ if present.
    if let Some(t) = header.typ.as_deref() {
        match t {
            "JWT" | "JOSE" => {}
            _ => return Err(TokenError::InvalidTyp),
        }
    }

    if JwtAlg::parse(header.alg.as_str()).is_none() {
        return Err(TokenError::UnsupportedAlgorithm);
    }

    // exp must be a representable timestamp.
    let _ = OffsetDateTime::from_unix_timestamp(claims.exp)
        .map_err(|time::error::ComponentRange { .. }| TokenError::InvalidExpiration)?;

    Ok(claims)
}

/// Maximum number of audience values allowed in a token `aud` claim.
///
/// Caps allocation when deserializing adversarial tokens with oversized
/// audience arrays. A gateway-issued token has 1-3 audience values.
const MAX_AUDIENCE_COUNT: usize = 32;

// Deserialize the 'aud' claim being either a string or a sequence of
// strings. Enforces MAX_AUDIENCE_COUNT during deserialization.
fn string_or_seq_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec(PhantomData<Vec<String>>);

    impl<'de> de::Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("string or sequence of strings")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![v.to_owned()])
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
        where
            S: de::SeqAccess<'de>,
        {
            let mut result = Vec::new();
            while let Some(elem) = seq.next_element::<String>()? {
                if result.len() >= MAX_AUDIENCE_COUNT {
                    return Err(de::Error::custom(format!(
                        "token `aud` claim has too many entries (max {MAX_AUDIENCE_COUNT})"
                    )));
                }
                result.push(elem);
            }
            Ok(result)
        }
    }

    deserializer.deserialize_any(StringOrVec(PhantomData))
}

/// Maximum size for a token segment (header or claims) after base64url
/// decoding. 64KB is far more than any gateway-issued token needs.
const MAX_SEGMENT_SIZE: usize = 64 * 1024;

/// Decode base64url (no padding) into bytes, with size limits applied
/// before allocation.
fn decode_b64url_to_vec(input: &str) -> Result<Vec<u8>, TokenError> {
    use base64ct::{Base64UrlUnpadded, Encoding as _};

    // Base64url expands data by ~33%, so the encoded length bounds the
    // decoded size; reject oversized inputs before decoding.
    if input.len() > MAX_SEGMENT_SIZE * 4 / 3 {
        return Err(TokenError::InvalidBase64);
    }

    let mut buf = vec![0u8; input.len()];

    let len = Base64UrlUnpadded::decode(input, &mut buf)
        .map_err(|_| TokenError::InvalidBase64)?
        .len();

    if len > MAX_SEGMENT_SIZE {
        return Err(TokenError::InvalidBase64);
    }

    buf.truncate(len);
    Ok(buf)
}
