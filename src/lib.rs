#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Edge request-context authentication for backend services.
//!
//! Services sitting behind an authenticating gateway receive, on every
//! request, a signed identity token minted by that gateway. This crate is
//! the token-validation and key-rotation core of that "edge context":
//! it keeps a hot-swappable set of trusted verification keys fed
//! asynchronously by a secret-rotation system, and validates presented
//! tokens synchronously on the request path, with a multi-key retry
//! protocol that aborts on failures caused by the token itself and keeps
//! trying other keys only on pure signature mismatches.
//!
//! The three pieces the embedding service wires together:
//!
//! - [`TrustKeyStore`] — the shared, atomically swappable key slot,
//!   owned by the composition root.
//! - [`SecretFeedAdapter`] — registered with the secrets-store client;
//!   turns each versioned secret bundle into a [`TrustKeySet`] and
//!   publishes it.
//! - [`TokenValidator`] — called by request middleware; reads the store
//!   and returns decoded [`AuthenticationToken`] claims.
//!
//! ```no_run
//! use std::sync::Arc;
//! use edge_context::{JwtAlg, SecretFeedAdapter, TokenValidator, TrustKeyStore};
//!
//! # fn example(bundle: edge_context::VersionedSecret, token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(TrustKeyStore::new());
//!
//! // Feed side: run whenever the secrets store reports a change.
//! let feed = SecretFeedAdapter::new(Arc::clone(&store), JwtAlg::RS256);
//! feed.on_secret_update(&bundle);
//!
//! // Request side: validate every inbound token.
//! let validator = TokenValidator::builder()
//!     .algorithm(JwtAlg::RS256)
//!     .issuer("gateway")
//!     .build(store);
//!
//! let claims = validator.validate(token)?;
//! println!("authenticated: {}", claims.subject());
//! # Ok(())
//! # }
//! ```
//!
//! The two paths never call each other; they interact only through the
//! store, which readers access lock-free. Rotation therefore never blocks
//! a request handler.
//!
//! ## Features
//!
//! - **`logging`** (default): diagnostics via the `log` crate
//! - **`tracing`**: diagnostics via `tracing` (takes precedence)
//! - **`subscription`** (default): async feed driver
//!   ([`SecretFeedAdapter::run`]) bridging a `tokio` watch channel

pub mod constants;

pub mod feed;

pub mod keyset;

pub mod store;

pub mod token;

pub mod validate;

mod observability;

// -----------------------
// Re-exports
// -----------------------

pub use crate::{
    feed::{SecretFeedAdapter, SecretPayload, SecretSource, VersionedSecret},
    keyset::{KeyParseError, TrustKeySet, VerificationKey},
    store::TrustKeyStore,
    token::{AuthenticationToken, JwtAlg, TokenError},
    validate::{Disposition, RejectKind, TokenValidator, TokenValidatorBuilder, ValidateError},
};
