//! Module defining constants used within the edge-context library.

/// Default secrets-store path under which the gateway publishes the
/// versioned public-key bundle used to verify identity tokens.
pub const DEFAULT_KEY_SECRET_PATH: &str = "secret/authentication/public-key";
