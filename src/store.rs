//! The trust key store: the single synchronization point between the
//! secret-feed path and the request-validation path.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::keyset::TrustKeySet;

/// Holds the currently active [`TrustKeySet`] behind an atomically
/// swappable slot.
///
/// Reads are lock-free and constant-time; arbitrarily many request
/// handlers may call [`TrustKeyStore::load`] concurrently with a publish.
/// A reader always observes a complete snapshot, either the full
/// pre-publish or the full post-publish set, never a partial mix.
///
/// Concurrent publishes are last-writer-wins. The upstream update feed is
/// serialized, so true simultaneity does not occur in practice; if a
/// second independent feed is ever introduced, ordering must be
/// revisited.
///
/// The store is owned by the service's composition root and shared by
/// `Arc` into the feed adapter and every validator; it is never a global.
pub struct TrustKeyStore {
    current: ArcSwapOption<TrustKeySet>,
}

impl TrustKeyStore {
    /// Creates a store with nothing published yet.
    ///
    /// Until the first [`TrustKeyStore::publish`], [`TrustKeyStore::load`]
    /// returns `None` and validation fails with
    /// [`ValidateError::NoKeysAvailable`](crate::ValidateError::NoKeysAvailable).
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::const_empty(),
        }
    }

    /// Returns the current key set snapshot, or `None` if nothing has ever
    /// been published. Non-blocking.
    pub fn load(&self) -> Option<Arc<TrustKeySet>> {
        self.current.load_full()
    }

    /// Installs `set` as the new current snapshot, visible to subsequent
    /// [`TrustKeyStore::load`] calls. Non-blocking; last writer wins.
    pub fn publish(&self, set: Arc<TrustKeySet>) {
        self.current.store(Some(set));
    }
}

impl Default for TrustKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrustKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustKeyStore")
            .field("current", &"<ArcSwapOption<TrustKeySet>>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::keyset::{TrustKeySet, VerificationKey};
    use crate::token::JwtAlg;

    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::pkcs8::{EncodePublicKey as _, LineEnding};
    use p256::elliptic_curve::rand_core::OsRng;

    fn one_key_set() -> Arc<TrustKeySet> {
        let pem = SigningKey::random(&mut OsRng)
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let key = VerificationKey::from_pem(pem.as_bytes(), JwtAlg::ES256).unwrap();
        Arc::new(TrustKeySet::new(vec![key]))
    }

    #[test]
    fn load_before_any_publish_is_none() {
        let store = TrustKeyStore::new();
        assert!(store.load().is_none());
    }

    #[test]
    fn publish_then_load_returns_same_snapshot() {
        let store = TrustKeyStore::new();
        let set = one_key_set();
        store.publish(Arc::clone(&set));

        let loaded = store.load().unwrap();
        assert!(Arc::ptr_eq(&loaded, &set));
    }

    #[test]
    fn publish_replaces_wholesale() {
        let store = TrustKeyStore::new();
        let first = one_key_set();
        let second = one_key_set();

        store.publish(Arc::clone(&first));
        store.publish(Arc::clone(&second));

        let loaded = store.load().unwrap();
        assert!(Arc::ptr_eq(&loaded, &second));
        assert!(!Arc::ptr_eq(&loaded, &first));
    }

    #[test]
    fn readers_see_complete_snapshots_during_publishes() {
        let store = Arc::new(TrustKeyStore::new());
        store.publish(one_key_set());

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    store.publish(one_key_set());
                }
            })
        };

        for _ in 0..1000 {
            let set = store.load().expect("published store never reads unset");
            assert_eq!(set.len(), 1);
        }

        writer.join().unwrap();
    }
}
