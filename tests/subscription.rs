//! Integration tests for the async secret-feed driver.

#![cfg(feature = "subscription")]

use std::sync::Arc;
use std::time::Duration;

use edge_context::{JwtAlg, SecretFeedAdapter, TrustKeyStore, VersionedSecret};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::pkcs8::{EncodePublicKey as _, LineEnding};
use p256::elliptic_curve::rand_core::OsRng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

fn es256_public_pem() -> String {
    SigningKey::random(&mut OsRng)
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("public key PEM")
}

fn bundle(n_keys: usize) -> VersionedSecret {
    (0..n_keys).map(|_| es256_public_pem()).collect()
}

/// Polls the store until `pred` holds or the deadline passes.
async fn wait_for(store: &TrustKeyStore, pred: impl Fn(Option<usize>) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if pred(store.load().map(|set| set.len())) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "store did not reach expected state in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn applies_seeded_snapshot_and_subsequent_changes() {
    let store = Arc::new(TrustKeyStore::new());
    let feed = SecretFeedAdapter::new(Arc::clone(&store), JwtAlg::ES256);

    let (tx, rx) = watch::channel(bundle(1));
    let cancel = CancellationToken::new();

    let driver = {
        let cancel = cancel.clone();
        tokio::spawn(async move { feed.run(rx, cancel).await })
    };

    // The snapshot seeded into the channel is applied first.
    wait_for(&store, |len| len == Some(1)).await;

    // A rotation flows through the channel into the store.
    tx.send(bundle(2)).unwrap();
    wait_for(&store, |len| len == Some(2)).await;

    cancel.cancel();
    driver.await.unwrap();
}

#[tokio::test]
async fn unusable_update_keeps_previous_set_live() {
    let store = Arc::new(TrustKeyStore::new());
    let feed = SecretFeedAdapter::new(Arc::clone(&store), JwtAlg::ES256);

    let (tx, rx) = watch::channel(bundle(2));
    let cancel = CancellationToken::new();

    let driver = {
        let cancel = cancel.clone();
        tokio::spawn(async move { feed.run(rx, cancel).await })
    };

    wait_for(&store, |len| len == Some(2)).await;
    let before = store.load().unwrap();

    // Nothing in this update parses; the published set must survive.
    tx.send(["garbage"].into_iter().collect()).unwrap();
    // Then a good update, proving the driver kept running past the bad one.
    tx.send(bundle(3)).unwrap();
    wait_for(&store, |len| len == Some(3)).await;

    assert_eq!(before.len(), 2);

    cancel.cancel();
    driver.await.unwrap();
}

#[tokio::test]
async fn driver_stops_when_channel_closes() {
    let store = Arc::new(TrustKeyStore::new());
    let feed = SecretFeedAdapter::new(Arc::clone(&store), JwtAlg::ES256);

    let (tx, rx) = watch::channel(bundle(1));
    let driver = tokio::spawn(async move { feed.run(rx, CancellationToken::new()).await });

    wait_for(&store, |len| len == Some(1)).await;
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .expect("driver should stop after the channel closes")
        .unwrap();
}

#[tokio::test]
async fn empty_seed_leaves_store_unset_until_first_real_bundle() {
    let store = Arc::new(TrustKeyStore::new());
    let feed = SecretFeedAdapter::new(Arc::clone(&store), JwtAlg::ES256);

    // Wiring that has no current bundle yet seeds an empty snapshot.
    let (tx, rx) = watch::channel(VersionedSecret::default());
    let cancel = CancellationToken::new();

    let driver = {
        let cancel = cancel.clone();
        tokio::spawn(async move { feed.run(rx, cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.load().is_none());

    tx.send(bundle(1)).unwrap();
    wait_for(&store, |len| len == Some(1)).await;

    cancel.cancel();
    driver.await.unwrap();
}
