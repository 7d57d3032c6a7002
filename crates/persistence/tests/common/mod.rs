//! Shared helpers for persistence integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Once;

use persistconf::DhtConfig;
use persistence::{DhtStorageAdapter, MemoryOverlay, PeerKeyPair};
use tracing_subscriber::EnvFilter;

pub const BOBSLED: &str = "Feel the rythm feel the blues, it's bobsled time!";
pub const BOBSLED_MD5: &str = "061875632d79f95204fa082ac64d4d75";

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// An adapter on a fresh overlay, with its own key pair.
pub fn dht_adapter(config: &DhtConfig) -> (MemoryOverlay, DhtStorageAdapter) {
    init_tracing();
    let overlay = MemoryOverlay::new();
    let adapter = adapter_on(&overlay, "peer-1", config);
    (overlay, adapter)
}

/// Another adapter on an existing overlay, with its own key pair.
pub fn adapter_on(overlay: &MemoryOverlay, id: &str, config: &DhtConfig) -> DhtStorageAdapter {
    let peer = Arc::new(overlay.peer(id, Some(PeerKeyPair::generate())));
    DhtStorageAdapter::new(peer, config).expect("adapter should start")
}
