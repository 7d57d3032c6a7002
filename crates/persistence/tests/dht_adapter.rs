mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use common::{adapter_on, dht_adapter, init_tracing, BOBSLED, BOBSLED_MD5};
use persistconf::DhtConfig;
use persistence::{
    DhtKey, DhtPeer, DhtStorageAdapter, GetRequest, MemoryOverlay, MemoryPeer, PathElement,
    PeerKeyPair, PutRequest, PutStatus, RemoveRequest, RemoveStatus, StorageAdapter,
    StorageError, StorageType, TransportError,
};

fn unprotected(content: &str) -> PathElement {
    PathElement::from(DhtKey::unprotected("user-1", content))
}

fn protected(content: &str) -> PathElement {
    PathElement::from(DhtKey::protected("user-1", content, "domain-1"))
}

#[test]
fn test_persist_and_read() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let path = unprotected("file1.txt");

    adapter.persist(StorageType::File, &path, BOBSLED.as_bytes())?;
    assert_eq!(adapter.read(&path)?, BOBSLED.as_bytes());
    Ok(())
}

#[test]
fn test_persist_at_offset_chain() -> Result<()> {
    for ttl in [0, 60_000] {
        let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(ttl));
        let path = unprotected("offsets.txt");

        adapter.persist(StorageType::File, &path, b"Some content")?;
        assert_eq!(adapter.read(&path)?, b"Some content");

        adapter.persist_at(StorageType::File, &path, 5, b"content blub blub")?;
        assert_eq!(adapter.read(&path)?, b"Some content blub blub");

        adapter.persist_at(StorageType::File, &path, 5, b"ab")?;
        assert_eq!(adapter.read(&path)?, b"Some abntent blub blub");

        adapter.persist_at(StorageType::File, &path, 25, b"cd")?;
        assert_eq!(adapter.read(&path)?, b"Some abntent blub blubcd");

        adapter.persist_at(StorageType::File, &path, 0, b"abcde")?;
        assert_eq!(adapter.read(&path)?, b"abcde");
    }
    Ok(())
}

#[test]
fn test_offset_write_skipped_when_existing_value_unreadable() -> Result<()> {
    let (overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let path = unprotected("offsets.txt");
    adapter.persist(StorageType::File, &path, b"Some content blub blub")?;

    // The read of the current value fails; the put must not go out either.
    overlay.fail_next(1);
    adapter.persist_at(StorageType::File, &path, 5, b"ab")?;
    assert_eq!(adapter.read(&path)?, b"Some content blub blub");

    adapter.persist_at(StorageType::File, &path, 5, b"ab")?;
    assert_eq!(adapter.read(&path)?, b"Some abntent blub blub");
    Ok(())
}

#[test]
fn test_read_range_clamps() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let path = unprotected("range.txt");
    let content = BOBSLED.as_bytes();
    adapter.persist(StorageType::File, &path, content)?;

    assert_eq!(adapter.read_range(&path, 0, 49)?, content);
    assert_eq!(adapter.read_range(&path, 10, 39)?, &content[10..49]);
    assert_eq!(adapter.read_range(&path, 10, 50)?, &content[10..]);
    assert!(adapter.read_range(&path, 100, 5)?.is_empty());
    Ok(())
}

#[test]
fn test_missing_value_reads_empty() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let path = unprotected("missing.txt");

    assert!(adapter.read(&path)?.is_empty());
    assert!(adapter.read_range(&path, 0, 10)?.is_empty());
    assert!(!adapter.exists(StorageType::File, &path)?);
    Ok(())
}

#[test]
fn test_delete_is_a_noop_when_absent() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(60_000));
    let path = unprotected("delete.txt");

    adapter.delete(&path)?;

    adapter.persist(StorageType::File, &path, b"value")?;
    assert!(adapter.exists(StorageType::File, &path)?);
    adapter.delete(&path)?;
    assert!(!adapter.exists(StorageType::File, &path)?);
    assert!(adapter.read(&path)?.is_empty());
    Ok(())
}

#[test]
fn test_move() -> Result<()> {
    let (overlay, adapter) = dht_adapter(&DhtConfig::unprotected(60_000));
    let old = unprotected("old.txt");
    let new = unprotected("new.txt");

    adapter.persist(StorageType::File, &old, BOBSLED.as_bytes())?;
    adapter.move_path(StorageType::File, &old, &new)?;

    assert!(!adapter.exists(StorageType::File, &old)?);
    assert_eq!(adapter.read(&new)?, BOBSLED.as_bytes());

    // The network agrees with the cache
    adapter.cache().clear_all();
    assert!(adapter.read(&old)?.is_empty());
    assert_eq!(adapter.read(&new)?, BOBSLED.as_bytes());
    assert_eq!(overlay.len(), 1);
    Ok(())
}

#[test]
fn test_move_onto_existing_target_fails() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let old = unprotected("old.txt");
    let new = unprotected("new.txt");
    adapter.persist(StorageType::File, &old, b"source")?;
    adapter.persist(StorageType::File, &new, b"target")?;

    let err = adapter.move_path(StorageType::File, &old, &new).unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { .. }));

    assert_eq!(adapter.read(&old)?, b"source");
    assert_eq!(adapter.read(&new)?, b"target");
    Ok(())
}

#[test]
fn test_move_keeps_source_when_put_is_rejected() -> Result<()> {
    init_tracing();
    let overlay = MemoryOverlay::new();
    let owner = adapter_on(&overlay, "owner", &DhtConfig::protected(0));
    let mover = adapter_on(&overlay, "mover", &DhtConfig::protected(0));

    // The owner claims the target domain
    owner.persist(StorageType::File, &protected("claimed.txt"), b"owned")?;

    let old = unprotected("old.txt");
    let new = protected("new.txt");
    mover.persist(StorageType::File, &old, b"source")?;

    let err = mover.move_path(StorageType::File, &old, &new).unwrap_err();
    assert!(matches!(err, StorageError::Transport { op: "move", .. }));

    assert_eq!(mover.read(&old)?, b"source");
    assert!(!mover.exists(StorageType::File, &new)?);
    Ok(())
}

#[test]
fn test_move_of_missing_source_fails() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let err = adapter
        .move_path(StorageType::File, &unprotected("nothing"), &unprotected("target"))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!adapter.exists(StorageType::File, &unprotected("target"))?);
    Ok(())
}

#[test]
fn test_meta_information() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let path = unprotected("meta.txt");

    let err = adapter.meta_information(&path).unwrap_err();
    assert!(err.is_not_found());

    adapter.persist(StorageType::File, &path, BOBSLED.as_bytes())?;
    let meta = adapter.meta_information(&path)?;
    assert_eq!(meta.total_size, BOBSLED.len() as u64);
    assert!(meta.is_file);
    assert!(!meta.is_directory());
    assert_eq!(meta.extension, "");
    Ok(())
}

#[test]
fn test_is_file_and_is_dir() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let path = unprotected("kind.txt");

    assert!(adapter.is_file(&path).unwrap_err().is_not_found());
    assert!(adapter.is_dir(&path).unwrap_err().is_not_found());

    adapter.persist(StorageType::File, &path, b"x")?;
    assert!(adapter.is_file(&path)?);
    assert!(!adapter.is_dir(&path)?);
    Ok(())
}

#[test]
fn test_directories_are_unsupported() -> Result<()> {
    let (overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let path = unprotected("dir");

    let persist = adapter.persist(StorageType::Directory, &path, b"");
    assert!(matches!(persist, Err(StorageError::UnsupportedOperation(_))));

    let exists = adapter.exists(StorageType::Directory, &path);
    assert!(matches!(exists, Err(StorageError::UnsupportedOperation(_))));

    let moved = adapter.move_path(StorageType::Directory, &path, &unprotected("dir2"));
    assert!(matches!(moved, Err(StorageError::UnsupportedOperation(_))));

    let listing = adapter.directory_contents(&path);
    assert!(matches!(listing, Err(StorageError::UnsupportedOperation(_))));

    assert!(overlay.is_empty());
    Ok(())
}

#[test]
fn test_checksum() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let path = unprotected("checksum.txt");

    assert!(adapter.checksum(&path).unwrap_err().is_not_found());

    adapter.persist(StorageType::File, &path, BOBSLED.as_bytes())?;
    assert_eq!(adapter.checksum(&path)?, BOBSLED_MD5);
    Ok(())
}

#[test]
fn test_type_mismatch() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let plain = PathElement::plain("notes/file.txt");

    assert!(matches!(
        adapter.read(&plain),
        Err(StorageError::TypeMismatch { .. })
    ));
    assert!(matches!(
        adapter.delete(&plain),
        Err(StorageError::TypeMismatch { .. })
    ));
    assert!(matches!(
        adapter.move_path(StorageType::File, &unprotected("a"), &plain),
        Err(StorageError::TypeMismatch { .. })
    ));
    assert!(matches!(
        adapter.read(&protected("file.txt")),
        Err(StorageError::TypeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_cache_serves_until_ttl_expires() -> Result<()> {
    let (overlay, adapter) = dht_adapter(&DhtConfig::unprotected(200));
    let path = unprotected("cached.txt");
    adapter.persist(StorageType::File, &path, b"cached")?;

    // Network failures are invisible while the entry is fresh
    overlay.fail_next(usize::MAX);
    assert_eq!(adapter.read(&path)?, b"cached");

    thread::sleep(Duration::from_millis(300));
    assert!(adapter.read(&path)?.is_empty());

    overlay.fail_next(0);
    assert_eq!(adapter.read(&path)?, b"cached");
    Ok(())
}

#[test]
fn test_transport_failures_fall_back() -> Result<()> {
    let (overlay, adapter) = dht_adapter(&DhtConfig::unprotected(0));
    let path = unprotected("flaky.txt");

    overlay.fail_next(1);
    adapter.persist(StorageType::File, &path, b"lost")?;
    assert!(!adapter.exists(StorageType::File, &path)?);

    adapter.persist(StorageType::File, &path, b"kept")?;
    overlay.fail_next(2);
    assert!(adapter.read(&path)?.is_empty());
    adapter.delete(&path)?;
    assert_eq!(adapter.read(&path)?, b"kept");
    Ok(())
}

#[test]
fn test_operation_timeout() -> Result<()> {
    let config = DhtConfig::unprotected(0).with_timeout_ms(50);
    let (overlay, adapter) = dht_adapter(&config);
    let path = unprotected("slow.txt");

    overlay.set_latency(Some(Duration::from_millis(500)));
    let err = adapter.read(&path).unwrap_err();
    assert!(matches!(err, StorageError::Timeout { op: "get", .. }));

    overlay.set_latency(None);
    adapter.persist(StorageType::File, &path, b"fast")?;
    assert_eq!(adapter.read(&path)?, b"fast");
    Ok(())
}

#[test]
fn test_protection_requires_complete_key_pair() {
    init_tracing();
    let overlay = MemoryOverlay::new();

    let no_pair = Arc::new(overlay.peer("no-pair", None));
    let err = DhtStorageAdapter::new(no_pair, &DhtConfig::protected(0)).unwrap_err();
    assert!(matches!(err, StorageError::InvalidConfig(_)));

    let public = *PeerKeyPair::generate().public_key();
    let incomplete = Arc::new(overlay.peer("incomplete", Some(PeerKeyPair::public_only(public))));
    let err = DhtStorageAdapter::new(incomplete.clone(), &DhtConfig::protected(0)).unwrap_err();
    assert!(matches!(err, StorageError::InvalidConfig(_)));

    // Without protection the same peer is fine
    assert!(DhtStorageAdapter::new(incomplete, &DhtConfig::unprotected(0)).is_ok());
}

#[test]
fn test_domain_protection_between_peers() -> Result<()> {
    init_tracing();
    let overlay = MemoryOverlay::new();
    let config = DhtConfig::protected(0);
    let owner = adapter_on(&overlay, "peer-1", &config);
    let other = adapter_on(&overlay, "peer-2", &config);
    let path = protected("protected.txt");

    owner.persist(StorageType::File, &path, BOBSLED.as_bytes())?;

    // Readable by anyone who knows the domain
    assert_eq!(other.read(&path)?, BOBSLED.as_bytes());

    // Delete by a non-owner succeeds locally but has no effect
    other.delete(&path)?;
    assert_eq!(owner.read(&path)?, BOBSLED.as_bytes());
    assert_eq!(other.read(&path)?, BOBSLED.as_bytes());

    // Overwrites by a non-owner are rejected by the network
    other.persist(StorageType::File, &path, b"hijacked")?;
    assert_eq!(owner.read(&path)?, BOBSLED.as_bytes());

    // The unprotected key with the same location and content is a different value
    let key = DhtKey::protected("user-1", "protected.txt", "domain-1");
    let bare = PathElement::from(key.without_domain());
    assert!(!other.exists(StorageType::File, &bare)?);

    owner.delete(&path)?;
    assert!(!other.exists(StorageType::File, &path)?);
    Ok(())
}

#[test]
fn test_unprotected_values_can_be_deleted_by_anyone() -> Result<()> {
    init_tracing();
    let overlay = MemoryOverlay::new();
    let config = DhtConfig::unprotected(0);
    let first = adapter_on(&overlay, "peer-1", &config);
    let second = adapter_on(&overlay, "peer-2", &config);
    let path = unprotected("shared.txt");

    first.persist(StorageType::File, &path, BOBSLED.as_bytes())?;
    assert_eq!(second.read(&path)?, BOBSLED.as_bytes());

    second.delete(&path)?;
    assert!(first.read(&path)?.is_empty());
    Ok(())
}

#[test]
fn test_adapter_is_shareable_across_threads() -> Result<()> {
    let (_overlay, adapter) = dht_adapter(&DhtConfig::unprotected(60_000));
    let adapter = Arc::new(adapter);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let adapter = Arc::clone(&adapter);
            thread::spawn(move || -> Result<()> {
                let path = unprotected(&format!("thread-{}.txt", i));
                for j in 0..10u8 {
                    adapter.persist_at(StorageType::File, &path, u64::from(j), &[b'a' + j])?;
                }
                assert_eq!(adapter.read(&path)?, b"abcdefghij");
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked")?;
    }
    Ok(())
}

/// Overlay peer whose next get panics inside the network task.
struct PanicOnGet {
    inner: MemoryPeer,
    armed: AtomicBool,
}

#[async_trait]
impl DhtPeer for PanicOnGet {
    fn peer_id(&self) -> String {
        self.inner.peer_id()
    }

    fn key_pair(&self) -> Option<&PeerKeyPair> {
        self.inner.key_pair()
    }

    async fn get(&self, request: &GetRequest) -> Result<Option<Vec<u8>>, TransportError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            panic!("peer crashed during get");
        }
        self.inner.get(request).await
    }

    async fn put(&self, request: &PutRequest) -> Result<PutStatus, TransportError> {
        self.inner.put(request).await
    }

    async fn remove(&self, request: &RemoveRequest) -> Result<RemoveStatus, TransportError> {
        self.inner.remove(request).await
    }
}

#[test]
fn test_panicking_network_task_is_interrupted() -> Result<()> {
    init_tracing();
    let overlay = MemoryOverlay::new();
    let peer = Arc::new(PanicOnGet {
        inner: overlay.peer("crashy", None),
        armed: AtomicBool::new(true),
    });
    let adapter = DhtStorageAdapter::new(peer, &DhtConfig::unprotected(0))?;
    let path = unprotected("crash.txt");

    let err = adapter.read(&path).unwrap_err();
    assert!(matches!(err, StorageError::Interrupted { op: "get", .. }));

    // The runtime and the lock survive the failed task
    adapter.persist(StorageType::File, &path, b"after")?;
    assert_eq!(adapter.read(&path)?, b"after");
    Ok(())
}
