//! [`StorageAdapter`] over a [`DhtPeer`].
//!
//! The DHT has no directories and no partial writes. Offset writes read the
//! current value, overlay the new bytes and put the whole blob back. Moves
//! are read-old, put-new, remove-old.
//!
//! Writes go to the [`DhtCache`] before the network put is issued, so the
//! adapter reads its own writes even while a put is in flight. Reads consult
//! the cache first and fall back to the network; a network read never
//! populates the cache.

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error, warn};

use persistconf::DhtConfig;

use super::peer::{
    DhtPeer, GetRequest, PutRequest, PutStatus, RemoveRequest, RemoveStatus, TransportError,
};
use crate::adapter::{clamp_range, overlay_bytes, StorageAdapter, StorageType};
use crate::cache::DhtCache;
use crate::error::{Result, StorageError};
use crate::hash::md5_hex;
use crate::meta::MetaInfo;
use crate::path::{DhtKey, PathElement};

/// Outcome of a network call that ran to completion.
type NetworkResult<T> = std::result::Result<T, TransportError>;

/// Blocking storage adapter over an async DHT peer.
///
/// Every public operation holds the adapter lock for its whole duration,
/// so the adapter behaves as single-threaded from the outside. Network
/// calls run on a private tokio runtime; the calling thread blocks until
/// they finish. Do not call into the adapter from inside another tokio
/// runtime's async context.
pub struct DhtStorageAdapter {
    peer: Arc<dyn DhtPeer>,
    cache: DhtCache,
    domain_protection: bool,
    operation_timeout: Option<Duration>,
    runtime: Runtime,
    lock: Mutex<()>,
}

impl DhtStorageAdapter {
    /// Create an adapter on `peer`.
    ///
    /// With `domain_protection` enabled the peer must hold a complete key
    /// pair; construction fails with `InvalidConfig` otherwise.
    pub fn new(peer: Arc<dyn DhtPeer>, config: &DhtConfig) -> Result<Self> {
        if config.domain_protection {
            match peer.key_pair() {
                Some(pair) if pair.is_complete() => {}
                Some(_) => {
                    return Err(StorageError::InvalidConfig(format!(
                        "domain protection needs a signing key, peer {} only has a public key",
                        peer.peer_id()
                    )))
                }
                None => {
                    return Err(StorageError::InvalidConfig(format!(
                        "domain protection needs a key pair, peer {} has none",
                        peer.peer_id()
                    )))
                }
            }
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("persist-dht")
            .enable_time()
            .build()
            .map_err(|e| StorageError::io("start network runtime for", peer.peer_id(), e))?;

        debug!(
            peer = %peer.peer_id(),
            domain_protection = config.domain_protection,
            cache_ttl_ms = config.cache_ttl_ms,
            "dht adapter ready"
        );

        Ok(Self {
            peer,
            cache: DhtCache::new(config.cache_ttl()),
            domain_protection: config.domain_protection,
            operation_timeout: config.operation_timeout(),
            runtime,
            lock: Mutex::new(()),
        })
    }

    pub fn is_domain_protected(&self) -> bool {
        self.domain_protection
    }

    pub fn cache(&self) -> &DhtCache {
        &self.cache
    }

    pub fn peer_id(&self) -> String {
        self.peer.peer_id()
    }

    /// Accepts unprotected keys always and protected keys only when domain
    /// protection is enabled.
    fn dht_key<'a>(&self, path: &'a PathElement) -> Result<&'a DhtKey> {
        match path {
            PathElement::DhtKey(key) if key.is_protected() && !self.domain_protection => {
                Err(StorageError::TypeMismatch {
                    expected: "unprotected dht key",
                    actual: path.kind(),
                })
            }
            PathElement::DhtKey(key) => Ok(key),
            PathElement::PlainPath { .. } => Err(StorageError::TypeMismatch {
                expected: if self.domain_protection {
                    "dht key"
                } else {
                    "unprotected dht key"
                },
                actual: path.kind(),
            }),
        }
    }

    fn require_file(storage_type: StorageType) -> Result<()> {
        match storage_type {
            StorageType::File => Ok(()),
            StorageType::Directory => Err(StorageError::unsupported(
                "only files are supported by the dht adapter",
            )),
        }
    }

    /// Run `future` on the adapter runtime and block until it finishes.
    fn block_on<T, F>(&self, op: &'static str, key: &DhtKey, future: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut handle = self.runtime.spawn(future);
        let joined = match self.operation_timeout {
            Some(limit) => {
                match self
                    .runtime
                    .block_on(async { tokio::time::timeout(limit, &mut handle).await })
                {
                    Ok(joined) => joined,
                    Err(_) => {
                        handle.abort();
                        warn!(op, path = %key, ?limit, "network operation timed out");
                        return Err(StorageError::Timeout {
                            op,
                            path: key.identity(),
                            limit,
                        });
                    }
                }
            }
            None => self.runtime.block_on(&mut handle),
        };

        joined.map_err(|e| {
            error!(op, path = %key, error = %e, "network task did not complete");
            StorageError::Interrupted {
                op,
                path: key.identity(),
            }
        })
    }

    fn network_get(&self, key: &DhtKey) -> Result<NetworkResult<Option<Vec<u8>>>> {
        let peer = Arc::clone(&self.peer);
        let request = GetRequest::for_key(key);
        self.block_on("get", key, async move { peer.get(&request).await })
    }

    fn network_put(&self, key: &DhtKey, data: Vec<u8>) -> Result<NetworkResult<PutStatus>> {
        let peer = Arc::clone(&self.peer);
        let request = PutRequest::for_key(key, data);
        self.block_on("put", key, async move { peer.put(&request).await })
    }

    fn network_remove(&self, key: &DhtKey) -> Result<NetworkResult<RemoveStatus>> {
        let peer = Arc::clone(&self.peer);
        let request = RemoveRequest::for_key(key);
        self.block_on("remove", key, async move { peer.remove(&request).await })
    }

    /// Cached value, else the network value. A failed get counts as absent.
    fn get_locked(&self, key: &DhtKey) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.cache.get(&key.identity()) {
            debug!(path = %key, "served from cache");
            return Ok(Some(cached));
        }

        match self.network_get(key)? {
            Ok(value) => {
                debug!(path = %key, found = value.is_some(), "get completed");
                Ok(value)
            }
            Err(e) => {
                warn!(path = %key, error = %e, "get failed, treating as absent");
                Ok(None)
            }
        }
    }

    /// Current value for an offset write. An absent value is empty; a failed
    /// read yields `None` so the caller skips the write rather than replace
    /// a remote value it could not see.
    fn existing_for_overlay(&self, key: &DhtKey) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.cache.get(&key.identity()) {
            return Ok(Some(cached));
        }

        match self.network_get(key)? {
            Ok(value) => Ok(Some(value.unwrap_or_default())),
            Err(e) => {
                warn!(path = %key, error = %e, "get before offset write failed, write skipped");
                Ok(None)
            }
        }
    }

    /// Write through the cache, then put. Returns the put outcome for
    /// callers that must not continue on failure.
    fn put_locked(&self, key: &DhtKey, data: &[u8]) -> Result<NetworkResult<()>> {
        let identity = key.identity();
        self.cache.put(&identity, data);

        match self.network_put(key, data.to_vec())? {
            Ok(PutStatus::Ok) => {
                debug!(path = %key, bytes = data.len(), "put completed");
                Ok(Ok(()))
            }
            Ok(PutStatus::Rejected) => {
                // The network kept its value, so the local view must not claim ours.
                self.cache.clear(&identity);
                warn!(path = %key, "put rejected by domain owner");
                Ok(Err(TransportError::Rejected))
            }
            Err(e) => {
                warn!(path = %key, error = %e, "put failed");
                Ok(Err(e))
            }
        }
    }

    fn remove_locked(&self, key: &DhtKey) -> Result<()> {
        self.cache.clear(&key.identity());

        match self.network_remove(key)? {
            Ok(RemoveStatus::Ok) => debug!(path = %key, "remove completed"),
            Ok(RemoveStatus::NotFound) => debug!(path = %key, "remove found nothing"),
            Ok(RemoveStatus::Rejected) => debug!(path = %key, "remove ignored by domain owner"),
            Err(e) => warn!(path = %key, error = %e, "remove failed"),
        }
        Ok(())
    }

    fn exists_locked(&self, key: &DhtKey) -> Result<bool> {
        Ok(self.get_locked(key)?.is_some())
    }

    /// Value of an existing key, `NotFound` otherwise.
    fn existing_locked(&self, key: &DhtKey) -> Result<Vec<u8>> {
        self.get_locked(key)?
            .ok_or_else(|| StorageError::not_found(key))
    }
}

impl StorageAdapter for DhtStorageAdapter {
    fn persist(&self, storage_type: StorageType, path: &PathElement, bytes: &[u8]) -> Result<()> {
        let key = self.dht_key(path)?;
        Self::require_file(storage_type)?;

        let _guard = self.lock.lock();
        // Put failures are logged; the contract reports no error for them.
        let _ = self.put_locked(key, bytes)?;
        Ok(())
    }

    fn persist_at(
        &self,
        storage_type: StorageType,
        path: &PathElement,
        offset: u64,
        bytes: &[u8],
    ) -> Result<()> {
        let key = self.dht_key(path)?;
        Self::require_file(storage_type)?;

        let _guard = self.lock.lock();
        let value = if offset == 0 {
            bytes.to_vec()
        } else {
            match self.existing_for_overlay(key)? {
                Some(existing) => overlay_bytes(&existing, offset, bytes),
                None => return Ok(()),
            }
        };
        let _ = self.put_locked(key, &value)?;
        Ok(())
    }

    fn delete(&self, path: &PathElement) -> Result<()> {
        let key = self.dht_key(path)?;

        let _guard = self.lock.lock();
        self.remove_locked(key)
    }

    fn read(&self, path: &PathElement) -> Result<Vec<u8>> {
        let key = self.dht_key(path)?;

        let _guard = self.lock.lock();
        Ok(self.get_locked(key)?.unwrap_or_default())
    }

    fn read_range(&self, path: &PathElement, offset: u64, length: u64) -> Result<Vec<u8>> {
        let key = self.dht_key(path)?;

        let _guard = self.lock.lock();
        let value = self.get_locked(key)?.unwrap_or_default();
        Ok(clamp_range(&value, offset, length).to_vec())
    }

    fn move_path(
        &self,
        storage_type: StorageType,
        old_path: &PathElement,
        new_path: &PathElement,
    ) -> Result<()> {
        let old_key = self.dht_key(old_path)?;
        let new_key = self.dht_key(new_path)?;
        Self::require_file(storage_type)?;

        let _guard = self.lock.lock();
        if self.exists_locked(new_key)? {
            return Err(StorageError::AlreadyExists {
                path: new_key.identity(),
            });
        }

        let value = self.existing_locked(old_key)?;
        if let Err(source) = self.put_locked(new_key, &value)? {
            // The source stays in place when the copy did not land.
            self.cache.clear(&new_key.identity());
            return Err(StorageError::Transport {
                op: "move",
                path: new_key.identity(),
                source,
            });
        }

        self.remove_locked(old_key)?;
        debug!(from = %old_key, to = %new_key, "move completed");
        Ok(())
    }

    fn meta_information(&self, path: &PathElement) -> Result<MetaInfo> {
        let key = self.dht_key(path)?;

        let _guard = self.lock.lock();
        let value = self.existing_locked(key)?;
        Ok(MetaInfo::file(value.len() as u64, ""))
    }

    fn exists(&self, storage_type: StorageType, path: &PathElement) -> Result<bool> {
        let key = self.dht_key(path)?;
        Self::require_file(storage_type)?;

        let _guard = self.lock.lock();
        self.exists_locked(key)
    }

    fn is_file(&self, path: &PathElement) -> Result<bool> {
        let key = self.dht_key(path)?;

        let _guard = self.lock.lock();
        self.existing_locked(key)?;
        Ok(true)
    }

    fn is_dir(&self, path: &PathElement) -> Result<bool> {
        let key = self.dht_key(path)?;

        let _guard = self.lock.lock();
        self.existing_locked(key)?;
        Ok(false)
    }

    fn directory_contents(&self, directory: &PathElement) -> Result<Vec<PathElement>> {
        self.dht_key(directory)?;
        Err(StorageError::unsupported(
            "directories are not supported by the dht adapter",
        ))
    }

    fn checksum(&self, path: &PathElement) -> Result<String> {
        let key = self.dht_key(path)?;

        let _guard = self.lock.lock();
        let value = self.existing_locked(key)?;
        Ok(md5_hex(&value))
    }

    fn root_dir(&self) -> Option<PathElement> {
        None
    }
}

impl fmt::Debug for DhtStorageAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhtStorageAdapter")
            .field("peer", &self.peer.peer_id())
            .field("domain_protection", &self.domain_protection)
            .field("operation_timeout", &self.operation_timeout)
            .field("cache_ttl", &self.cache.ttl())
            .finish()
    }
}
