//! In-process DHT overlay.
//!
//! Every [`MemoryPeer`] created from the same [`MemoryOverlay`] sees the
//! same key space, so two peers with different key pairs behave like two
//! nodes of one network.

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::peer::{
    DhtPeer, GetRequest, PeerKeyPair, PutRequest, PutStatus, RemoveRequest, RemoveStatus,
    RequestSignature, TransportError,
};
use crate::hash::Number160;

/// `(location, domain, content)`
type ValueKey = (Number160, Number160, Number160);

/// `(location, domain)`
type DomainKey = (Number160, Number160);

#[derive(Debug, Default)]
struct OverlayState {
    values: RwLock<HashMap<ValueKey, Vec<u8>>>,
    owners: RwLock<HashMap<DomainKey, VerifyingKey>>,
    pending_failures: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

/// Shared key space for in-process peers. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryOverlay {
    state: Arc<OverlayState>,
}

impl MemoryOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A peer handle onto this overlay.
    pub fn peer(&self, id: impl Into<String>, key_pair: Option<PeerKeyPair>) -> MemoryPeer {
        MemoryPeer {
            id: id.into(),
            key_pair,
            overlay: self.clone(),
        }
    }

    /// Make the next `count` operations from any peer fail in transport.
    pub fn fail_next(&self, count: usize) {
        self.state.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.state.latency.lock() = latency;
    }

    /// Number of stored values across all domains.
    pub fn len(&self) -> usize {
        self.state.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_failure(&self) -> bool {
        self.state
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn simulate_network(&self, peer_id: &str) -> Result<(), TransportError> {
        let latency = *self.state.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.take_failure() {
            return Err(TransportError::Unreachable(peer_id.to_string()));
        }
        Ok(())
    }

    fn get(&self, request: &GetRequest) -> Option<Vec<u8>> {
        let key = (
            request.location,
            request.domain.unwrap_or(Number160::ZERO),
            request.content,
        );
        self.state.values.read().get(&key).cloned()
    }

    /// Verified owner of a protected request, `None` for unprotected ones.
    fn verified_owner(
        domain: Option<Number160>,
        signature: Option<&RequestSignature>,
        message: impl FnOnce() -> Vec<u8>,
    ) -> Result<Option<VerifyingKey>, TransportError> {
        if domain.is_none() {
            return Ok(None);
        }
        let signature = signature.ok_or(TransportError::Unsigned)?;
        signature.verify(&message())?;
        Ok(Some(signature.public_key))
    }

    fn put(&self, request: &PutRequest) -> Result<PutStatus, TransportError> {
        let owner = Self::verified_owner(request.domain, request.signature.as_ref(), || {
            request.signable()
        })?;
        let domain = request.domain.unwrap_or(Number160::ZERO);
        if let Some(owner) = owner {
            let mut owners = self.state.owners.write();
            let claimed = owners.entry((request.location, domain)).or_insert(owner);
            if *claimed != owner {
                return Ok(PutStatus::Rejected);
            }
        }

        self.state
            .values
            .write()
            .insert((request.location, domain, request.content), request.data.clone());
        Ok(PutStatus::Ok)
    }

    fn remove(&self, request: &RemoveRequest) -> Result<RemoveStatus, TransportError> {
        let owner = Self::verified_owner(request.domain, request.signature.as_ref(), || {
            request.signable()
        })?;
        let domain = request.domain.unwrap_or(Number160::ZERO);
        if let Some(owner) = owner {
            let owners = self.state.owners.read();
            if let Some(claimed) = owners.get(&(request.location, domain)) {
                if *claimed != owner {
                    return Ok(RemoveStatus::Rejected);
                }
            }
        }

        let removed = self
            .state
            .values
            .write()
            .remove(&(request.location, domain, request.content));
        Ok(match removed {
            Some(_) => RemoveStatus::Ok,
            None => RemoveStatus::NotFound,
        })
    }
}

/// A peer on a [`MemoryOverlay`].
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    id: String,
    key_pair: Option<PeerKeyPair>,
    overlay: MemoryOverlay,
}

impl MemoryPeer {
    pub fn overlay(&self) -> &MemoryOverlay {
        &self.overlay
    }

    fn key_pair_for_signing(&self) -> Result<&PeerKeyPair, TransportError> {
        self.key_pair.as_ref().ok_or(TransportError::Unsigned)
    }
}

#[async_trait]
impl DhtPeer for MemoryPeer {
    fn peer_id(&self) -> String {
        self.id.clone()
    }

    fn key_pair(&self) -> Option<&PeerKeyPair> {
        self.key_pair.as_ref()
    }

    async fn get(&self, request: &GetRequest) -> Result<Option<Vec<u8>>, TransportError> {
        self.overlay.simulate_network(&self.id).await?;
        Ok(self.overlay.get(request))
    }

    /// Signs protected requests that arrive unsigned; already signed
    /// requests are relayed as they are.
    async fn put(&self, request: &PutRequest) -> Result<PutStatus, TransportError> {
        self.overlay.simulate_network(&self.id).await?;
        let signed;
        let request = if request.domain.is_some() && request.signature.is_none() {
            signed = request.clone().signed_by(self.key_pair_for_signing()?)?;
            &signed
        } else {
            request
        };
        let status = self.overlay.put(request)?;
        debug!(peer = %self.id, location = %request.location, ?status, "overlay put");
        Ok(status)
    }

    async fn remove(&self, request: &RemoveRequest) -> Result<RemoveStatus, TransportError> {
        self.overlay.simulate_network(&self.id).await?;
        let signed;
        let request = if request.domain.is_some() && request.signature.is_none() {
            signed = request.clone().signed_by(self.key_pair_for_signing()?)?;
            &signed
        } else {
            request
        };
        let status = self.overlay.remove(request)?;
        debug!(peer = %self.id, location = %request.location, ?status, "overlay remove");
        Ok(status)
    }
}
