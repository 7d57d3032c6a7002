//! The network surface consumed by the DHT adapter.

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use crate::hash::Number160;
use crate::path::DhtKey;

/// A network operation that completed in a failed state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(String),

    #[error("no peer acknowledged the request")]
    NoAcknowledgement,

    #[error("protected request requires a signing key")]
    Unsigned,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("rejected by the domain owner")]
    Rejected,
}

/// Outcome of a put that reached the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    Ok,
    /// The domain is owned by another key.
    Rejected,
}

/// Outcome of a remove that reached the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveStatus {
    Ok,
    NotFound,
    /// The domain is owned by another key; nothing was removed.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub location: Number160,
    pub content: Number160,
    /// Domain filter; `None` reads the unprotected value.
    pub domain: Option<Number160>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub location: Number160,
    pub content: Number160,
    /// Domain to protect the value under.
    pub domain: Option<Number160>,
    pub data: Vec<u8>,
    /// Owner signature; required on protected requests.
    pub signature: Option<RequestSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveRequest {
    pub location: Number160,
    pub content: Number160,
    pub domain: Option<Number160>,
    pub signature: Option<RequestSignature>,
}

/// A claimed owner key and its signature over a request's signable bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSignature {
    pub public_key: VerifyingKey,
    pub signature: Signature,
}

impl RequestSignature {
    fn create(key_pair: &PeerKeyPair, message: &[u8]) -> Result<Self, TransportError> {
        let signature = key_pair.sign(message).ok_or(TransportError::Unsigned)?;
        Ok(Self {
            public_key: *key_pair.public_key(),
            signature,
        })
    }

    /// Check the signature against the claimed key.
    pub fn verify(&self, message: &[u8]) -> Result<(), TransportError> {
        self.public_key
            .verify(message, &self.signature)
            .map_err(|_| TransportError::InvalidSignature)
    }
}

impl GetRequest {
    pub fn for_key(key: &DhtKey) -> Self {
        Self {
            location: key.location_key(),
            content: key.content_key(),
            domain: key.domain_key(),
        }
    }
}

impl PutRequest {
    pub fn for_key(key: &DhtKey, data: Vec<u8>) -> Self {
        Self {
            location: key.location_key(),
            content: key.content_key(),
            domain: key.domain_key(),
            data,
            signature: None,
        }
    }

    /// Attach the owner signature of `key_pair`.
    pub fn signed_by(mut self, key_pair: &PeerKeyPair) -> Result<Self, TransportError> {
        self.signature = Some(RequestSignature::create(key_pair, &self.signable())?);
        Ok(self)
    }

    /// Bytes covered by the owner's signature.
    pub fn signable(&self) -> Vec<u8> {
        let mut message = signable_key(self.location, self.domain, self.content);
        message.extend_from_slice(&self.data);
        message
    }
}

impl RemoveRequest {
    pub fn for_key(key: &DhtKey) -> Self {
        Self {
            location: key.location_key(),
            content: key.content_key(),
            domain: key.domain_key(),
            signature: None,
        }
    }

    pub fn signed_by(mut self, key_pair: &PeerKeyPair) -> Result<Self, TransportError> {
        self.signature = Some(RequestSignature::create(key_pair, &self.signable())?);
        Ok(self)
    }

    pub fn signable(&self) -> Vec<u8> {
        signable_key(self.location, self.domain, self.content)
    }
}

fn signable_key(location: Number160, domain: Option<Number160>, content: Number160) -> Vec<u8> {
    let domain = domain.unwrap_or(Number160::ZERO);
    let mut message = Vec::with_capacity(3 * crate::hash::KEY_LEN);
    message.extend_from_slice(location.as_bytes());
    message.extend_from_slice(domain.as_bytes());
    message.extend_from_slice(content.as_bytes());
    message
}

/// An ed25519 identity used to claim and write protected domains.
///
/// A pair without its signing half is *incomplete*: it identifies the peer
/// but cannot write protected values.
#[derive(Clone)]
pub struct PeerKeyPair {
    public: VerifyingKey,
    signing: Option<SigningKey>,
}

impl PeerKeyPair {
    /// Fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    pub fn from_signing_key(signing: SigningKey) -> Self {
        Self {
            public: signing.verifying_key(),
            signing: Some(signing),
        }
    }

    pub fn public_only(public: VerifyingKey) -> Self {
        Self {
            public,
            signing: None,
        }
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.public
    }

    pub fn is_complete(&self) -> bool {
        self.signing.is_some()
    }

    /// Sign `message`; `None` when the signing key is missing.
    pub fn sign(&self, message: &[u8]) -> Option<Signature> {
        self.signing.as_ref().map(|key| key.sign(message))
    }
}

impl fmt::Debug for PeerKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// A handle onto the DHT.
///
/// Requests with a domain are protected: unsigned puts and removes are
/// signed with the peer's key pair, and receiving nodes verify the
/// signature before applying them under the domain owner's rules.
#[async_trait]
pub trait DhtPeer: Send + Sync {
    fn peer_id(&self) -> String;

    fn key_pair(&self) -> Option<&PeerKeyPair>;

    async fn get(&self, request: &GetRequest) -> Result<Option<Vec<u8>>, TransportError>;

    async fn put(&self, request: &PutRequest) -> Result<PutStatus, TransportError>;

    async fn remove(&self, request: &RemoveRequest) -> Result<RemoveStatus, TransportError>;
}
