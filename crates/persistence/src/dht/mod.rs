//! DHT-backed storage.
//!
//! The adapter speaks to the network only through [`DhtPeer`], an async
//! get/put/remove surface keyed by 160-bit hashes. Peer discovery, routing
//! and transport live behind that trait. [`MemoryOverlay`] implements it
//! in-process, including domain ownership, for tests and single-node use.
//!
//! # Domain protection
//!
//! A protected [`DhtKey`](crate::DhtKey) carries a domain string. Its hash
//! becomes the domain under which the value is stored, and the first writer
//! claims the domain for its public key. Protected puts and removes carry
//! an ed25519 signature that the receiving node verifies before it checks
//! ownership. Other peers can still read the value by supplying the domain,
//! but their puts are rejected and their removes are ignored.

mod adapter;
mod memory;
mod peer;

pub use adapter::DhtStorageAdapter;
pub use memory::{MemoryOverlay, MemoryPeer};
pub use peer::{
    DhtPeer, GetRequest, PeerKeyPair, PutRequest, PutStatus, RemoveRequest, RemoveStatus,
    RequestSignature, TransportError,
};
