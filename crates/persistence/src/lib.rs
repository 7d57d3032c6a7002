//! Uniform storage adapters for synchronised file trees.
//!
//! Every backend implements [`StorageAdapter`], a filesystem-like contract
//! (paths, offsets, moves, checksums) addressed by [`PathElement`]s:
//! - [`LocalTreeStorageAdapter`]: a directory subtree on the local disk
//! - [`DhtStorageAdapter`]: values in a distributed hash table, optionally
//!   guarded by domain protection, fronted by a write-through [`DhtCache`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use persistence::{
//!     DhtKey, DhtStorageAdapter, MemoryOverlay, PathElement, StorageAdapter, StorageType,
//! };
//! use persistconf::DhtConfig;
//!
//! let overlay = MemoryOverlay::new();
//! let peer = Arc::new(overlay.peer("peer-1", None));
//! let adapter = DhtStorageAdapter::new(peer, &DhtConfig::unprotected(2000)).unwrap();
//!
//! let path = PathElement::from(DhtKey::unprotected("user", "notes.txt"));
//! adapter.persist(StorageType::File, &path, b"Some content").unwrap();
//! assert_eq!(adapter.read(&path).unwrap(), b"Some content");
//! ```
//!
//! # Backend asymmetries
//!
//! The contract is shared, the failure modes are not:
//! - deleting an absent path fails on the tree, is a no-op on the DHT
//! - reading an absent path fails on the tree, returns empty bytes on the DHT
//! - directories exist only on the tree

pub mod adapter;
pub mod cache;
pub mod dht;
pub mod error;
pub mod hash;
pub mod meta;
pub mod path;
pub mod tree;

// Re-exports for convenience
pub use adapter::{StorageAdapter, StorageType};
pub use cache::DhtCache;
pub use dht::{
    DhtPeer, DhtStorageAdapter, GetRequest, MemoryOverlay, MemoryPeer, PeerKeyPair, PutRequest,
    PutStatus, RemoveRequest, RemoveStatus, RequestSignature, TransportError,
};
pub use error::{Result, StorageError};
pub use hash::{md5_hex, md5_hex_reader, HashError, Number160};
pub use meta::MetaInfo;
pub use path::{DhtKey, PathElement};
pub use tree::LocalTreeStorageAdapter;
