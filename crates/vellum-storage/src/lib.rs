//! Vellum Storage - namespaced key-value persistence.
//!
//! The [`KvStore`] trait is the byte-level foundation of the ledger. Every
//! operation is scoped to a namespace, and two operations exist specifically
//! for append-only workloads:
//!
//! - [`KvStore::insert_batch`] writes a group of fresh keys in one atomic
//!   commit, refusing the whole batch if any key is already present.
//! - [`KvStore::range`] scans a namespace in ascending key order, which is
//!   how secondary indexes are read.
//!
//! # Backends
//!
//! | Backend | Feature | Use |
//! |---------|---------|-----|
//! | [`MemoryKvStore`] | always | tests, ephemeral ledgers |
//! | `SurrealKvStore` | `kv` | embedded, durable, ACID LSM-tree |

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use kv::{KvEntry, KvStore, MemoryKvStore, prefix_upper_bound};

#[cfg(feature = "kv")]
pub use kv::SurrealKvStore;
