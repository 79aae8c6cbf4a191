//! # qskipper-store
//!
//! Local persistence for the QSkipper admin client.
//!
//! The crate exposes a synchronous `Database` handle over a SQLite
//! key-value table (session identity and restaurant snapshots), the
//! [`KeyValueStore`] seam the session store persists through, and the
//! two-tier [`ImageCache`] for remotely fetched images.

pub mod database;
pub mod image_cache;
pub mod kv;
pub mod migrations;

mod error;

pub use database::{default_cache_dir, default_data_dir, Database};
pub use error::{Result, StoreError};
pub use image_cache::{ImageCache, MemoryStats};
pub use kv::{KeyValueStore, MemoryStore};
