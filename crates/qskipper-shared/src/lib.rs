//! # qskipper-shared
//!
//! Domain types, constants and the pure building blocks shared by the store
//! and client crates: the tolerant JSON normalizer, cache-key derivation and
//! upload image compression. Nothing in this crate performs I/O.

pub mod cache_key;
pub mod constants;
pub mod error;
pub mod imaging;
pub mod normalize;
pub mod types;

pub use cache_key::{CacheKey, CachedImage};
pub use error::{ImageError, NormalizeError};
pub use types::*;
