//! Conversion of untrusted, shape-varying JSON into canonical records.
//!
//! Field-level mismatches are absorbed (zero, empty, or absent values);
//! only a top-level body that is not JSON surfaces as [`NormalizeError`].
//!
//! [`NormalizeError`]: crate::error::NormalizeError

pub mod coerce;
pub mod dates;
pub mod envelope;
pub mod records;

pub use dates::{parse_date, DateFormat};
pub use envelope::{classify_create, classify_list, looks_like_html, CreateResult, ListBody};
pub use records::{
    decode_auth, decode_orders, decode_products, product_from_value, resolve_created_product,
    AuthPayload,
};
