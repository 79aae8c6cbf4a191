//! Domain services composed over the gateway and the session.

pub mod auth;
pub mod images;
pub mod orders;
pub mod products;
pub mod restaurant;

pub use auth::{AuthService, RegisterRequest};
pub use images::ImageService;
pub use orders::OrderService;
pub use products::ProductService;
pub use restaurant::{RestaurantService, RestaurantUpdate};

use bytes::Bytes;

use qskipper_shared::imaging::compress_for_upload;
use qskipper_shared::constants::UPLOAD_TARGET_BYTES;

use crate::error::{ApiError, Result};

/// Compress an image off the async runtime.
pub(crate) async fn compress_upload(image: Bytes, max_edge: u32) -> Result<Bytes> {
    let original = image.len();
    let compressed = tokio::task::spawn_blocking(move || {
        compress_for_upload(&image, max_edge, UPLOAD_TARGET_BYTES)
    })
    .await
    .map_err(|e| ApiError::InvalidInput(format!("image compression aborted: {e}")))??;
    tracing::debug!(original, compressed = compressed.len(), "Image ready for upload");
    Ok(Bytes::from(compressed))
}
