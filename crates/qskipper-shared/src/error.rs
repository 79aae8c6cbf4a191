use thiserror::Error;

/// Top-level payload failures. Field-level mismatches never surface here;
/// they are absorbed by the lenient coercions.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Malformed response body: {0}")]
    Malformed(String),

    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image processing error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("Empty image payload")]
    Empty,
}
