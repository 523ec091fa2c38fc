//! Error types for device back-ends

use thiserror::Error;

/// Errors that can occur while talking to a device back-end
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Entity is not known to this adapter
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Back-end answered with a non-success status
    #[error("Backend rejected request ({status}): {body}")]
    Backend { status: u16, body: String },

    /// Back-end answered with a payload we could not interpret
    #[error("Unexpected payload from backend: {0}")]
    Payload(String),
}
