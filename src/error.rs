//! Error taxonomy for the push engine.
//!
//! Every variant except `Repository` is recipient-scoped: it abandons one
//! subscription's delivery and must never abort the rest of the batch.

use thiserror::Error;

/// Errors from the push dispatch pipeline.
#[derive(Debug, Error)]
pub enum PushError {
    /// Input that should have been base64url was not.
    #[error("malformed base64url input: {0}")]
    MalformedInput(#[from] base64::DecodeError),

    /// A subscription's stored public key or auth secret is unusable.
    #[error("malformed recipient key material: {0}")]
    MalformedKeyMaterial(String),

    /// VAPID private-key import or ECDSA signing failed.
    #[error("VAPID signing failed: {0}")]
    Signing(String),

    /// Reading or writing the VAPID key file failed.
    #[error("VAPID key storage error: {0}")]
    KeyStorage(String),

    /// Notification payload could not be serialized to its wire form.
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),

    /// Network-level failure talking to a push service.
    #[error("push delivery failed: {0}")]
    Transport(String),

    /// The subscription repository could not be reached. Fatal for the
    /// dispatch cycle when it prevents listing subscriptions.
    #[error("subscription repository unavailable: {0}")]
    Repository(String),
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        PushError::Transport(err.to_string())
    }
}

impl From<rusqlite::Error> for PushError {
    fn from(err: rusqlite::Error) -> Self {
        PushError::Repository(err.to_string())
    }
}
