use crate::crypto::CryptoError;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Callback-handling errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pipeline asked for no passive reply at all. Callers must answer
    /// the callback with an empty 200 body.
    #[error("no response requested")]
    NoResponse,

    /// Signature or envelope failure on an inbound or outbound payload.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Wrapped error from an adapter, emitter, or other seam.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
