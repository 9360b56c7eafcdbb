//! Unified error type.

use crate::crypto::CryptoError;

/// A boxed application error, carried through the pipeline untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by palisade's fallible operations.
///
/// Expected, user-facing failures are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s: a CSRF mismatch is a
/// `412` response and a tampered cookie is simply absent. This type surfaces
/// programmer errors, security failures and infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pipeline or one of its middleware is wired incorrectly.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The operating system could not provide secure randomness.
    #[error("secure random source unavailable: {0}")]
    Security(#[source] rand::Error),

    #[error("cookie protection failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] http::header::InvalidHeaderValue),

    #[error("http: {0}")]
    Http(#[from] http::Error),

    #[error("failed to load configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// An error raised by the application target or a user middleware.
    #[error(transparent)]
    Handler(BoxError),
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wraps an application error so it can travel through the pipeline.
    pub fn handler(error: impl Into<BoxError>) -> Self {
        Self::Handler(error.into())
    }
}
