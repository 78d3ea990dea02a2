//! Error types for owa-pop3-proxy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The backend rejected the supplied credentials. Recoverable: the
    /// POP3 session stays open for another USER/PASS attempt.
    #[error("login failed: invalid username or password")]
    InvalidLogin,

    /// The backend answered 401 outside the login exchange.
    #[error("backend requires authentication")]
    AuthRequired,

    /// The backend returned a page we cannot make sense of, or an
    /// unexpected HTTP status. Fatal for the webmail session.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
