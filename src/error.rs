//! Top-level error type for the user-agent binary.
//!
//! Library crates (`sip`, `rtp`, `g711`) each carry their own hand-rolled
//! `Error`; this enum is the boundary type the `ua` dispatch layer returns
//! when a request cannot be handled, plus the kinds that have no SIP
//! response mapping at all (transport failures). `anyhow::Error` is used
//! further out, at `main`/`lib`'s process boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sip(#[from] sip::Error),

    #[error(transparent)]
    Rtp(#[from] rtp::Error),

    #[error(transparent)]
    G711(#[from] g711::Error),

    /// Maps to SIP `400 Bad Request`.
    #[error("bad request: {0}")]
    BadRequest(&'static str),

    /// Maps to SIP `404 Not Found`.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Maps to SIP `501 Not Implemented`.
    #[error("method not implemented: {0}")]
    NotImplemented(String),

    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
