use thiserror::Error;

/// Errors produced by the SIP message codec and transaction layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed SIP message: {0}")]
    MalformedMessage(&'static str),

    #[error("transaction timed out")]
    TransactionTimeout,

    #[error("transaction exceeded the maximum retransmit count")]
    TransactionMaxRetransmits,
}

pub type Result<T> = std::result::Result<T, Error>;
