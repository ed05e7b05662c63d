use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("RTP packet shorter than the fixed 12-byte header")]
    PacketTooShort,

    #[error("RTP packet has an invalid version or truncated header: {0}")]
    InvalidPayload(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
