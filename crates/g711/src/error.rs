use thiserror::Error;

/// Errors produced by the G.711 codec.
///
/// The codec itself never fails to encode or decode a sample (every
/// `i16`/`u8` is in-domain); the only failure mode is a caller handing
/// encoded data of the wrong shape to a batch operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("PCM byte buffer has odd length {0}, but 16-bit samples need pairs of bytes")]
    OddLengthPcm(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
