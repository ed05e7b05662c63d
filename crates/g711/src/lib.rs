//! A bit-exact G.711 mu-law and A-law sample codec.
//!
//! Conversion runs entirely against the four precomputed lookup tables
//! built once per [`Codec`]; there is no branching per-sample math on the
//! encode/decode hot path. Cross-conversion between the two companding
//! laws goes through linear PCM as the intermediate representation,
//! exactly as two independent codecs would if chained by a caller.

mod alaw;
mod error;
mod mulaw;
mod segment;
mod tables;

pub use error::{Error, Result};

use tables::Tables;

/// Which ITU-T G.711 companding law a [`Codec`] implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    MuLaw,
    ALaw,
}

/// A companding codec bound to one variant, holding its precomputed
/// encode/decode tables.
#[derive(Clone)]
pub struct Codec {
    variant: Variant,
    tables: Tables,
}

impl Codec {
    pub fn new(variant: Variant) -> Self {
        let tables = match variant {
            Variant::MuLaw => Tables::mulaw(),
            Variant::ALaw => Tables::alaw(),
        };

        Self { variant, tables }
    }

    pub fn mulaw() -> Self {
        Self::new(Variant::MuLaw)
    }

    pub fn alaw() -> Self {
        Self::new(Variant::ALaw)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Encode linear 16-bit PCM samples into companded bytes. Output is
    /// exactly half the length of `pcm`.
    pub fn encode(&self, pcm: &[i16]) -> Vec<u8> {
        pcm.iter().map(|&sample| self.tables.encode(sample)).collect()
    }

    /// Decode companded bytes back into linear 16-bit PCM samples.
    pub fn decode(&self, data: &[u8]) -> Vec<i16> {
        data.iter().map(|&byte| self.tables.decode(byte)).collect()
    }

    /// Decode into a little-endian PCM byte buffer, exactly double the
    /// length of `data`.
    pub fn decode_to_bytes(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len() * 2);
        for &byte in data {
            out.extend_from_slice(&self.tables.decode(byte).to_le_bytes());
        }
        out
    }

    /// Encode from a little-endian PCM byte buffer (the shape audio I/O
    /// and the RTP payload boundary hand over). `pcm_bytes` must have
    /// even length.
    pub fn encode_from_bytes(&self, pcm_bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(self.encode(&pcm_i16_from_le_bytes(pcm_bytes)?))
    }

    /// Re-encode companded `data` for a different companding law by
    /// decoding it through linear PCM first.
    pub fn transcode(&self, data: &[u8], target: &Codec) -> Vec<u8> {
        target.encode(&self.decode(data))
    }
}

fn pcm_i16_from_le_bytes(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::OddLengthPcm(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| (1000.0 * (0.1 * i as f64).sin()) as i16)
            .collect()
    }

    #[test]
    fn mulaw_sine_round_trip_preserves_sample_count() {
        let codec = Codec::mulaw();
        let pcm = sine(160);

        let encoded = codec.encode(&pcm);
        assert_eq!(encoded.len(), 160);

        let decoded_bytes = codec.decode_to_bytes(&encoded);
        assert_eq!(decoded_bytes.len(), 320);
    }

    #[test]
    fn alaw_sine_round_trip_preserves_sample_count() {
        let codec = Codec::alaw();
        let pcm = sine(160);

        let encoded = codec.encode(&pcm);
        assert_eq!(encoded.len(), 160);
        assert_eq!(codec.decode(&encoded).len(), 160);
    }

    #[test]
    fn double_encode_is_idempotent_through_the_table_path() {
        let codec = Codec::mulaw();
        let pcm = sine(200);

        let once = codec.encode(&pcm);
        let twice = codec.encode(&codec.decode(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn cross_conversion_goes_through_linear_pcm() {
        let mulaw = Codec::mulaw();
        let alaw = Codec::alaw();
        let pcm = sine(80);

        let mulaw_bytes = mulaw.encode(&pcm);
        let alaw_bytes = mulaw.transcode(&mulaw_bytes, &alaw);
        assert_eq!(alaw_bytes.len(), mulaw_bytes.len());

        let back = alaw.decode(&alaw_bytes);
        for (original, round_tripped) in pcm.iter().zip(back.iter()) {
            assert!(
                (*original as i32 - *round_tripped as i32).abs() < 5000,
                "original={original} round_tripped={round_tripped}"
            );
        }
    }

    #[test]
    fn encode_from_bytes_rejects_odd_length() {
        let codec = Codec::mulaw();
        assert!(matches!(
            codec.encode_from_bytes(&[0u8; 3]),
            Err(Error::OddLengthPcm(3))
        ));
    }
}
