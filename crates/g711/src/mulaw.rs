//! ITU-T G.711 mu-law companding.
//!
//! mu-law encode: extract the sign bit, clamp the magnitude to 32635, add
//! the standard 0x84 bias, find the exponent (the position of the
//! segment the biased magnitude falls into), extract the 4-bit mantissa,
//! and combine `~(sign | exponent << 4 | mantissa)`. Decode inverts this,
//! adding the bias back in before sign restoration.

use crate::segment::highest_bit_position;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32_635;

/// `DECODE_BIAS[exponent]` recovers the magnitude a given exponent's
/// segment starts at, before the mantissa's contribution is added in.
const DECODE_BIAS: [i32; 8] = [0, 132, 396, 924, 1980, 4092, 8316, 16764];

pub fn encode_sample(pcm: i16) -> u8 {
    let sign: i32 = if pcm < 0 { 0x80 } else { 0x00 };

    let mut magnitude = pcm as i32;
    if sign != 0 {
        magnitude = -magnitude;
    }
    if magnitude > CLIP {
        magnitude = CLIP;
    }
    magnitude += BIAS;

    let exponent = highest_bit_position(((magnitude >> 7) & 0xFF) as u8) as i32;
    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;

    (!(sign | (exponent << 4) | mantissa) & 0xFF) as u8
}

pub fn decode_sample(byte: u8) -> i16 {
    let inverted = !(byte as i32) & 0xFF;
    let sign = inverted & 0x80;
    let exponent = (inverted >> 4) & 0x07;
    let mantissa = inverted & 0x0F;

    let magnitude = DECODE_BIAS[exponent as usize] + (mantissa << (exponent + 3));
    let sample = if sign != 0 { -magnitude } else { magnitude };

    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_round_trips_close_to_zero() {
        assert!(decode_sample(encode_sample(0)).abs() <= 8);
    }

    #[test]
    fn full_scale_positive_and_negative_clip_and_round_trip() {
        let pos = decode_sample(encode_sample(i16::MAX));
        let neg = decode_sample(encode_sample(i16::MIN));
        assert!(pos > 30_000);
        assert!(neg < -30_000);
    }

    #[test]
    fn double_encode_is_idempotent() {
        for pcm in [-20000i16, -1000, -1, 0, 1, 1000, 20000, i16::MAX, i16::MIN] {
            let once = encode_sample(pcm);
            let twice = encode_sample(decode_sample(once));
            assert_eq!(once, twice, "pcm = {pcm}");
        }
    }

    #[test]
    fn quantization_error_is_bounded() {
        for pcm in (-32768i32..32768).step_by(97) {
            let pcm = pcm as i16;
            let decoded = decode_sample(encode_sample(pcm));
            let error = (decoded as i32 - pcm as i32).abs();
            // mu-law's coarsest segment quantizes in steps of ~4096 codes.
            assert!(error <= 4200, "pcm={pcm} decoded={decoded} error={error}");
        }
    }
}
