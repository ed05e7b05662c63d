//! ITU-T G.711 A-law companding.
//!
//! A-law shares mu-law's sign extraction and 32635 clip, but biases
//! samples below 256 toward a purely linear mantissa instead of a
//! segment+mantissa split, and scrambles the result with the standard
//! alternating-bit XOR mask `0x55` instead of one's-complementing it.

use crate::segment::highest_bit_position;

const CLIP: i32 = 32_635;
const SEG_SHIFT: i32 = 4;
const XOR_MASK: u8 = 0x55;

pub fn encode_sample(pcm: i16) -> u8 {
    let sign: i32 = if pcm >= 0 { 0x80 } else { 0x00 };

    let mut magnitude = pcm as i32;
    if sign == 0 {
        magnitude = -magnitude;
    }
    if magnitude > CLIP {
        magnitude = CLIP;
    }

    let compressed = if magnitude >= 256 {
        let exponent = highest_bit_position(((magnitude >> 8) & 0x7F) as u8) as i32 + 1;
        let mantissa = (magnitude >> (exponent + 3)) & 0x0F;
        (exponent << SEG_SHIFT) | mantissa
    } else {
        magnitude >> 4
    };

    (compressed as u8) ^ (sign as u8) ^ XOR_MASK
}

pub fn decode_sample(byte: u8) -> i16 {
    let byte = byte ^ XOR_MASK;
    let sign = byte & 0x80;
    let byte = byte & 0x7F;

    let exponent = (byte >> SEG_SHIFT) & 0x07;
    let mantissa = (byte & 0x0F) as i32;

    let magnitude = if exponent == 0 {
        (mantissa << 4) | 0x08
    } else {
        ((mantissa << 4) | 0x108) << (exponent as i32 - 1)
    };

    let sample = if sign != 0 { magnitude } else { -magnitude };
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
