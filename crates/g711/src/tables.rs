//! The four precomputed lookup tables the codec needs: one 65,536-entry
//! PCM->code encode table and one 256-entry code->PCM decode table, per
//! companding law.
//!
//! Building these once at construction trades a small amount of memory
//! (128 KiB total) for O(1) sample conversion on the hot encode/decode
//! path.

use crate::{alaw, mulaw};

#[derive(Clone)]
pub struct Tables {
    pub encode: Vec<u8>,
    pub decode: Vec<i16>,
}

impl Tables {
    pub fn mulaw() -> Self {
        Self::build(mulaw::encode_sample, mulaw::decode_sample)
    }

    pub fn alaw() -> Self {
        Self::build(alaw::encode_sample, alaw::decode_sample)
    }

    fn build(encode_sample: fn(i16) -> u8, decode_sample: fn(u8) -> i16) -> Self {
        let mut encode = vec![0u8; 65_536];
        for (index, slot) in encode.iter_mut().enumerate() {
            let pcm = (index as i32 - 32_768) as i16;
            *slot = encode_sample(pcm);
        }

        let mut decode = vec![0i16; 256];
        for (index, slot) in decode.iter_mut().enumerate() {
            *slot = decode_sample(index as u8);
        }

        Self { encode, decode }
    }

    #[inline]
    pub fn encode(&self, pcm: i16) -> u8 {
        self.encode[(pcm as i32 + 32_768) as usize]
    }

    #[inline]
    pub fn decode(&self, byte: u8) -> i16 {
        self.decode[byte as usize]
    }
}
