//! Property-based coverage of the encode/decode length and idempotence
//! invariants. Mu-law/A-law are lossy, so these never assert sample-exact
//! round trips — only the invariants the codec actually guarantees.

use g711::Codec;
use proptest::prelude::*;

fn arb_pcm() -> impl Strategy<Value = Vec<i16>> {
    proptest::collection::vec(any::<i16>(), 0..320)
}

proptest! {
    #[test]
    fn encoded_length_is_exactly_half_the_sample_count(pcm in arb_pcm()) {
        for codec in [Codec::mulaw(), Codec::alaw()] {
            let encoded = codec.encode(&pcm);
            prop_assert_eq!(encoded.len(), pcm.len());
        }
    }

    #[test]
    fn decode_to_bytes_is_exactly_double_the_encoded_length(pcm in arb_pcm()) {
        for codec in [Codec::mulaw(), Codec::alaw()] {
            let encoded = codec.encode(&pcm);
            let decoded_bytes = codec.decode_to_bytes(&encoded);
            prop_assert_eq!(decoded_bytes.len(), encoded.len() * 2);
        }
    }

    #[test]
    fn re_encoding_the_decoded_signal_is_idempotent(pcm in arb_pcm()) {
        for codec in [Codec::mulaw(), Codec::alaw()] {
            let once = codec.encode(&pcm);
            let twice = codec.encode(&codec.decode(&once));
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn transcoding_preserves_length(pcm in arb_pcm()) {
        let mulaw = Codec::mulaw();
        let alaw = Codec::alaw();

        let mulaw_bytes = mulaw.encode(&pcm);
        let transcoded = mulaw.transcode(&mulaw_bytes, &alaw);
        prop_assert_eq!(transcoded.len(), mulaw_bytes.len());
    }
}
