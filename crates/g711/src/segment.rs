/// Position of the highest set bit in `v` (0 for `v == 0` or `v == 1`),
/// i.e. `floor(log2(v.max(1)))`.
///
/// Both companding laws derive their exponent by locating which
/// power-of-two segment the biased magnitude falls into; this is that
/// segment search, expressed as a bit scan instead of a literal lookup
/// table (the 256-entry and 65,536-entry PCM<->code tables built in
/// `tables.rs` are the public lookup path, not this internal helper).
pub(crate) fn highest_bit_position(v: u8) -> u32 {
    31 - (v.max(1) as u32).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_segment_boundaries() {
        let cases: &[(u8, u32)] = &[
            (0, 0),
            (1, 0),
            (2, 1),
            (3, 1),
            (4, 2),
            (7, 2),
            (8, 3),
            (15, 3),
            (16, 4),
            (31, 4),
            (32, 5),
            (63, 5),
            (64, 6),
            (127, 6),
            (128, 7),
            (255, 7),
        ];

        for &(v, expected) in cases {
            assert_eq!(highest_bit_position(v), expected, "v = {v}");
        }
    }
}
