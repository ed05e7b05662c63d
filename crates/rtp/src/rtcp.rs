/// An RTCP receiver-report-style snapshot. Transmission over the
/// wire is out of scope; this is produced on demand for diagnostics or a
/// higher layer that does own a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpReport {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub cumulative_packets_lost: i32,
    pub extended_highest_sequence_number: u32,
    pub jitter: u32,
    pub last_sr_timestamp: u32,
    pub delay_since_last_sr: u32,
}
