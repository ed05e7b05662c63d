use std::time::{Duration, Instant};

use rand::Rng;

use crate::jitter::JitterBuffer;
use crate::packet::{PayloadType, RtpPacket};
use crate::rtcp::RtcpReport;

/// An immutable snapshot of a session's counters, copied out rather than
/// borrowed so a caller can hold it past the session's next mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    pub invalid_packets: u64,
}

/// Configuration for a session's jitter buffer: its capacity, target
/// playout delay, and hard force-drain ceiling.
#[derive(Debug, Clone, Copy)]
pub struct JitterConfig {
    pub capacity: usize,
    pub delay: Duration,
    pub max_delay: Duration,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        }
    }
}

/// One side of an RTP media stream: outgoing packet construction and
/// incoming packet reassembly.
pub struct RtpSession {
    ssrc: u32,
    payload_type: PayloadType,
    clock_rate: u32,
    sequence_number: u16,
    timestamp: u32,
    last_sequence: Option<u16>,
    last_timestamp: Option<u32>,
    last_arrival: Option<Instant>,
    jitter: f64,
    base_sequence: Option<u16>,
    cycles: u32,
    buffer: JitterBuffer,
    stats: SessionStats,
}

impl RtpSession {
    pub fn new(ssrc: u32, payload_type: PayloadType, jitter_config: JitterConfig) -> Self {
        let mut rng = rand::rng();

        Self {
            ssrc,
            payload_type,
            clock_rate: clock_rate_for(payload_type),
            sequence_number: rng.random(),
            timestamp: rng.random(),
            last_sequence: None,
            last_timestamp: None,
            last_arrival: None,
            jitter: 0.0,
            base_sequence: None,
            cycles: 0,
            buffer: JitterBuffer::new(
                jitter_config.capacity,
                jitter_config.delay,
                jitter_config.max_delay,
            ),
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Build the next outgoing packet, advancing sequence number and
    /// timestamp by the payload type's samples-per-packet constant.
    pub fn create_packet(&mut self, payload: &[u8], marker: bool) -> RtpPacket {
        let packet = RtpPacket {
            version: 2,
            padding: None,
            extension: None,
            marker,
            payload_type: self.payload_type,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
            csrc: Vec::new(),
            payload: payload.to_vec(),
        };

        self.sequence_number = self.sequence_number.wrapping_add(1);
        self.timestamp = self
            .timestamp
            .wrapping_add(self.payload_type.samples_per_packet());

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;

        packet
    }

    /// Parse and absorb an incoming datagram, returning whatever the
    /// jitter buffer's drain pass releases this call. Malformed or
    /// invalid-version packets are logged and dropped, never propagated.
    pub fn receive_packet(&mut self, bytes: &[u8], now: Instant) -> Vec<RtpPacket> {
        let packet = match RtpPacket::parse(bytes) {
            Ok(packet) if packet.is_valid() => packet,
            Ok(_) => {
                log::warn!("dropping RTP packet with unsupported version");
                self.stats.invalid_packets += 1;
                return Vec::new();
            }
            Err(err) => {
                log::warn!("dropping malformed RTP packet: {err}");
                self.stats.invalid_packets += 1;
                return Vec::new();
            }
        };

        self.stats.packets_received += 1;
        self.stats.bytes_received += packet.payload.len() as u64;

        self.update_jitter(&packet, now);
        self.classify_and_insert(packet, now);

        self.buffer.drain(now)
    }

    fn update_jitter(&mut self, packet: &RtpPacket, now: Instant) {
        if let (Some(last_timestamp), Some(last_arrival)) = (self.last_timestamp, self.last_arrival) {
            let transit_expected = (packet.timestamp.wrapping_sub(last_timestamp)) as i64 * 1000
                / self.clock_rate as i64;
            let transit_observed = now.duration_since(last_arrival).as_millis() as i64;
            let d = (transit_observed - transit_expected).abs() as f64;
            self.jitter += (d - self.jitter) / 16.0;
        }

        self.last_timestamp = Some(packet.timestamp);
        self.last_arrival = Some(now);
    }

    fn classify_and_insert(&mut self, packet: RtpPacket, now: Instant) {
        let sequence_number = packet.sequence_number;

        if self.base_sequence.is_none() {
            self.base_sequence = Some(sequence_number);
        }

        match self.last_sequence {
            None => {
                self.last_sequence = Some(sequence_number);
                self.buffer.insert(sequence_number, packet, now);
            }
            Some(last) => {
                let diff = sequence_number.wrapping_sub(last) as i16;
                if diff > 0 {
                    if sequence_number < last {
                        self.cycles += 1;
                    }
                    self.last_sequence = Some(sequence_number);
                    self.buffer.insert(sequence_number, packet, now);
                } else if diff == 0 {
                    self.stats.duplicates += 1;
                } else {
                    self.stats.out_of_order += 1;
                    self.buffer.insert(sequence_number, packet, now);
                }
            }
        }
    }

    /// A cumulative-since-start approximation of an RTCP receiver report;
    /// real transmission is out of scope.
    pub fn rtcp_report(&self) -> RtcpReport {
        let extended_highest_sequence_number =
            (self.cycles << 16) | self.last_sequence.unwrap_or(0) as u32;
        let base = self.base_sequence.unwrap_or(0) as u32;

        let expected = extended_highest_sequence_number
            .saturating_sub(base)
            .saturating_add(1);
        let lost = expected.saturating_sub(self.stats.packets_received as u32);

        let fraction_lost = if expected == 0 {
            0
        } else {
            ((lost.min(expected) * 256) / expected).min(255) as u8
        };

        RtcpReport {
            ssrc: self.ssrc,
            fraction_lost,
            cumulative_packets_lost: lost as i32,
            extended_highest_sequence_number,
            jitter: self.jitter as u32,
            last_sr_timestamp: 0,
            delay_since_last_sr: 0,
        }
    }
}

fn clock_rate_for(payload_type: PayloadType) -> u32 {
    match payload_type {
        PayloadType::G722 => 16000,
        _ => 8000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_packet_advances_sequence_and_timestamp() {
        let mut session = RtpSession::new(1, PayloadType::Pcmu, JitterConfig::default());
        let first = session.create_packet(b"a", false);
        let second = session.create_packet(b"b", false);

        assert_eq!(second.sequence_number, first.sequence_number.wrapping_add(1));
        assert_eq!(second.timestamp, first.timestamp.wrapping_add(160));
    }

    #[test]
    fn receive_packet_counts_bytes_and_drops_invalid_input() {
        let mut session = RtpSession::new(1, PayloadType::Pcmu, JitterConfig::default());
        let dropped = session.receive_packet(&[0u8; 4], Instant::now());
        assert!(dropped.is_empty());
        assert_eq!(session.stats().invalid_packets, 1);
    }

    #[test]
    fn duplicate_sequence_number_is_counted_not_reinserted() {
        let mut session = RtpSession::new(1, PayloadType::Pcmu, JitterConfig::default());
        let mut sender = RtpSession::new(2, PayloadType::Pcmu, JitterConfig::default());
        let packet = sender.create_packet(b"hi", false).serialize();

        session.receive_packet(&packet, Instant::now());
        session.receive_packet(&packet, Instant::now());

        assert_eq!(session.stats().duplicates, 1);
    }

    #[test]
    fn eventual_drain_releases_received_packets_in_order() {
        let jitter_config = JitterConfig {
            capacity: 50,
            delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
        };
        let mut session = RtpSession::new(1, PayloadType::Pcmu, jitter_config);
        let mut sender = RtpSession::new(2, PayloadType::Pcmu, JitterConfig::default());

        let now = Instant::now();
        let first = sender.create_packet(b"1", false).serialize();
        let second = sender.create_packet(b"2", false).serialize();

        session.receive_packet(&first, now);
        let drained = session.receive_packet(&second, now + Duration::from_millis(5));

        assert!(!drained.is_empty());
    }
}
