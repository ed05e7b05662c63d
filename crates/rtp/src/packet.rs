use crate::error::{Error, Result};

/// RFC 3551 static payload type assignments this codec recognizes by name.
/// Anything else round-trips through `Unknown(n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    Pcmu,
    Pcma,
    G722,
    G729,
    Opus,
    TelephoneEvent,
    Unknown(u8),
}

impl PayloadType {
    pub fn number(self) -> u8 {
        match self {
            PayloadType::Pcmu => 0,
            PayloadType::Pcma => 8,
            PayloadType::G722 => 9,
            PayloadType::G729 => 18,
            PayloadType::Opus => 111,
            PayloadType::TelephoneEvent => 101,
            PayloadType::Unknown(n) => n,
        }
    }

    pub fn name(self) -> String {
        match self {
            PayloadType::Pcmu => "PCMU".to_string(),
            PayloadType::Pcma => "PCMA".to_string(),
            PayloadType::G722 => "G722".to_string(),
            PayloadType::G729 => "G729".to_string(),
            PayloadType::Opus => "OPUS".to_string(),
            PayloadType::TelephoneEvent => "telephone-event".to_string(),
            PayloadType::Unknown(n) => format!("Unknown({n})"),
        }
    }

    /// Samples advanced per outgoing packet at this payload type's clock rate.
    pub fn samples_per_packet(self) -> u32 {
        match self {
            PayloadType::Pcmu | PayloadType::Pcma => 160,
            PayloadType::G729 => 80,
            PayloadType::G722 => 320,
            _ => 160,
        }
    }
}

impl From<u8> for PayloadType {
    fn from(n: u8) -> Self {
        match n {
            0 => PayloadType::Pcmu,
            8 => PayloadType::Pcma,
            9 => PayloadType::G722,
            18 => PayloadType::G729,
            111 => PayloadType::Opus,
            101 => PayloadType::TelephoneEvent,
            other => PayloadType::Unknown(other),
        }
    }
}

/// The RTP header extension (RFC 3550 §5.3.1). `data` is the raw extension
/// payload, always a multiple of 4 bytes (the wire format counts it in
/// 32-bit words).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub profile_id: u16,
    pub data: Vec<u8>,
}

/// A parsed or to-be-serialized RTP packet.
///
/// `padding` and `payload` are always stored with padding already stripped;
/// `padding` records the padding-octet-count field so `serialize` can
/// reconstruct the identical wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub version: u8,
    pub padding: Option<u8>,
    pub extension: Option<Extension>,
    pub marker: bool,
    pub payload_type: PayloadType,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Whether this packet's header is well-formed enough to act on.
    /// Parsing itself is permissive (to allow inspecting malformed input);
    /// only version 2 is considered valid.
    pub fn is_valid(&self) -> bool {
        self.version == 2
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 12 {
            return Err(Error::PacketTooShort);
        }

        let byte0 = bytes[0];
        let version = byte0 >> 6;
        let padding_flag = byte0 & 0x20 != 0;
        let extension_flag = byte0 & 0x10 != 0;
        let csrc_count = (byte0 & 0x0F) as usize;

        let byte1 = bytes[1];
        let marker = byte1 & 0x80 != 0;
        let payload_type = PayloadType::from(byte1 & 0x7F);

        let sequence_number = u16::from_be_bytes([bytes[2], bytes[3]]);
        let timestamp = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let ssrc = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        let mut offset = 12;
        let csrc_bytes_needed = csrc_count * 4;
        if bytes.len() < offset + csrc_bytes_needed {
            return Err(Error::InvalidPayload("truncated CSRC list"));
        }

        let mut csrc = Vec::with_capacity(csrc_count);
        for i in 0..csrc_count {
            let base = offset + i * 4;
            csrc.push(u32::from_be_bytes([
                bytes[base],
                bytes[base + 1],
                bytes[base + 2],
                bytes[base + 3],
            ]));
        }
        offset += csrc_bytes_needed;

        let extension = if extension_flag {
            if bytes.len() < offset + 4 {
                return Err(Error::InvalidPayload("truncated extension header"));
            }
            let profile_id = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
            let ext_len_words = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
            offset += 4;

            let ext_len_bytes = ext_len_words * 4;
            if bytes.len() < offset + ext_len_bytes {
                return Err(Error::InvalidPayload("truncated extension data"));
            }
            let data = bytes[offset..offset + ext_len_bytes].to_vec();
            offset += ext_len_bytes;

            Some(Extension { profile_id, data })
        } else {
            None
        };

        let remaining = &bytes[offset..];
        let (payload, padding) = if padding_flag {
            let pad_len = *remaining.last().ok_or(Error::InvalidPayload(
                "padding flag set but packet has no payload",
            ))? as usize;

            if pad_len == 0 || pad_len > remaining.len() {
                return Err(Error::InvalidPayload("padding length exceeds payload"));
            }

            (remaining[..remaining.len() - pad_len].to_vec(), Some(pad_len as u8))
        } else {
            (remaining.to_vec(), None)
        };

        Ok(Self {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            payload,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let header_size = 12
            + 4 * self.csrc.len()
            + self.extension.as_ref().map(|e| 4 + e.data.len()).unwrap_or(0);
        let padding_len = self.padding.map(|p| p as usize).unwrap_or(0);
        let mut out = Vec::with_capacity(header_size + self.payload.len() + padding_len);

        let byte0 = (self.version << 6)
            | ((self.padding.is_some() as u8) << 5)
            | ((self.extension.is_some() as u8) << 4)
            | (self.csrc.len() as u8 & 0x0F);
        let byte1 = ((self.marker as u8) << 7) | (self.payload_type.number() & 0x7F);

        out.push(byte0);
        out.push(byte1);
        out.extend_from_slice(&self.sequence_number.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());

        for csrc in &self.csrc {
            out.extend_from_slice(&csrc.to_be_bytes());
        }

        if let Some(ext) = &self.extension {
            out.extend_from_slice(&ext.profile_id.to_be_bytes());
            out.extend_from_slice(&((ext.data.len() / 4) as u16).to_be_bytes());
            out.extend_from_slice(&ext.data);
        }

        out.extend_from_slice(&self.payload);

        if let Some(pad_len) = self.padding {
            if pad_len > 1 {
                out.extend(std::iter::repeat(0u8).take(pad_len as usize - 1));
            }
            out.push(pad_len);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> RtpPacket {
        RtpPacket {
            version: 2,
            padding: None,
            extension: None,
            marker: false,
            payload_type: PayloadType::Pcmu,
            sequence_number: 12345,
            timestamp: 987_654_321,
            ssrc: 0x1234_5678,
            csrc: Vec::new(),
            payload: b"test audio data".to_vec(),
        }
    }

    #[test]
    fn round_trips_the_concrete_scenario_packet() {
        let packet = sample_packet();
        let bytes = packet.serialize();
        let parsed = RtpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn rejects_buffers_shorter_than_twelve_bytes() {
        assert!(matches!(RtpPacket::parse(&[0u8; 11]), Err(Error::PacketTooShort)));
    }

    #[test]
    fn non_version_two_header_parses_but_is_invalid() {
        let mut bytes = sample_packet().serialize();
        bytes[0] = (1 << 6) | (bytes[0] & 0x3F);
        let parsed = RtpPacket::parse(&bytes).unwrap();
        assert!(!parsed.is_valid());
    }

    #[test]
    fn csrc_list_round_trips() {
        let mut packet = sample_packet();
        packet.csrc = vec![1, 2, 3];
        let bytes = packet.serialize();
        let parsed = RtpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.csrc, vec![1, 2, 3]);
    }

    #[test]
    fn extension_round_trips() {
        let mut packet = sample_packet();
        packet.extension = Some(Extension {
            profile_id: 0xBEDE,
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
        });
        let bytes = packet.serialize();
        let parsed = RtpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.extension, packet.extension);
    }

    #[test]
    fn padding_is_stripped_on_parse_and_reconstructed_on_serialize() {
        let mut packet = sample_packet();
        packet.padding = Some(4);
        let bytes = packet.serialize();
        assert_eq!(*bytes.last().unwrap(), 4);

        let parsed = RtpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.payload, packet.payload);
        assert_eq!(parsed.padding, Some(4));
    }

    #[test]
    fn unknown_payload_type_renders_with_its_number() {
        let pt = PayloadType::from(42);
        assert!(matches!(pt, PayloadType::Unknown(42)));
        assert_eq!(pt.name(), "Unknown(42)");
    }
}
