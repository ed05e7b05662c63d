//! Canned SDP body builder. The body is not negotiated; it always
//! advertises the same two G.711 payload types in the same line order.

use std::net::IpAddr;

/// Build the audio body carried by an INVITE's `200 OK`.
///
/// `user` seeds the origin (`o=`) username; `local_ip` and `rtp_port` are
/// the only other variable fields. Line order and content are otherwise
/// fixed, CRLF terminated throughout.
pub fn build(user: &str, local_ip: IpAddr, rtp_port: u16) -> String {
    format!(
        "v=0\r\n\
         o={user} 1234567890 1234567890 IN IP4 {local_ip}\r\n\
         s=VoIP Call\r\n\
         c=IN IP4 {local_ip}\r\n\
         t=0 0\r\n\
         m=audio {rtp_port} RTP/AVP 0 8\r\n\
         a=rtpmap:0 PCMU/8000\r\n\
         a=rtpmap:8 PCMA/8000\r\n\
         a=ptime:20\r\n\
         a=maxptime:40\r\n"
    )
}
