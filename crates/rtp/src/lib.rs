//! RFC 3550-style RTP packet codec, session state, and jitter buffer.

pub mod error;
pub mod jitter;
pub mod packet;
pub mod rtcp;
pub mod session;

pub use error::{Error, Result};
pub use jitter::JitterBuffer;
pub use packet::{Extension, PayloadType, RtpPacket};
pub use rtcp::RtcpReport;
pub use session::{JitterConfig, RtpSession, SessionStats};
