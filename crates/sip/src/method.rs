use std::fmt;
use std::str::FromStr;

/// A SIP request method.
///
/// `Unknown` carries the verbatim token for any method outside RFC 3261's
/// core set, the same way `rtp::PayloadType::Unknown(u8)` carries an
/// unrecognized payload type number rather than failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Register,
    Options,
    Info,
    Update,
    Prack,
    Subscribe,
    Notify,
    Message,
    Refer,
    Unknown(String),
}

impl Method {
    /// Whether this method follows the INVITE transaction state machine
    /// (RFC 3261 §17 splits client/server transactions into INVITE and
    /// non-INVITE variants).
    pub fn is_invite(&self) -> bool {
        matches!(self, Method::Invite)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Invite => f.write_str("INVITE"),
            Method::Ack => f.write_str("ACK"),
            Method::Bye => f.write_str("BYE"),
            Method::Cancel => f.write_str("CANCEL"),
            Method::Register => f.write_str("REGISTER"),
            Method::Options => f.write_str("OPTIONS"),
            Method::Info => f.write_str("INFO"),
            Method::Update => f.write_str("UPDATE"),
            Method::Prack => f.write_str("PRACK"),
            Method::Subscribe => f.write_str("SUBSCRIBE"),
            Method::Notify => f.write_str("NOTIFY"),
            Method::Message => f.write_str("MESSAGE"),
            Method::Refer => f.write_str("REFER"),
            Method::Unknown(token) => f.write_str(token),
        }
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "REGISTER" => Method::Register,
            "OPTIONS" => Method::Options,
            "INFO" => Method::Info,
            "UPDATE" => Method::Update,
            "PRACK" => Method::Prack,
            "SUBSCRIBE" => Method::Subscribe,
            "NOTIFY" => Method::Notify,
            "MESSAGE" => Method::Message,
            "REFER" => Method::Refer,
            other => Method::Unknown(other.to_string()),
        })
    }
}
