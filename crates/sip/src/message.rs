use std::fmt;

use crate::error::{Error, Result};
use crate::method::Method;

/// The fixed protocol version string emitted on every start line.
pub const VERSION: &str = "SIP/2.0";

/// The request-line or status-line of a [`SipMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: Method,
        request_uri: String,
    },
    Response {
        status_code: u16,
        reason_phrase: String,
    },
}

/// A parsed `sequence`/`method` pair from a `CSeq` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub sequence: u32,
    pub method: Method,
}

/// An ordered, case-insensitive header list.
///
/// Names are stored lowercased (per the data model's invariant that
/// `getHeader` comparisons are case-insensitive); insertion order is
/// preserved so serialization reproduces a natural header ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.0
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or overwrite the value for `name`, preserving the position of
    /// the first occurrence if one already exists.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();

        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    pub fn remove(&mut self, name: &str) {
        let name = name.to_ascii_lowercase();
        self.0.retain(|(k, _)| *k != name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A SIP request or response, per RFC 3261's text message grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipMessage {
    pub start_line: StartLine,
    headers: Headers,
    pub body: Vec<u8>,
}

impl SipMessage {
    pub fn new_request(method: Method, request_uri: impl Into<String>) -> Self {
        Self {
            start_line: StartLine::Request {
                method,
                request_uri: request_uri.into(),
            },
            headers: Headers::default(),
            body: Vec::new(),
        }
    }

    pub fn new_response(status_code: u16, reason_phrase: impl Into<String>) -> Self {
        Self {
            start_line: StartLine::Response {
                status_code,
                reason_phrase: reason_phrase.into(),
            },
            headers: Headers::default(),
            body: Vec::new(),
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    pub fn method(&self) -> Option<&Method> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn request_uri(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { request_uri, .. } => Some(request_uri),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Response { status_code, .. } => Some(*status_code),
            StartLine::Request { .. } => None,
        }
    }

    /// A final response is any status code >= 200 (RFC 3261 §7.2).
    pub fn is_final_response(&self) -> bool {
        self.status_code().is_some_and(|code| code >= 200)
    }

    pub fn is_provisional_response(&self) -> bool {
        self.status_code().is_some_and(|code| (100..200).contains(&code))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.header("call-id")
    }

    /// Parse the `CSeq` header into its sequence number and method.
    pub fn cseq(&self) -> Option<CSeq> {
        let raw = self.header("cseq")?;
        let mut parts = raw.split_whitespace();
        let sequence = parts.next()?.parse().ok()?;
        let method: Method = parts.next()?.parse().expect("Method::from_str is infallible");
        Some(CSeq { sequence, method })
    }

    /// The `branch` parameter of the topmost Via header.
    pub fn branch(&self) -> Option<String> {
        self.header("via").and_then(|v| extract_param(v, "branch"))
    }

    pub fn from_tag(&self) -> Option<String> {
        self.header("from").and_then(extract_tag)
    }

    pub fn to_tag(&self) -> Option<String> {
        self.header("to").and_then(extract_tag)
    }

    /// Set the Content-Length header from the current body length.
    ///
    /// Serialization never computes this automatically; callers
    /// (request/response builders) are responsible for calling this before
    /// `serialize`.
    pub fn set_content_length(&mut self) {
        self.set_header("Content-Length", self.body.len().to_string());
    }

    fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Build a response seeded from a request's Via, From, To, Call-ID and
    /// CSeq headers (RFC 3261 §8.2.6.2).
    ///
    /// To-tag augmentation for non-100 responses is left to the caller.
    pub fn response_to(request: &SipMessage, status_code: u16, reason_phrase: impl Into<String>) -> Self {
        let mut response = SipMessage::new_response(status_code, reason_phrase);

        for name in ["via", "from", "to", "call-id", "cseq"] {
            if let Some(value) = request.header(name) {
                response.set_header(name, value);
            }
        }

        response
    }

    /// Parse a wire-format message.
    ///
    /// Tolerates bare `\n` line endings on input; `serialize`
    /// always emits `\r\n`.
    pub fn parse(input: &[u8]) -> Result<Self> {
        if input.is_empty() {
            return Err(Error::MalformedMessage("empty message"));
        }

        let (head, body) = split_head_and_body(input);
        let head = std::str::from_utf8(head)
            .map_err(|_| Error::MalformedMessage("header section is not valid utf-8"))?;

        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

        let start_line_text = lines
            .next()
            .ok_or(Error::MalformedMessage("missing start line"))?;
        let start_line = parse_start_line(start_line_text)?;

        let mut headers = Headers::default();
        let mut pending: Option<(String, String)> = None;

        for line in lines {
            if line.is_empty() {
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = pending.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = pending.take() {
                headers.set(name, value);
            }

            let colon = line
                .find(':')
                .ok_or(Error::MalformedMessage("header line missing ':'"))?;

            let name = line[..colon].trim().to_string();
            let value = line[colon + 1..].trim().to_string();
            pending = Some((name, value));
        }

        if let Some((name, value)) = pending.take() {
            headers.set(name, value);
        }

        let mut message = SipMessage {
            start_line,
            headers,
            body: Vec::new(),
        };

        // Content-Length, if present, truncates the body (clamped to what's
        // actually there); if absent, §3's "absent means zero" applies and
        // the trailing datagram bytes are not body at all.
        let body = if message.header("content-length").is_some() {
            let declared_len = message.content_length();
            &body[..declared_len.min(body.len())]
        } else {
            &[]
        };

        message.body = body.to_vec();
        Ok(message)
    }

    /// Serialize to wire format: `<start-line>CRLF`, headers, a blank line,
    /// then the body verbatim. The caller must have set Content-Length.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());

        match &self.start_line {
            StartLine::Request { method, request_uri } => {
                out.extend_from_slice(format!("{method} {request_uri} {VERSION}\r\n").as_bytes());
            }
            StartLine::Response { status_code, reason_phrase } => {
                out.extend_from_slice(
                    format!("{VERSION} {status_code} {reason_phrase}\r\n").as_bytes(),
                );
            }
        }

        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }

        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.serialize()))
    }
}

fn parse_start_line(line: &str) -> Result<StartLine> {
    let mut parts = line.splitn(3, ' ').map(|s| s.trim());

    let first = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or(Error::MalformedMessage("empty start line"))?;
    let second = parts
        .next()
        .ok_or(Error::MalformedMessage("start line has fewer than three tokens"))?;
    let third = parts
        .next()
        .ok_or(Error::MalformedMessage("start line has fewer than three tokens"))?;

    if let Some(_version) = first.strip_prefix("SIP/") {
        let status_code: u16 = second
            .parse()
            .map_err(|_| Error::MalformedMessage("status code is not a valid integer"))?;

        Ok(StartLine::Response {
            status_code,
            reason_phrase: third.to_string(),
        })
    } else {
        let method = first.parse().expect("Method::from_str is infallible");
        Ok(StartLine::Request {
            method,
            request_uri: second.to_string(),
        })
    }
}

/// Find the blank line separating headers from the body, tolerating both
/// `\r\n\r\n` and bare `\n\n` terminators. If no separator is found the
/// whole buffer is treated as headers with an empty body.
fn split_head_and_body(input: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find(input, b"\r\n\r\n") {
        return (&input[..pos], &input[pos + 4..]);
    }

    if let Some(pos) = find(input, b"\n\n") {
        return (&input[..pos], &input[pos + 2..]);
    }

    (input, &[])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Extract a `tag=<token>` value from a From/To header, terminated by `;`,
/// `>`, or whitespace.
fn extract_tag(header_value: &str) -> Option<String> {
    extract_param(header_value, "tag")
}

/// Extract a `<param>=<token>` value from a header, terminated by `;`, `>`,
/// or whitespace. Used for tags and for the Via `branch` parameter.
pub fn extract_param(header_value: &str, param: &str) -> Option<String> {
    let needle = format!("{param}=");
    let idx = header_value.find(needle.as_str())?;
    let rest = &header_value[idx + needle.len()..];
    let end = rest
        .find(|c: char| c == ';' || c == '>' || c.is_whitespace())
        .unwrap_or(rest.len());

    let value = &rest[..end];
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
