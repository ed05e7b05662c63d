use crate::message::SipMessage;

/// Matching key used both client-side (routing responses to the
/// transaction that sent the request) and server-side (deduplicating
/// retransmitted requests): `branch || call-id || cseq-sequence
/// || from-header`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub branch: String,
    pub call_id: String,
    pub cseq_sequence: u32,
    pub from_header: String,
}

impl TransactionKey {
    /// Build the key from the message that originates the transaction (the
    /// client's request, or the server's received request).
    pub fn from_message(message: &SipMessage) -> Option<Self> {
        let branch = message.branch()?;
        let call_id = message.call_id()?.to_string();
        let cseq_sequence = message.cseq()?.sequence;
        let from_header = message.header("from")?.to_string();

        Some(Self {
            branch,
            call_id,
            cseq_sequence,
            from_header,
        })
    }
}
