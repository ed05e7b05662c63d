//! The active-call set: one `Call` per Call-ID, owned exclusively by
//! the user-agent.

use std::net::SocketAddr;
use std::time::Instant;

use ahash::{HashMap, HashMapExt};
use rtp::RtpSession;
use sip::TransactionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Incoming,
    Calling,
    Ringing,
    Established,
    Terminated,
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Terminated | CallState::Failed)
    }
}

/// A SIP dialog, identified by Call-ID.
pub struct Call {
    pub call_id: String,
    pub local_user: String,
    pub remote_user: String,
    pub from_tag: String,
    pub to_tag: Option<String>,
    pub local_cseq: u32,
    pub remote_cseq: u32,
    pub state: CallState,
    pub started_at: Instant,
    pub ended_at: Option<Instant>,
    pub remote_sip: SocketAddr,
    pub invite_key: Option<TransactionKey>,
    pub rtp_port: u16,
    pub rtp: Option<RtpSession>,
}

impl Call {
    /// Move to `next`, returning the state held just before the
    /// transition. Bookkeeping (calls-completed vs. calls-failed) is
    /// decided from this prior state, never from the post-transition one.
    pub fn transition(&mut self, next: CallState) -> CallState {
        let previous = self.state;
        self.state = next;
        if next.is_terminal() {
            self.ended_at = Some(Instant::now());
        }
        previous
    }
}

/// The active-call set. At most one `Call` exists per Call-ID at a time.
#[derive(Default)]
pub struct CallTable {
    calls: HashMap<String, Call>,
}

impl CallTable {
    pub fn insert(&mut self, call: Call) {
        self.calls.insert(call.call_id.clone(), call);
    }

    pub fn get(&self, call_id: &str) -> Option<&Call> {
        self.calls.get(call_id)
    }

    pub fn get_mut(&mut self, call_id: &str) -> Option<&mut Call> {
        self.calls.get_mut(call_id)
    }

    pub fn remove(&mut self, call_id: &str) -> Option<Call> {
        self.calls.remove(call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Immutable snapshot of the active Call-IDs.
    pub fn call_ids(&self) -> Vec<String> {
        self.calls.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(call_id: &str) -> Call {
        Call {
            call_id: call_id.to_string(),
            local_user: "alice".to_string(),
            remote_user: "bob".to_string(),
            from_tag: "t1".to_string(),
            to_tag: None,
            local_cseq: 0,
            remote_cseq: 0,
            state: CallState::Incoming,
            started_at: Instant::now(),
            ended_at: None,
            remote_sip: "127.0.0.1:5060".parse().unwrap(),
            invite_key: None,
            rtp_port: 0,
            rtp: None,
        }
    }

    #[test]
    fn transition_returns_the_prior_state() {
        let mut c = call("abc@host");
        let previous = c.transition(CallState::Ringing);
        assert_eq!(previous, CallState::Incoming);
        assert_eq!(c.state, CallState::Ringing);
        assert!(c.ended_at.is_none());
    }

    #[test]
    fn terminal_transition_stamps_ended_at() {
        let mut c = call("abc@host");
        c.transition(CallState::Established);
        c.transition(CallState::Terminated);
        assert!(c.ended_at.is_some());
    }

    #[test]
    fn at_most_one_call_per_call_id() {
        let mut table = CallTable::default();
        table.insert(call("abc@host"));
        table.insert(call("abc@host"));
        assert_eq!(table.len(), 1);
    }
}
