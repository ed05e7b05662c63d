pub mod client_invite;
pub mod client_noninvite;
pub mod key;
pub mod server_invite;
pub mod server_noninvite;
pub mod timer;

pub use client_invite::{ClientInviteState, ClientInviteTransaction};
pub use client_noninvite::{ClientNonInviteState, ClientNonInviteTransaction};
pub use key::TransactionKey;
pub use server_invite::{ServerInviteState, ServerInviteTransaction};
pub use server_noninvite::{ServerNonInviteState, ServerNonInviteTransaction};
pub use timer::TimerKind;

use crate::message::SipMessage;
use std::time::Duration;

/// A side effect produced by driving a transaction state machine.
///
/// These state machines are sans-I/O: driving them (on construction, on a
/// received message, or on a timer firing) never performs network or timer
/// I/O itself, and always runs a state transition to completion without
/// yielding. A driver (the user-agent's executor, owning a real transport
/// and `tokio::time`) interprets the returned actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send (or retransmit) a message over the transport.
    Send(SipMessage),
    /// (Re)schedule a timer to fire after the given duration.
    ScheduleTimer(TimerKind, Duration),
    /// Cancel a previously scheduled timer; a no-op if it already fired.
    CancelTimer(TimerKind),
    /// Deliver a response to the transaction user (client transactions only).
    Deliver(SipMessage),
    /// The transaction timed out without reaching a final response.
    TimedOut,
    /// The transaction has entered Terminated; the driver may drop all
    /// remaining state for it.
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}
