//! A sans-I/O SIP message codec and transaction layer (RFC 3261).
//!
//! This crate parses and serializes SIP messages and drives the four
//! RFC 3261 §17 transaction state machines. It performs no network or
//! timer I/O itself: every public state machine method takes the
//! triggering event (a received message, a fired timer) and returns a
//! `Vec<transaction::Action>` describing what the caller must do next
//! (send bytes, arm a timer, deliver a message up to the application).
//! A driver built on a real transport and an async runtime interprets
//! those actions.

pub mod branch;
pub mod error;
pub mod message;
pub mod method;
pub mod transaction;

pub use error::{Error, Result};
pub use message::{CSeq, Headers, SipMessage, StartLine, VERSION};
pub use method::Method;
pub use transaction::{Action, Role, TransactionKey};
