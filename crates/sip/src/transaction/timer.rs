use std::time::Duration;

/// RFC 3261 §17 timer identifiers.
///
/// A transaction owns up to seven logical timers (A, B, D, F, I, K, and a
/// retransmit-count watchdog) — the retransmit watchdog is folded into
/// each state machine's own retransmit counter rather than modeled as a
/// separate scheduled timer (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Client INVITE retransmit timer; doubles each firing, capped at 4s.
    A,
    /// Client INVITE absolute timeout.
    B,
    /// Client INVITE: time spent in Completed absorbing response
    /// retransmissions before Terminated.
    D,
    /// Client non-INVITE absolute timeout.
    F,
    /// Server INVITE: retransmit of the final (non-2xx) response.
    G,
    /// Server INVITE: absolute timeout while waiting for ACK.
    H,
    /// Server INVITE: time spent in Confirmed absorbing ACK
    /// retransmissions before Terminated.
    I,
}

pub const T1: Duration = Duration::from_millis(500);
pub const TIMER_A_CEILING: Duration = Duration::from_secs(4);
pub const TIMER_B: Duration = Duration::from_secs(32);
pub const TIMER_D: Duration = Duration::from_secs(32);
pub const TIMER_F: Duration = Duration::from_secs(32);
pub const TIMER_G_CEILING: Duration = Duration::from_secs(4);
pub const TIMER_H: Duration = Duration::from_secs(32);
pub const TIMER_I: Duration = Duration::from_secs(32);

/// Doubling retransmit interval, capped at `ceiling`.
pub fn backoff(attempt: u32, ceiling: Duration) -> Duration {
    let doubled = T1.saturating_mul(1u32 << attempt.min(16));
    doubled.min(ceiling)
}

/// Hard cap on retransmissions regardless of the absolute timer.
pub const MAX_RETRANSMITS: u32 = 10;
