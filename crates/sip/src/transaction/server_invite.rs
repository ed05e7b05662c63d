use crate::message::SipMessage;
use crate::method::Method;
use crate::transaction::timer::{self, TimerKind};
use crate::transaction::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerInviteState {
    Proceeding,
    Completed,
    Confirmed,
    Terminated,
}

/// RFC 3261 §17.2.1: server INVITE transaction.
///
/// `Proceeding -> Completed -> Confirmed -> Terminated`, or straight from
/// Proceeding to Terminated on a 2xx final response (2xx retransmission
/// is then the transaction user's job, not this state machine's — §17.2.1
/// leaves the INVITE transaction once a 2xx is sent).
pub struct ServerInviteTransaction {
    request: SipMessage,
    state: ServerInviteState,
    last_response: Option<SipMessage>,
    retransmit_count: u32,
}

impl ServerInviteTransaction {
    /// A server transaction is created once the request has already
    /// arrived; this yields the 100 Trying the transaction layer owes the
    /// transport per §17.2.1, plus the request delivered up to the
    /// transaction user.
    pub fn new(request: SipMessage) -> (Self, Vec<Action>) {
        let trying = SipMessage::new_response(100, "Trying");
        let actions = vec![Action::Send(trying), Action::Deliver(request.clone())];

        (
            Self {
                request,
                state: ServerInviteState::Proceeding,
                last_response: None,
                retransmit_count: 0,
            },
            actions,
        )
    }

    pub fn state(&self) -> ServerInviteState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ServerInviteState::Terminated
    }

    /// The transaction user hands the transaction its response to send.
    pub fn on_response(&mut self, response: SipMessage) -> Vec<Action> {
        match self.state {
            ServerInviteState::Proceeding => {
                if response.is_provisional_response() {
                    return vec![Action::Send(response)];
                }

                if let Some(code) = response.status_code() {
                    if code < 300 {
                        self.state = ServerInviteState::Terminated;
                        return vec![Action::Send(response), Action::Terminated];
                    }

                    self.last_response = Some(response.clone());
                    self.state = ServerInviteState::Completed;
                    return vec![
                        Action::Send(response),
                        Action::ScheduleTimer(TimerKind::G, timer::T1),
                        Action::ScheduleTimer(TimerKind::H, timer::TIMER_H),
                    ];
                }

                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// A retransmitted INVITE (request retransmission while Proceeding or
    /// Completed) gets the last response resent verbatim.
    pub fn on_request_retransmit(&mut self, request: &SipMessage) -> Vec<Action> {
        if request.method() != Some(&Method::Invite) {
            return Vec::new();
        }

        match self.state {
            ServerInviteState::Completed => self
                .last_response
                .clone()
                .map(|resp| vec![Action::Send(resp)])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// An ACK for this transaction's final response arrived.
    pub fn on_ack(&mut self) -> Vec<Action> {
        match self.state {
            ServerInviteState::Completed => {
                self.state = ServerInviteState::Confirmed;
                vec![
                    Action::CancelTimer(TimerKind::G),
                    Action::CancelTimer(TimerKind::H),
                    Action::ScheduleTimer(TimerKind::I, timer::TIMER_I),
                ]
            }
            _ => Vec::new(),
        }
    }

    pub fn on_timer(&mut self, timer: TimerKind) -> Vec<Action> {
        match timer {
            TimerKind::G if self.state == ServerInviteState::Completed => {
                self.retransmit_count += 1;

                if self.retransmit_count > timer::MAX_RETRANSMITS {
                    self.state = ServerInviteState::Terminated;
                    return vec![
                        Action::CancelTimer(TimerKind::H),
                        Action::TimedOut,
                        Action::Terminated,
                    ];
                }

                let interval = timer::backoff(self.retransmit_count, timer::TIMER_G_CEILING);
                let resend = self
                    .last_response
                    .clone()
                    .map(Action::Send)
                    .into_iter()
                    .chain([Action::ScheduleTimer(TimerKind::G, interval)]);
                resend.collect()
            }
            TimerKind::H if self.state == ServerInviteState::Completed => {
                self.state = ServerInviteState::Terminated;
                vec![
                    Action::CancelTimer(TimerKind::G),
                    Action::TimedOut,
                    Action::Terminated,
                ]
            }
            TimerKind::I if self.state == ServerInviteState::Confirmed => {
                self.state = ServerInviteState::Terminated;
                vec![Action::Terminated]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite() -> SipMessage {
        let mut req = SipMessage::new_request(Method::Invite, "sip:bob@example.com");
        req.set_header("Via", "SIP/2.0/UDP host;branch=z9hG4bK1");
        req.set_header("Call-ID", "abc@host");
        req.set_header("CSeq", "1 INVITE");
        req
    }

    #[test]
    fn construction_sends_trying_and_delivers_request() {
        let (tx, actions) = ServerInviteTransaction::new(invite());
        assert_eq!(tx.state(), ServerInviteState::Proceeding);
        assert!(actions.iter().any(|a| matches!(a, Action::Send(resp) if resp.status_code() == Some(100))));
        assert!(actions.iter().any(|a| matches!(a, Action::Deliver(_))));
    }

    #[test]
    fn success_response_terminates_immediately() {
        let (mut tx, _) = ServerInviteTransaction::new(invite());
        let actions = tx.on_response(SipMessage::new_response(200, "OK"));
        assert_eq!(tx.state(), ServerInviteState::Terminated);
        assert!(actions.contains(&Action::Terminated));
    }

    #[test]
    fn failure_response_arms_g_and_h_and_waits_for_ack() {
        let (mut tx, _) = ServerInviteTransaction::new(invite());
        let actions = tx.on_response(SipMessage::new_response(486, "Busy Here"));
        assert_eq!(tx.state(), ServerInviteState::Completed);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ScheduleTimer(TimerKind::G, _))));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ScheduleTimer(TimerKind::H, _))));

        let actions = tx.on_ack();
        assert_eq!(tx.state(), ServerInviteState::Confirmed);
        assert!(actions.contains(&Action::CancelTimer(TimerKind::G)));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ScheduleTimer(TimerKind::I, _))));
    }

    #[test]
    fn timer_i_terminates_from_confirmed() {
        let (mut tx, _) = ServerInviteTransaction::new(invite());
        tx.on_response(SipMessage::new_response(486, "Busy Here"));
        tx.on_ack();
        let actions = tx.on_timer(TimerKind::I);
        assert_eq!(tx.state(), ServerInviteState::Terminated);
        assert!(actions.contains(&Action::Terminated));
    }

    #[test]
    fn timer_h_times_out_waiting_for_ack() {
        let (mut tx, _) = ServerInviteTransaction::new(invite());
        tx.on_response(SipMessage::new_response(486, "Busy Here"));
        let actions = tx.on_timer(TimerKind::H);
        assert_eq!(tx.state(), ServerInviteState::Terminated);
        assert!(actions.contains(&Action::TimedOut));
    }

    #[test]
    fn retransmitted_invite_resends_last_response_while_completed() {
        let (mut tx, _) = ServerInviteTransaction::new(invite());
        tx.on_response(SipMessage::new_response(486, "Busy Here"));
        let actions = tx.on_request_retransmit(&invite());
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], Action::Send(resp) if resp.status_code() == Some(486)));
    }
}
