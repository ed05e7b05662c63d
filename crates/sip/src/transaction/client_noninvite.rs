use crate::message::SipMessage;
use crate::transaction::timer::{self, TimerKind};
use crate::transaction::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientNonInviteState {
    Trying,
    Proceeding,
    Completed,
    Terminated,
}

/// RFC 3261 §17.1.2: client non-INVITE transaction (REGISTER, OPTIONS, BYE
/// sent by a UAC, ...). No ACK is ever generated here — that is an
/// INVITE-only concept.
pub struct ClientNonInviteTransaction {
    request: SipMessage,
    state: ClientNonInviteState,
    retransmit_count: u32,
}

impl ClientNonInviteTransaction {
    pub fn new(request: SipMessage) -> (Self, Vec<Action>) {
        let actions = vec![
            Action::Send(request.clone()),
            Action::ScheduleTimer(TimerKind::A, timer::T1),
            Action::ScheduleTimer(TimerKind::F, timer::TIMER_F),
        ];

        (
            Self {
                request,
                state: ClientNonInviteState::Trying,
                retransmit_count: 0,
            },
            actions,
        )
    }

    pub fn state(&self) -> ClientNonInviteState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ClientNonInviteState::Terminated
    }

    pub fn on_timer(&mut self, timer: TimerKind) -> Vec<Action> {
        match timer {
            TimerKind::A
                if matches!(
                    self.state,
                    ClientNonInviteState::Trying | ClientNonInviteState::Proceeding
                ) =>
            {
                self.retransmit_count += 1;

                if self.retransmit_count > timer::MAX_RETRANSMITS {
                    self.state = ClientNonInviteState::Terminated;
                    return vec![
                        Action::CancelTimer(TimerKind::F),
                        Action::TimedOut,
                        Action::Terminated,
                    ];
                }

                let interval = timer::backoff(self.retransmit_count, t2());

                vec![
                    Action::Send(self.request.clone()),
                    Action::ScheduleTimer(TimerKind::A, interval),
                ]
            }
            TimerKind::F
                if matches!(
                    self.state,
                    ClientNonInviteState::Trying | ClientNonInviteState::Proceeding
                ) =>
            {
                self.state = ClientNonInviteState::Terminated;
                vec![
                    Action::CancelTimer(TimerKind::A),
                    Action::TimedOut,
                    Action::Terminated,
                ]
            }
            TimerKind::D if self.state == ClientNonInviteState::Completed => {
                self.state = ClientNonInviteState::Terminated;
                vec![Action::Terminated]
            }
            _ => Vec::new(),
        }
    }

    pub fn on_response(&mut self, response: &SipMessage) -> Vec<Action> {
        match self.state {
            ClientNonInviteState::Trying | ClientNonInviteState::Proceeding => {
                if response.is_provisional_response() {
                    self.state = ClientNonInviteState::Proceeding;
                    return vec![Action::Deliver(response.clone())];
                }

                self.state = ClientNonInviteState::Completed;
                vec![
                    Action::CancelTimer(TimerKind::A),
                    Action::CancelTimer(TimerKind::F),
                    Action::Deliver(response.clone()),
                    Action::ScheduleTimer(TimerKind::D, timer::TIMER_D),
                ]
            }
            ClientNonInviteState::Completed | ClientNonInviteState::Terminated => Vec::new(),
        }
    }
}

/// T2 from RFC 3261 §17.1.2.2: the retransmit ceiling for non-INVITE
/// requests. The spec doesn't name it separately from the INVITE
/// transaction's 4s ceiling, so the two share a constant.
fn t2() -> std::time::Duration {
    timer::TIMER_G_CEILING
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    fn register() -> SipMessage {
        let mut req = SipMessage::new_request(Method::Register, "sip:example.com");
        req.set_header("Via", "SIP/2.0/UDP host;branch=z9hG4bK1");
        req.set_header("From", "<sip:alice@example.com>;tag=t1");
        req.set_header("To", "<sip:alice@example.com>");
        req.set_header("Call-ID", "abc@host");
        req.set_header("CSeq", "1 REGISTER");
        req.set_content_length();
        req
    }

    #[test]
    fn starts_in_trying_and_arms_timers() {
        let (tx, actions) = ClientNonInviteTransaction::new(register());
        assert_eq!(tx.state(), ClientNonInviteState::Trying);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ScheduleTimer(TimerKind::F, _))));
    }

    #[test]
    fn provisional_response_moves_to_proceeding() {
        let (mut tx, _) = ClientNonInviteTransaction::new(register());
        let response = SipMessage::new_response(100, "Trying");
        let actions = tx.on_response(&response);
        assert_eq!(tx.state(), ClientNonInviteState::Proceeding);
        assert!(actions.contains(&Action::Deliver(response)));
    }

    #[test]
    fn final_response_moves_to_completed_and_arms_timer_d() {
        let (mut tx, _) = ClientNonInviteTransaction::new(register());
        let response = SipMessage::new_response(200, "OK");
        let actions = tx.on_response(&response);
        assert_eq!(tx.state(), ClientNonInviteState::Completed);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ScheduleTimer(TimerKind::D, _))));
    }

    #[test]
    fn timer_d_terminates_from_completed() {
        let (mut tx, _) = ClientNonInviteTransaction::new(register());
        tx.on_response(&SipMessage::new_response(200, "OK"));
        let actions = tx.on_timer(TimerKind::D);
        assert_eq!(tx.state(), ClientNonInviteState::Terminated);
        assert!(actions.contains(&Action::Terminated));
    }

    #[test]
    fn timer_f_times_out_from_trying() {
        let (mut tx, _) = ClientNonInviteTransaction::new(register());
        let actions = tx.on_timer(TimerKind::F);
        assert_eq!(tx.state(), ClientNonInviteState::Terminated);
        assert!(actions.contains(&Action::TimedOut));
    }
}
