use crate::message::SipMessage;
use crate::method::Method;
use crate::transaction::timer::{self, TimerKind};
use crate::transaction::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientInviteState {
    Calling,
    Proceeding,
    Completed,
    Terminated,
}

/// RFC 3261 §17.1.1: client INVITE transaction.
///
/// `Calling -> Proceeding -> {Completed, Terminated}`, with a 2xx final
/// response short-circuiting straight to Terminated.
pub struct ClientInviteTransaction {
    request: SipMessage,
    state: ClientInviteState,
    retransmit_count: u32,
    /// The ACK synthesized for a non-2xx final response, resent verbatim
    /// if the response is retransmitted while Completed. The transaction
    /// layer, not the transaction user, owns this ACK.
    pending_ack: Option<SipMessage>,
}

impl ClientInviteTransaction {
    /// Start the transaction by sending `request` (which must already carry
    /// a Via branch).
    pub fn new(request: SipMessage) -> (Self, Vec<Action>) {
        let actions = vec![
            Action::Send(request.clone()),
            Action::ScheduleTimer(TimerKind::A, timer::T1),
            Action::ScheduleTimer(TimerKind::B, timer::TIMER_B),
        ];

        (
            Self {
                request,
                state: ClientInviteState::Calling,
                retransmit_count: 0,
                pending_ack: None,
            },
            actions,
        )
    }

    pub fn state(&self) -> ClientInviteState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ClientInviteState::Terminated
    }

    pub fn on_timer(&mut self, timer: TimerKind) -> Vec<Action> {
        match timer {
            TimerKind::A if self.state == ClientInviteState::Calling => {
                self.retransmit_count += 1;

                if self.retransmit_count > timer::MAX_RETRANSMITS {
                    self.state = ClientInviteState::Terminated;
                    return vec![
                        Action::CancelTimer(TimerKind::B),
                        Action::TimedOut,
                        Action::Terminated,
                    ];
                }

                let interval = timer::backoff(self.retransmit_count, timer::TIMER_A_CEILING);
                vec![
                    Action::Send(self.request.clone()),
                    Action::ScheduleTimer(TimerKind::A, interval),
                ]
            }
            TimerKind::B
                if matches!(
                    self.state,
                    ClientInviteState::Calling | ClientInviteState::Proceeding
                ) =>
            {
                self.state = ClientInviteState::Terminated;
                vec![
                    Action::CancelTimer(TimerKind::A),
                    Action::TimedOut,
                    Action::Terminated,
                ]
            }
            TimerKind::D if self.state == ClientInviteState::Completed => {
                self.state = ClientInviteState::Terminated;
                vec![Action::Terminated]
            }
            _ => Vec::new(),
        }
    }

    pub fn on_response(&mut self, response: &SipMessage) -> Vec<Action> {
        match self.state {
            ClientInviteState::Calling | ClientInviteState::Proceeding => {
                if response.is_provisional_response() {
                    let mut actions = Vec::new();
                    if self.state == ClientInviteState::Calling {
                        actions.push(Action::CancelTimer(TimerKind::A));
                    }
                    self.state = ClientInviteState::Proceeding;
                    actions.push(Action::Deliver(response.clone()));
                    return actions;
                }

                if let Some(code) = response.status_code() {
                    if code < 300 {
                        self.state = ClientInviteState::Terminated;
                        return vec![
                            Action::CancelTimer(TimerKind::A),
                            Action::CancelTimer(TimerKind::B),
                            Action::Deliver(response.clone()),
                            Action::Terminated,
                        ];
                    }

                    let ack = build_ack(&self.request, response);
                    self.pending_ack = Some(ack.clone());
                    self.state = ClientInviteState::Completed;

                    return vec![
                        Action::CancelTimer(TimerKind::A),
                        Action::CancelTimer(TimerKind::B),
                        Action::Send(ack),
                        Action::Deliver(response.clone()),
                        Action::ScheduleTimer(TimerKind::D, timer::TIMER_D),
                    ];
                }

                Vec::new()
            }
            ClientInviteState::Completed => {
                // Retransmissions of the non-2xx final response re-trigger
                // the ACK but are never passed to the transaction user.
                if response.status_code().is_some_and(|c| c >= 300) {
                    if let Some(ack) = &self.pending_ack {
                        return vec![Action::Send(ack.clone())];
                    }
                }
                Vec::new()
            }
            ClientInviteState::Terminated => Vec::new(),
        }
    }
}

fn build_ack(request: &SipMessage, response: &SipMessage) -> SipMessage {
    let request_uri = request.request_uri().unwrap_or_default().to_string();
    let mut ack = SipMessage::new_request(Method::Ack, request_uri);

    if let Some(via) = request.header("via") {
        ack.set_header("Via", via);
    }
    if let Some(from) = request.header("from") {
        ack.set_header("From", from);
    }
    if let Some(to) = response.header("to") {
        ack.set_header("To", to);
    }
    if let Some(call_id) = request.header("call-id") {
        ack.set_header("Call-ID", call_id);
    }
    if let Some(cseq) = request.cseq() {
        ack.set_header("CSeq", format!("{} ACK", cseq.sequence));
    }

    ack.set_content_length();
    ack
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite() -> SipMessage {
        let mut req = SipMessage::new_request(Method::Invite, "sip:bob@example.com");
        req.set_header("Via", "SIP/2.0/UDP host;branch=z9hG4bK1");
        req.set_header("From", "<sip:alice@example.com>;tag=t1");
        req.set_header("To", "<sip:bob@example.com>");
        req.set_header("Call-ID", "abc@host");
        req.set_header("CSeq", "1 INVITE");
        req.set_content_length();
        req
    }

    #[test]
    fn starts_in_calling_and_sends_plus_arms_timers() {
        let (tx, actions) = ClientInviteTransaction::new(invite());
        assert_eq!(tx.state(), ClientInviteState::Calling);
        assert!(matches!(actions[0], Action::Send(_)));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ScheduleTimer(TimerKind::A, _))));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ScheduleTimer(TimerKind::B, _))));
    }

    #[test]
    fn provisional_response_moves_to_proceeding_and_cancels_timer_a() {
        let (mut tx, _) = ClientInviteTransaction::new(invite());
        let mut response = SipMessage::new_response(180, "Ringing");
        response.set_header("Call-ID", "abc@host");
        response.set_header("CSeq", "1 INVITE");

        let actions = tx.on_response(&response);
        assert_eq!(tx.state(), ClientInviteState::Proceeding);
        assert!(actions.contains(&Action::CancelTimer(TimerKind::A)));
        assert!(actions.contains(&Action::Deliver(response)));
    }

    #[test]
    fn success_response_short_circuits_to_terminated() {
        let (mut tx, _) = ClientInviteTransaction::new(invite());
        let response = SipMessage::new_response(200, "OK");

        let actions = tx.on_response(&response);
        assert_eq!(tx.state(), ClientInviteState::Terminated);
        assert!(actions.contains(&Action::Terminated));
        assert!(!actions.iter().any(|a| matches!(a, Action::Send(_))));
    }

    #[test]
    fn failure_response_synthesizes_ack_and_waits_in_completed() {
        let (mut tx, _) = ClientInviteTransaction::new(invite());
        let mut response = SipMessage::new_response(486, "Busy Here");
        response.set_header("To", "<sip:bob@example.com>;tag=t2");

        let actions = tx.on_response(&response);
        assert_eq!(tx.state(), ClientInviteState::Completed);

        let ack_sent = actions.iter().any(|a| match a {
            Action::Send(msg) => msg.method() == Some(&Method::Ack),
            _ => false,
        });
        assert!(ack_sent);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ScheduleTimer(TimerKind::D, _))));
    }

    #[test]
    fn retransmitted_failure_response_resends_ack_without_redelivery() {
        let (mut tx, _) = ClientInviteTransaction::new(invite());
        let mut response = SipMessage::new_response(486, "Busy Here");
        response.set_header("To", "<sip:bob@example.com>;tag=t2");
        tx.on_response(&response);

        let actions = tx.on_response(&response);
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], Action::Send(msg) if msg.method() == Some(&Method::Ack)));
    }

    #[test]
    fn timer_a_retransmits_with_backoff_and_timer_b_times_out() {
        let (mut tx, _) = ClientInviteTransaction::new(invite());
        let actions = tx.on_timer(TimerKind::A);
        assert!(matches!(actions[0], Action::Send(_)));

        let actions = tx.on_timer(TimerKind::B);
        assert_eq!(tx.state(), ClientInviteState::Terminated);
        assert!(actions.contains(&Action::TimedOut));
    }

    #[test]
    fn exceeding_max_retransmits_terminates_even_before_timer_b() {
        let (mut tx, _) = ClientInviteTransaction::new(invite());
        for _ in 0..timer::MAX_RETRANSMITS {
            tx.on_timer(TimerKind::A);
        }
        assert_eq!(tx.state(), ClientInviteState::Calling);

        let actions = tx.on_timer(TimerKind::A);
        assert_eq!(tx.state(), ClientInviteState::Terminated);
        assert!(actions.contains(&Action::TimedOut));
    }

    #[test]
    fn terminated_transaction_ignores_further_timers_and_responses() {
        let (mut tx, _) = ClientInviteTransaction::new(invite());
        tx.on_response(&SipMessage::new_response(200, "OK"));
        assert!(tx.is_terminated());

        assert!(tx.on_timer(TimerKind::A).is_empty());
        assert!(tx.on_response(&SipMessage::new_response(486, "Busy Here")).is_empty());
    }
}
