use crate::message::SipMessage;
use crate::transaction::timer::{self, TimerKind};
use crate::transaction::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerNonInviteState {
    Trying,
    Proceeding,
    Completed,
    Terminated,
}

/// RFC 3261 §17.2.2: server non-INVITE transaction (REGISTER, OPTIONS,
/// BYE received by a UAS, ...).
pub struct ServerNonInviteTransaction {
    state: ServerNonInviteState,
    last_response: Option<SipMessage>,
}

impl ServerNonInviteTransaction {
    pub fn new(request: SipMessage) -> (Self, Vec<Action>) {
        (
            Self {
                state: ServerNonInviteState::Trying,
                last_response: None,
            },
            vec![Action::Deliver(request)],
        )
    }

    pub fn state(&self) -> ServerNonInviteState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ServerNonInviteState::Terminated
    }

    pub fn on_response(&mut self, response: SipMessage) -> Vec<Action> {
        match self.state {
            ServerNonInviteState::Trying | ServerNonInviteState::Proceeding => {
                if response.is_provisional_response() {
                    self.state = ServerNonInviteState::Proceeding;
                    return vec![Action::Send(response)];
                }

                self.last_response = Some(response.clone());
                self.state = ServerNonInviteState::Completed;
                vec![Action::Send(response), Action::ScheduleTimer(TimerKind::F, timer::TIMER_F)]
            }
            ServerNonInviteState::Completed | ServerNonInviteState::Terminated => Vec::new(),
        }
    }

    /// A retransmitted request while Proceeding or Completed gets the last
    /// sent response resent verbatim (no response yet while Trying: the
    /// retransmission is simply dropped).
    pub fn on_request_retransmit(&mut self) -> Vec<Action> {
        match self.state {
            ServerNonInviteState::Proceeding | ServerNonInviteState::Completed => self
                .last_response
                .clone()
                .map(|resp| vec![Action::Send(resp)])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn on_timer(&mut self, timer: TimerKind) -> Vec<Action> {
        match timer {
            TimerKind::F if self.state == ServerNonInviteState::Completed => {
                self.state = ServerNonInviteState::Terminated;
                vec![Action::Terminated]
            }
            _ => Vec::new(),
        }
    }
}
