//! User-agent dispatch: owns the transaction index and the call and
//! registration tables, and drives the `sip` crate's sans-I/O transaction
//! state machines against a [`Transport`].
//!
//! All of this runs on one logical executor: a single `tokio::task`
//! processes transport events, fired timers, and ring-completion events off
//! one channel, strictly in arrival order. Timers themselves are armed with
//! `tokio::time::sleep` tasks that only ever feed an event back into that
//! channel — they never touch transaction state directly, so there is
//! never more than one mutable borrow of the user-agent's state at a time.

pub mod dialog;
pub mod registrar;
pub mod stats;

pub use dialog::{Call, CallState, CallTable};
pub use registrar::{Registrar, Registration};
pub use stats::Stats;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::{HashMap, HashMapExt};
use rand::Rng;
use tokio::sync::mpsc;

use rtp::{JitterConfig, PayloadType, RtpSession};
use sip::transaction::{
    ClientInviteTransaction, ClientNonInviteTransaction, ServerInviteTransaction,
    ServerNonInviteTransaction, TimerKind,
};
use sip::{Action, Method, SipMessage, TransactionKey};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sdp;
use crate::transport::{Event as TransportEvent, Transport};

use self::stats::Counters;

enum UaEvent {
    Sip(Vec<u8>, SocketAddr),
    Rtp(Vec<u8>, SocketAddr),
    Transport(anyhow::Error),
    Timer(TransactionKey, TimerKind, u64),
    Ring(String),
}

/// Which dialog (if any) a client non-INVITE transaction is acting for, so
/// its eventual final response can be applied back to the right thing —
/// REGISTER has no call at all, BYE tears one down.
enum ClientNonInvitePurpose {
    Register,
    Bye { call_id: String },
}

/// The SIP user-agent and minimal registrar-proxy: a single struct
/// owning every piece of the dispatcher's mutable state, driven
/// entirely through [`UserAgent::run`].
pub struct UserAgent<T: Transport> {
    config: Arc<Config>,
    transport: Arc<T>,
    local_user: String,

    registrar: Registrar,
    calls: CallTable,

    client_invite: HashMap<TransactionKey, ClientInviteTransaction>,
    client_non_invite: HashMap<TransactionKey, ClientNonInviteTransaction>,
    server_invite: HashMap<TransactionKey, ServerInviteTransaction>,
    server_non_invite: HashMap<TransactionKey, ServerNonInviteTransaction>,

    /// The address each live transaction sends to — the transaction state
    /// machines are sans-I/O and never see a `SocketAddr` themselves.
    remotes: HashMap<TransactionKey, SocketAddr>,
    /// Generation counter per (transaction, timer kind): a fired timer
    /// whose epoch no longer matches was cancelled or superseded and is
    /// dropped rather than acted on.
    timer_epochs: HashMap<(TransactionKey, TimerKind), u64>,

    pending_ring_requests: HashMap<String, (SipMessage, String)>,
    pending_client_invites: HashMap<TransactionKey, String>,
    pending_client_invite_requests: HashMap<TransactionKey, SipMessage>,
    client_non_invite_purpose: HashMap<TransactionKey, ClientNonInvitePurpose>,

    /// Maps the remote address a call's RTP session expects inbound
    /// packets from back to that call. SDP offer/answer negotiation is out
    /// of scope, so the signaling peer's IP combined
    /// with the locally chosen RTP port stands in for a negotiated remote
    /// media address.
    rtp_index: HashMap<SocketAddr, String>,

    counters: Counters,
    cseq_counter: u32,
    self_registered: bool,

    events_tx: mpsc::UnboundedSender<UaEvent>,
    events_rx: mpsc::UnboundedReceiver<UaEvent>,
}

impl<T: Transport> UserAgent<T> {
    pub fn new(config: Arc<Config>, transport: Arc<T>, local_user: String) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            transport,
            local_user,
            registrar: Registrar::default(),
            calls: CallTable::default(),
            client_invite: HashMap::new(),
            client_non_invite: HashMap::new(),
            server_invite: HashMap::new(),
            server_non_invite: HashMap::new(),
            remotes: HashMap::new(),
            timer_epochs: HashMap::new(),
            pending_ring_requests: HashMap::new(),
            pending_client_invites: HashMap::new(),
            pending_client_invite_requests: HashMap::new(),
            client_non_invite_purpose: HashMap::new(),
            rtp_index: HashMap::new(),
            counters: Counters::default(),
            cseq_counter: 1,
            self_registered: false,
            events_tx,
            events_rx,
        }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            calls_received: self.counters.calls_received,
            calls_completed: self.counters.calls_completed,
            calls_failed: self.counters.calls_failed,
            active_calls: self.calls.len(),
            registered_users: self.registrar.len(),
        }
    }

    pub fn registered_users(&self) -> Vec<String> {
        self.registrar.users()
    }

    pub fn active_calls(&self) -> Vec<String> {
        self.calls.call_ids()
    }

    pub fn is_self_registered(&self) -> bool {
        self.self_registered
    }

    /// Bind the transport and process events until the transport's channel
    /// closes. Never returns in ordinary operation.
    pub async fn run(mut self) -> Result<()> {
        let mut inbound = self.transport.bind().await.map_err(Error::Transport)?;
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                let mapped = match event {
                    TransportEvent::SipInbound(bytes, remote) => UaEvent::Sip(bytes, remote),
                    TransportEvent::RtpInbound(bytes, remote) => UaEvent::Rtp(bytes, remote),
                    TransportEvent::TransportError(err) => UaEvent::Transport(err),
                };

                if events_tx.send(mapped).is_err() {
                    break;
                }
            }
        });

        while let Some(event) = self.events_rx.recv().await {
            self.handle_event(event).await;
        }

        Ok(())
    }

    async fn handle_event(&mut self, event: UaEvent) {
        match event {
            UaEvent::Sip(bytes, remote) => self.on_sip_datagram(bytes, remote).await,
            UaEvent::Rtp(bytes, remote) => self.on_rtp_datagram(bytes, remote),
            UaEvent::Transport(err) => log::warn!("transport error: {err}"),
            UaEvent::Timer(key, kind, epoch) => self.on_timer(key, kind, epoch).await,
            UaEvent::Ring(call_id) => self.on_ring_complete(call_id).await,
        }
    }

    // ---- outbound, UAC role ------------------------------------------

    /// REGISTER this agent with a remote registrar.
    pub async fn register(&mut self, registrar: SocketAddr, contact: &str) -> Result<()> {
        let branch = sip::branch::generate();
        let local_uri = format!("sip:{}@{}", self.local_user, self.config.local_ip);

        let mut request = SipMessage::new_request(Method::Register, format!("sip:{registrar}"));
        request.set_header(
            "Via",
            format!("SIP/2.0/UDP {}:{};branch={branch}", self.config.local_ip, self.config.sip_port),
        );
        request.set_header("From", format!("<{local_uri}>;tag={}", generate_token()));
        request.set_header("To", format!("<{local_uri}>"));
        request.set_header("Call-ID", format!("{}@{}", generate_token(), self.config.local_ip));
        request.set_header("CSeq", format!("{} REGISTER", self.next_cseq()));
        request.set_header("Contact", contact);
        request.set_header("Expires", self.config.registration_expires_secs.to_string());
        request.set_content_length();

        let key = TransactionKey::from_message(&request)
            .expect("a locally built request always carries a transaction key");
        self.client_non_invite_purpose
            .insert(key.clone(), ClientNonInvitePurpose::Register);

        let (tx, actions) = ClientNonInviteTransaction::new(request);
        self.run_client_non_invite(key, tx, actions, registrar).await;
        Ok(())
    }

    /// Place an outbound call to `to_user` at `remote`. Returns the new
    /// call's Call-ID.
    pub async fn invite(&mut self, remote: SocketAddr, to_user: &str) -> Result<String> {
        let call_id = format!("{}@{}", generate_token(), self.config.local_ip);
        let from_tag = generate_token();
        let branch = sip::branch::generate();

        let mut request = SipMessage::new_request(Method::Invite, format!("sip:{to_user}@{remote}"));
        request.set_header(
            "Via",
            format!("SIP/2.0/UDP {}:{};branch={branch}", self.config.local_ip, self.config.sip_port),
        );
        request.set_header(
            "From",
            format!("<sip:{}@{}>;tag={from_tag}", self.local_user, self.config.local_ip),
        );
        request.set_header("To", format!("<sip:{to_user}@{remote}>"));
        request.set_header("Call-ID", call_id.clone());
        request.set_header("CSeq", format!("{} INVITE", self.next_cseq()));
        request.set_content_length();

        let key = TransactionKey::from_message(&request)
            .expect("a locally built request always carries a transaction key");

        self.calls.insert(Call {
            call_id: call_id.clone(),
            local_user: self.local_user.clone(),
            remote_user: to_user.to_string(),
            from_tag,
            to_tag: None,
            local_cseq: 1,
            remote_cseq: 0,
            state: CallState::Calling,
            started_at: Instant::now(),
            ended_at: None,
            remote_sip: remote,
            invite_key: Some(key.clone()),
            rtp_port: 0,
            rtp: None,
        });

        self.pending_client_invites.insert(key.clone(), call_id.clone());
        self.pending_client_invite_requests.insert(key.clone(), request.clone());

        let (tx, actions) = ClientInviteTransaction::new(request);
        self.run_client_invite(key, tx, actions, remote).await;
        Ok(call_id)
    }

    /// Hang up a call this agent placed or answered.
    pub async fn bye(&mut self, call_id: &str) -> Result<()> {
        let Some(call) = self.calls.get(call_id) else {
            return Err(Error::BadRequest("no such call"));
        };
        let remote = call.remote_sip;
        let to_tag = call.to_tag.clone().unwrap_or_default();
        let from_tag = call.from_tag.clone();
        let remote_user = call.remote_user.clone();
        let local_user = call.local_user.clone();

        let branch = sip::branch::generate();
        let mut request = SipMessage::new_request(Method::Bye, format!("sip:{remote_user}@{remote}"));
        request.set_header(
            "Via",
            format!("SIP/2.0/UDP {}:{};branch={branch}", self.config.local_ip, self.config.sip_port),
        );
        request.set_header(
            "From",
            format!("<sip:{local_user}@{}>;tag={from_tag}", self.config.local_ip),
        );
        request.set_header("To", format!("<sip:{remote_user}@{remote}>;tag={to_tag}"));
        request.set_header("Call-ID", call_id);
        request.set_header("CSeq", format!("{} BYE", self.next_cseq()));
        request.set_content_length();

        let key = TransactionKey::from_message(&request)
            .expect("a locally built request always carries a transaction key");
        self.client_non_invite_purpose.insert(
            key.clone(),
            ClientNonInvitePurpose::Bye { call_id: call_id.to_string() },
        );

        let (tx, actions) = ClientNonInviteTransaction::new(request);
        self.run_client_non_invite(key, tx, actions, remote).await;
        Ok(())
    }

    fn next_cseq(&mut self) -> u32 {
        let cseq = self.cseq_counter;
        self.cseq_counter += 1;
        cseq
    }

    // ---- inbound datagrams --------------------------------------------

    async fn on_sip_datagram(&mut self, bytes: Vec<u8>, remote: SocketAddr) {
        let message = match SipMessage::parse(&bytes) {
            Ok(message) => message,
            Err(err) => {
                log::debug!("dropping malformed SIP datagram from {remote}: {err}");
                return;
            }
        };

        if message.is_request() {
            self.on_request(message, remote).await;
        } else {
            self.on_response(message, remote).await;
        }
    }

    fn on_rtp_datagram(&mut self, bytes: Vec<u8>, remote: SocketAddr) {
        let Some(call_id) = self.rtp_index.get(&remote).cloned() else {
            log::debug!("dropping RTP packet from unrecognized remote {remote}");
            return;
        };

        if let Some(call) = self.calls.get_mut(&call_id) {
            if let Some(session) = call.rtp.as_mut() {
                session.receive_packet(&bytes, Instant::now());
            }
        }
    }

    // ---- inbound requests ----------------------------------------------

    async fn on_request(&mut self, request: SipMessage, remote: SocketAddr) {
        let Some(key) = TransactionKey::from_message(&request) else {
            log::debug!("dropping request with no transaction key");
            return;
        };

        if request.method() == Some(&Method::Ack) {
            self.on_ack(request, &key, remote).await;
            return;
        }

        if request.method().is_some_and(Method::is_invite) {
            if let Some(mut tx) = self.server_invite.remove(&key) {
                let actions = tx.on_request_retransmit(&request);
                self.run_server_invite(key, tx, actions, remote).await;
            } else {
                let (tx, actions) = ServerInviteTransaction::new(request);
                self.run_server_invite(key, tx, actions, remote).await;
            }
            return;
        }

        if let Some(mut tx) = self.server_non_invite.remove(&key) {
            let actions = tx.on_request_retransmit();
            self.run_server_non_invite(key, tx, actions, remote).await;
        } else {
            let (tx, actions) = ServerNonInviteTransaction::new(request);
            self.run_server_non_invite(key, tx, actions, remote).await;
        }
    }

    async fn on_ack(&mut self, ack: SipMessage, key: &TransactionKey, remote: SocketAddr) {
        // An ACK to a non-2xx final response shares the INVITE's branch
        // and is matched at the transaction layer.
        if let Some(mut tx) = self.server_invite.remove(key) {
            let actions = tx.on_ack();
            if !self.apply_transaction_actions(key, actions, remote).await {
                self.server_invite.insert(key.clone(), tx);
            }
            return;
        }

        // An ACK to a 2xx response carries its own branch (RFC 3261
        // §13.2.2.4) and is routed to the dialog directly by Call-ID.
        let Some(call_id) = ack.call_id().map(str::to_string) else {
            return;
        };

        let rtp_remote = self.calls.get(&call_id).map(|call| SocketAddr::new(remote.ip(), call.rtp_port));

        if let Some(call) = self.calls.get_mut(&call_id) {
            if matches!(call.state, CallState::Incoming | CallState::Ringing) {
                call.transition(CallState::Established);
                let ssrc: u32 = rand::random();
                call.rtp = Some(RtpSession::new(ssrc, PayloadType::Pcmu, self.jitter_config()));
                if let Some(rtp_remote) = rtp_remote {
                    self.rtp_index.insert(rtp_remote, call_id.clone());
                }
                log::info!("call {call_id} established");
            }
        }
    }

    async fn run_server_invite(
        &mut self,
        key: TransactionKey,
        mut tx: ServerInviteTransaction,
        actions: Vec<Action>,
        remote: SocketAddr,
    ) {
        let mut request_to_handle = None;

        for action in actions {
            match action {
                Action::Send(msg) => self.send_sip(&msg, remote).await,
                Action::Deliver(request) => request_to_handle = Some(request),
                Action::ScheduleTimer(kind, duration) => self.schedule_timer(key.clone(), kind, duration),
                Action::CancelTimer(kind) => self.cancel_timer(&key, kind),
                Action::TimedOut => log::debug!("server invite transaction timed out: {key:?}"),
                Action::Terminated => {
                    self.remotes.remove(&key);
                    return;
                }
            }
        }

        if let Some(request) = request_to_handle {
            let response = self.handle_invite_request(&request, remote, &key);
            let followup = tx.on_response(response);

            if self.apply_transaction_actions(&key, followup, remote).await {
                return;
            }
        }

        self.remotes.insert(key.clone(), remote);
        self.server_invite.insert(key, tx);
    }

    async fn run_server_non_invite(
        &mut self,
        key: TransactionKey,
        mut tx: ServerNonInviteTransaction,
        actions: Vec<Action>,
        remote: SocketAddr,
    ) {
        let mut request_to_handle = None;

        for action in actions {
            match action {
                Action::Deliver(request) => request_to_handle = Some(request),
                Action::Send(msg) => self.send_sip(&msg, remote).await,
                Action::ScheduleTimer(kind, duration) => self.schedule_timer(key.clone(), kind, duration),
                Action::CancelTimer(kind) => self.cancel_timer(&key, kind),
                Action::TimedOut => {}
                Action::Terminated => {
                    self.remotes.remove(&key);
                    return;
                }
            }
        }

        if let Some(request) = request_to_handle {
            let response = self.handle_non_invite_request(&request, remote);
            let followup = tx.on_response(response);

            if self.apply_transaction_actions(&key, followup, remote).await {
                return;
            }
        }

        self.remotes.insert(key.clone(), remote);
        self.server_non_invite.insert(key, tx);
    }

    async fn run_client_invite(
        &mut self,
        key: TransactionKey,
        tx: ClientInviteTransaction,
        actions: Vec<Action>,
        remote: SocketAddr,
    ) {
        let mut terminated = false;

        for action in &actions {
            if let Action::Send(msg) = action {
                self.send_sip(msg, remote).await;
            }
        }

        for action in actions {
            match action {
                Action::Send(_) => {}
                Action::Deliver(response) => self.handle_invite_client_response(&key, response).await,
                Action::ScheduleTimer(kind, duration) => self.schedule_timer(key.clone(), kind, duration),
                Action::CancelTimer(kind) => self.cancel_timer(&key, kind),
                Action::TimedOut => self.handle_client_invite_timeout(&key),
                Action::Terminated => {
                    self.remotes.remove(&key);
                    terminated = true;
                }
            }
        }

        if !terminated {
            self.remotes.insert(key.clone(), remote);
            self.client_invite.insert(key, tx);
        }
    }

    async fn run_client_non_invite(
        &mut self,
        key: TransactionKey,
        tx: ClientNonInviteTransaction,
        actions: Vec<Action>,
        remote: SocketAddr,
    ) {
        let mut terminated = false;

        for action in &actions {
            if let Action::Send(msg) = action {
                self.send_sip(msg, remote).await;
            }
        }

        for action in actions {
            match action {
                Action::Send(_) => {}
                Action::Deliver(response) => self.handle_non_invite_client_response(&key, response).await,
                Action::ScheduleTimer(kind, duration) => self.schedule_timer(key.clone(), kind, duration),
                Action::CancelTimer(kind) => self.cancel_timer(&key, kind),
                Action::TimedOut => {
                    self.client_non_invite_purpose.remove(&key);
                }
                Action::Terminated => {
                    self.remotes.remove(&key);
                    terminated = true;
                }
            }
        }

        if !terminated {
            self.remotes.insert(key.clone(), remote);
            self.client_non_invite.insert(key, tx);
        }
    }

    /// Common action application for re-entrant dispatch (timer firings,
    /// and the second round after a request is handed a response) where a
    /// `Deliver` is never expected.
    async fn apply_transaction_actions(
        &mut self,
        key: &TransactionKey,
        actions: Vec<Action>,
        remote: SocketAddr,
    ) -> bool {
        let mut terminated = false;

        for action in actions {
            match action {
                Action::Send(msg) => self.send_sip(&msg, remote).await,
                Action::ScheduleTimer(kind, duration) => self.schedule_timer(key.clone(), kind, duration),
                Action::CancelTimer(kind) => self.cancel_timer(key, kind),
                Action::TimedOut => log::debug!("transaction timed out: {key:?}"),
                Action::Terminated => {
                    self.remotes.remove(key);
                    terminated = true;
                }
                Action::Deliver(_) => {
                    log::warn!("unexpected Deliver action outside initial dispatch: {key:?}");
                }
            }
        }

        terminated
    }

    // ---- inbound responses ---------------------------------------------

    async fn on_response(&mut self, response: SipMessage, remote: SocketAddr) {
        let Some(key) = TransactionKey::from_message(&response) else {
            log::debug!("dropping response with no transaction key");
            return;
        };

        if let Some(mut tx) = self.client_invite.remove(&key) {
            let actions = tx.on_response(&response);
            self.run_client_invite(key, tx, actions, remote).await;
            return;
        }

        if let Some(mut tx) = self.client_non_invite.remove(&key) {
            let actions = tx.on_response(&response);
            self.run_client_non_invite(key, tx, actions, remote).await;
            return;
        }

        log::debug!("dropping unmatched response for {key:?}");
    }

    async fn handle_invite_client_response(&mut self, key: &TransactionKey, response: SipMessage) {
        let Some(call_id) = self.pending_client_invites.get(key).cloned() else {
            return;
        };

        if response.is_provisional_response() {
            if response.status_code() == Some(180) {
                if let Some(call) = self.calls.get_mut(&call_id) {
                    call.transition(CallState::Ringing);
                }
            }
            return;
        }

        let Some(code) = response.status_code() else {
            return;
        };

        self.pending_client_invites.remove(key);
        let original_request = self.pending_client_invite_requests.remove(key);

        if code < 300 {
            let remote = match self.calls.get(&call_id) {
                Some(call) => call.remote_sip,
                None => return,
            };

            if let Some(request) = &original_request {
                let ack = build_ack_for_2xx(request, &response);
                self.send_sip(&ack, remote).await;
            }

            if let Some(call) = self.calls.get_mut(&call_id) {
                call.to_tag = response.to_tag();
                call.transition(CallState::Established);
                let ssrc: u32 = rand::random();
                call.rtp = Some(RtpSession::new(ssrc, PayloadType::Pcmu, self.jitter_config()));
            }

            log::info!("call {call_id} established (outbound)");
        } else if let Some(mut call) = self.calls.remove(&call_id) {
            let previous = call.transition(CallState::Failed);
            self.account_for_termination(previous);
        }
    }

    async fn handle_non_invite_client_response(&mut self, key: &TransactionKey, response: SipMessage) {
        if response.is_provisional_response() {
            return;
        }

        let Some(purpose) = self.client_non_invite_purpose.remove(key) else {
            return;
        };

        match purpose {
            ClientNonInvitePurpose::Register => {
                if response.status_code() == Some(200) {
                    self.self_registered = true;
                }
            }
            ClientNonInvitePurpose::Bye { call_id } => {
                if let Some(mut call) = self.calls.remove(&call_id) {
                    let previous = call.transition(CallState::Terminated);
                    self.account_for_termination(previous);
                }
            }
        }
    }

    fn handle_client_invite_timeout(&mut self, key: &TransactionKey) {
        let Some(call_id) = self.pending_client_invites.remove(key) else {
            return;
        };
        self.pending_client_invite_requests.remove(key);

        if let Some(mut call) = self.calls.remove(&call_id) {
            let previous = call.transition(CallState::Failed);
            self.account_for_termination(previous);
        }
    }

    // ---- request handlers -------------------------------------------------

    fn handle_invite_request(
        &mut self,
        request: &SipMessage,
        remote: SocketAddr,
        tx_key: &TransactionKey,
    ) -> SipMessage {
        self.counters.calls_received += 1;

        let (Some(from), Some(to), Some(call_id)) =
            (request.header("from"), request.header("to"), request.call_id())
        else {
            return SipMessage::response_to(request, 400, "Bad Request");
        };

        let Some(to_user) = extract_user(to) else {
            return SipMessage::response_to(request, 400, "Bad Request");
        };

        if !self.registrar.is_registered(&to_user) {
            return SipMessage::response_to(request, 404, "Not Found");
        }

        let from_tag = request.from_tag().unwrap_or_default();
        let from_user = extract_user(from).unwrap_or_default();
        let call_id = call_id.to_string();
        let remote_cseq = request.cseq().map(|c| c.sequence).unwrap_or(0);

        self.calls.insert(Call {
            call_id: call_id.clone(),
            local_user: to_user.clone(),
            remote_user: from_user,
            from_tag,
            to_tag: None,
            local_cseq: 0,
            remote_cseq,
            state: CallState::Incoming,
            started_at: Instant::now(),
            ended_at: None,
            remote_sip: remote,
            invite_key: Some(tx_key.clone()),
            rtp_port: 0,
            rtp: None,
        });

        let to_tag = generate_token();
        let mut ringing = SipMessage::response_to(request, 180, "Ringing");
        ringing.set_header("To", format!("{to};tag={to_tag}"));
        ringing.set_content_length();

        if let Some(call) = self.calls.get_mut(&call_id) {
            call.to_tag = Some(to_tag.clone());
            call.transition(CallState::Ringing);
        }

        self.schedule_ring(call_id, request.clone(), to_tag);

        ringing
    }

    fn handle_non_invite_request(&mut self, request: &SipMessage, remote: SocketAddr) -> SipMessage {
        match request.method() {
            Some(Method::Register) => self.handle_register(request, remote),
            Some(Method::Bye) | Some(Method::Cancel) => self.handle_terminate(request),
            Some(Method::Options) => handle_options(request),
            Some(method) => SipMessage::response_to(request, 501, format!("Not Implemented: {method}")),
            None => SipMessage::response_to(request, 400, "Bad Request"),
        }
    }

    fn handle_register(&mut self, request: &SipMessage, remote: SocketAddr) -> SipMessage {
        let (Some(from), Some(contact)) = (request.header("from"), request.header("contact")) else {
            return SipMessage::response_to(request, 400, "Bad Request");
        };

        let Some(user) = extract_user(from) else {
            return SipMessage::response_to(request, 400, "Bad Request");
        };

        let expires = request
            .header("expires")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.registration_expires());

        let contact = contact.to_string();

        self.registrar.register(
            user,
            Registration {
                contact: contact.clone(),
                expires,
                remote,
                registered_at: Instant::now(),
            },
        );

        let mut response = SipMessage::response_to(request, 200, "OK");
        response.set_header("Contact", contact);
        response.set_header("Expires", expires.as_secs().to_string());
        response.set_content_length();
        response
    }

    fn handle_terminate(&mut self, request: &SipMessage) -> SipMessage {
        let Some(call_id) = request.call_id() else {
            return SipMessage::response_to(request, 400, "Bad Request");
        };

        if let Some(mut call) = self.calls.remove(call_id) {
            let previous = call.transition(CallState::Terminated);
            self.account_for_termination(previous);
            self.rtp_index.retain(|_, id| id.as_str() != call_id);
        }

        SipMessage::response_to(request, 200, "OK")
    }

    // ---- ring delay and RTP bootstrap -----------------------------------

    fn schedule_ring(&mut self, call_id: String, request: SipMessage, to_tag: String) {
        let duration = self.config.ring_duration();
        let sender = self.events_tx.clone();
        self.pending_ring_requests.insert(call_id.clone(), (request, to_tag));

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = sender.send(UaEvent::Ring(call_id));
        });
    }

    async fn on_ring_complete(&mut self, call_id: String) {
        let Some((request, to_tag)) = self.pending_ring_requests.remove(&call_id) else {
            return;
        };

        let Some(call) = self.calls.get(&call_id) else { return };
        if call.state != CallState::Ringing {
            return;
        }

        let Some(key) = call.invite_key.clone() else { return };
        let Some(mut tx) = self.server_invite.remove(&key) else { return };
        let remote = call.remote_sip;
        let local_user = call.local_user.clone();

        let original_to = request.header("to").unwrap_or_default().to_string();
        let rtp_port = self.allocate_rtp_port();

        let mut ok = SipMessage::response_to(&request, 200, "OK");
        ok.set_header("To", format!("{original_to};tag={to_tag}"));
        ok.set_header(
            "Contact",
            format!("<sip:{local_user}@{}:{}>", self.config.local_ip, self.config.sip_port),
        );
        ok.body = sdp::build(&local_user, self.config.local_ip, rtp_port).into_bytes();
        ok.set_content_length();

        if let Some(call) = self.calls.get_mut(&call_id) {
            call.rtp_port = rtp_port;
        }

        let actions = tx.on_response(ok);
        if !self.apply_transaction_actions(&key, actions, remote).await {
            self.server_invite.insert(key, tx);
        }
    }

    fn allocate_rtp_port(&self) -> u16 {
        if self.config.rtp_port_range == 0 {
            return self.config.rtp_port;
        }
        let offset: u16 = rand::rng().random_range(0..self.config.rtp_port_range);
        self.config.rtp_port.saturating_add(offset)
    }

    fn jitter_config(&self) -> JitterConfig {
        JitterConfig {
            capacity: self.config.jitter_buffer_size,
            delay: self.config.jitter_buffer_delay(),
            max_delay: self.config.max_jitter_buffer_delay(),
        }
    }

    // ---- timers ----------------------------------------------------------

    fn schedule_timer(&mut self, key: TransactionKey, kind: TimerKind, duration: Duration) {
        let epoch = self.bump_epoch(&key, kind);
        let sender = self.events_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = sender.send(UaEvent::Timer(key, kind, epoch));
        });
    }

    fn cancel_timer(&mut self, key: &TransactionKey, kind: TimerKind) {
        self.bump_epoch(key, kind);
    }

    fn bump_epoch(&mut self, key: &TransactionKey, kind: TimerKind) -> u64 {
        let entry = self.timer_epochs.entry((key.clone(), kind)).or_insert(0);
        *entry += 1;
        *entry
    }

    async fn on_timer(&mut self, key: TransactionKey, kind: TimerKind, epoch: u64) {
        if self.timer_epochs.get(&(key.clone(), kind)).copied() != Some(epoch) {
            return;
        }

        let Some(remote) = self.remotes.get(&key).copied() else { return };

        if let Some(mut tx) = self.client_invite.remove(&key) {
            let actions = tx.on_timer(kind);
            self.run_client_invite(key, tx, actions, remote).await;
            return;
        }

        if let Some(mut tx) = self.client_non_invite.remove(&key) {
            let actions = tx.on_timer(kind);
            self.run_client_non_invite(key, tx, actions, remote).await;
            return;
        }

        if let Some(mut tx) = self.server_invite.remove(&key) {
            let actions = tx.on_timer(kind);
            if !self.apply_transaction_actions(&key, actions, remote).await {
                self.server_invite.insert(key, tx);
            }
            return;
        }

        if let Some(mut tx) = self.server_non_invite.remove(&key) {
            let actions = tx.on_timer(kind);
            if !self.apply_transaction_actions(&key, actions, remote).await {
                self.server_non_invite.insert(key, tx);
            }
        }
    }

    async fn send_sip(&self, msg: &SipMessage, remote: SocketAddr) {
        if let Err(err) = self.transport.send_sip(&msg.serialize(), remote).await {
            log::warn!("failed to send SIP message to {remote}: {err}");
        }
    }

    fn account_for_termination(&mut self, previous: CallState) {
        if previous == CallState::Established {
            self.counters.calls_completed += 1;
        } else {
            self.counters.calls_failed += 1;
        }
    }
}

fn handle_options(request: &SipMessage) -> SipMessage {
    let mut response = SipMessage::response_to(request, 200, "OK");
    response.set_header("Allow", "INVITE, ACK, BYE, CANCEL, OPTIONS, REGISTER");
    response.set_header("Accept", "application/sdp");
    response.set_content_length();
    response
}

/// Build the dialog-confirming ACK for a 2xx INVITE response. Unlike the
/// non-2xx case (owned entirely by `ClientInviteTransaction`), RFC 3261
/// requires this ACK to carry its own branch and be sent outside any
/// transaction — it is the transaction *user*'s responsibility.
fn build_ack_for_2xx(original_request: &SipMessage, response: &SipMessage) -> SipMessage {
    let request_uri = original_request.request_uri().unwrap_or_default().to_string();
    let mut ack = SipMessage::new_request(Method::Ack, request_uri);

    let branch = sip::branch::generate();
    if let Some(via) = original_request.header("via") {
        let host_part = via.split(';').next().unwrap_or(via);
        ack.set_header("Via", format!("{host_part};branch={branch}"));
    }
    if let Some(from) = original_request.header("from") {
        ack.set_header("From", from);
    }
    if let Some(to) = response.header("to") {
        ack.set_header("To", to);
    }
    if let Some(call_id) = original_request.header("call-id") {
        ack.set_header("Call-ID", call_id);
    }
    if let Some(cseq) = original_request.cseq() {
        ack.set_header("CSeq", format!("{} ACK", cseq.sequence));
    }

    ack.set_content_length();
    ack
}

/// Pull the user-part out of a From/To/Contact header value, tolerating a
/// display name and angle brackets. Returns `None` if no `sip:...@...`
/// user-part can be found, so the caller can reject the request with 400.
fn extract_user(header_value: &str) -> Option<String> {
    let start = header_value.find("sip:")? + 4;
    let rest = &header_value[start..];
    let end = rest.find(|c: char| c == '@' || c == ';' || c == '>' || c.is_whitespace())?;

    if rest.as_bytes().get(end) != Some(&b'@') {
        return None;
    }

    let user = &rest[..end];
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}

fn generate_token() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..10).map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn extract_user_reads_the_sip_uri_user_part() {
        assert_eq!(extract_user("<sip:alice@example.com>;tag=abc").as_deref(), Some("alice"));
        assert_eq!(extract_user("\"Alice\" <sip:alice@example.com>").as_deref(), Some("alice"));
        assert_eq!(extract_user("<sip:example.com>"), None);
        assert_eq!(extract_user("not a sip uri"), None);
    }

    #[tokio::test]
    async fn register_then_invite_rings_then_answers_with_sdp() {
        let config = Arc::new(Config {
            ring_duration_ms: 5,
            ..Config::default()
        });
        let (transport, inbound_tx) = MockTransport::new();
        let transport = Arc::new(transport);
        let mut agent = UserAgent::new(config, transport.clone(), "agent".to_string());

        let _inbound = agent.transport.bind().await.unwrap();

        let remote: SocketAddr = "127.0.0.1:6000".parse().unwrap();
        let mut register = SipMessage::new_request(Method::Register, "sip:127.0.0.1");
        register.set_header("Via", "SIP/2.0/UDP 127.0.0.1:6000;branch=z9hG4bK1");
        register.set_header("From", "<sip:alice@127.0.0.1>;tag=t1");
        register.set_header("To", "<sip:alice@127.0.0.1>");
        register.set_header("Call-ID", "reg1@127.0.0.1");
        register.set_header("CSeq", "1 REGISTER");
        register.set_header("Contact", "<sip:alice@127.0.0.1:6000>");
        register.set_content_length();

        agent.on_request(register, remote).await;
        assert!(agent.registrar.is_registered("alice"));

        let mut invite = SipMessage::new_request(Method::Invite, "sip:alice@127.0.0.1");
        invite.set_header("Via", "SIP/2.0/UDP 127.0.0.1:6001;branch=z9hG4bK2");
        invite.set_header("From", "<sip:carol@127.0.0.1>;tag=t2");
        invite.set_header("To", "<sip:alice@127.0.0.1>");
        invite.set_header("Call-ID", "call1@127.0.0.1");
        invite.set_header("CSeq", "1 INVITE");
        invite.set_content_length();

        let caller: SocketAddr = "127.0.0.1:6001".parse().unwrap();
        agent.on_request(invite, caller).await;

        assert_eq!(agent.calls.get("call1@127.0.0.1").unwrap().state, CallState::Ringing);

        tokio::time::sleep(Duration::from_millis(20)).await;
        while let Ok(event) = agent.events_rx.try_recv() {
            agent.handle_event(event).await;
        }

        assert_eq!(agent.calls.get("call1@127.0.0.1").unwrap().state, CallState::Ringing);

        let sent_sip = agent.transport.sent_sip();
        let ok_response = sent_sip
            .iter()
            .find_map(|(bytes, _)| {
                let msg = SipMessage::parse(bytes).ok()?;
                (msg.status_code() == Some(200)).then_some(msg)
            })
            .expect("a 200 OK should have been sent after the ring delay");
        assert!(!ok_response.body.is_empty());
        assert!(String::from_utf8_lossy(&ok_response.body).contains("m=audio"));

        let mut ack = SipMessage::new_request(Method::Ack, "sip:alice@127.0.0.1");
        ack.set_header("Via", "SIP/2.0/UDP 127.0.0.1:6001;branch=z9hG4bK3");
        ack.set_header("From", "<sip:carol@127.0.0.1>;tag=t2");
        ack.set_header("To", ok_response.header("to").unwrap());
        ack.set_header("Call-ID", "call1@127.0.0.1");
        ack.set_header("CSeq", "1 ACK");
        ack.set_content_length();

        agent.on_request(ack, caller).await;
        assert_eq!(agent.calls.get("call1@127.0.0.1").unwrap().state, CallState::Established);

        let stats = agent.stats();
        assert_eq!(stats.calls_received, 1);
        assert_eq!(stats.active_calls, 1);

        let _ = inbound_tx;
    }

    #[tokio::test]
    async fn invite_to_unknown_user_is_rejected_with_404() {
        let config = Arc::new(Config::default());
        let (transport, _tx) = MockTransport::new();
        let transport = Arc::new(transport);
        let mut agent = UserAgent::new(config, transport.clone(), "agent".to_string());
        let _inbound = agent.transport.bind().await.unwrap();

        let mut invite = SipMessage::new_request(Method::Invite, "sip:nobody@127.0.0.1");
        invite.set_header("Via", "SIP/2.0/UDP 127.0.0.1:6001;branch=z9hG4bK9");
        invite.set_header("From", "<sip:carol@127.0.0.1>;tag=t9");
        invite.set_header("To", "<sip:nobody@127.0.0.1>");
        invite.set_header("Call-ID", "call9@127.0.0.1");
        invite.set_header("CSeq", "1 INVITE");
        invite.set_content_length();

        let caller: SocketAddr = "127.0.0.1:6001".parse().unwrap();
        agent.on_request(invite, caller).await;

        let sent = agent.transport.sent_sip();
        let not_found = sent.iter().any(|(bytes, _)| {
            SipMessage::parse(bytes).ok().and_then(|m| m.status_code()) == Some(404)
        });
        assert!(not_found);
        assert!(agent.calls.is_empty());
    }
}
