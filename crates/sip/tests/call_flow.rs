//! End-to-end transaction scenarios, driving the state machines the way a
//! UAC/UAS pair would: client sends, server receives, responses flow back.

use sip::message::SipMessage;
use sip::method::Method;
use sip::transaction::{
    Action, ClientInviteState, ClientInviteTransaction, ClientNonInviteState,
    ClientNonInviteTransaction, ServerInviteState, ServerInviteTransaction,
    ServerNonInviteState, ServerNonInviteTransaction, TimerKind,
};

fn invite_request() -> SipMessage {
    let mut req = SipMessage::new_request(Method::Invite, "sip:bob@example.com");
    req.set_header("Via", "SIP/2.0/UDP 192.168.1.10:5060;branch=z9hG4bK-call-1");
    req.set_header("From", "<sip:alice@example.com>;tag=a1");
    req.set_header("To", "<sip:bob@example.com>");
    req.set_header("Call-ID", "call-1@192.168.1.10");
    req.set_header("CSeq", "1 INVITE");
    req.set_content_length();
    req
}

#[test]
fn successful_invite_ends_in_terminated_on_both_sides_without_a_client_ack_send() {
    let (mut server, _) = ServerInviteTransaction::new(invite_request());
    assert_eq!(server.state(), ServerInviteState::Proceeding);

    let mut ok = SipMessage::response_to(&invite_request(), 200, "OK");
    ok.set_header("To", "<sip:bob@example.com>;tag=b1");
    ok.set_content_length();

    let server_actions = server.on_response(ok.clone());
    assert_eq!(server.state(), ServerInviteState::Terminated);
    assert!(server_actions.contains(&Action::Terminated));

    let (mut client, _) = ClientInviteTransaction::new(invite_request());
    let client_actions = client.on_response(&ok);
    assert_eq!(client.state(), ClientInviteState::Terminated);
    assert!(client_actions.contains(&Action::Terminated));
    assert!(!client_actions.iter().any(|a| matches!(a, Action::Send(_))));
}

#[test]
fn rejected_invite_drives_full_completed_confirmed_terminated_cycle() {
    let (mut server, _) = ServerInviteTransaction::new(invite_request());

    let mut busy = SipMessage::response_to(&invite_request(), 486, "Busy Here");
    busy.set_header("To", "<sip:bob@example.com>;tag=b1");
    busy.set_content_length();

    server.on_response(busy.clone());
    assert_eq!(server.state(), ServerInviteState::Completed);

    let (mut client, _) = ClientInviteTransaction::new(invite_request());
    let client_actions = client.on_response(&busy);
    assert_eq!(client.state(), ClientInviteState::Completed);

    let ack = client_actions
        .into_iter()
        .find_map(|a| match a {
            Action::Send(msg) if msg.method() == Some(&Method::Ack) => Some(msg),
            _ => None,
        })
        .expect("client transaction must synthesize an ACK for the non-2xx final response");

    assert_eq!(ack.header("to"), busy.header("to"));

    let server_actions = server.on_ack();
    assert_eq!(server.state(), ServerInviteState::Confirmed);
    assert!(server_actions.contains(&Action::CancelTimer(TimerKind::G)));

    let server_actions = server.on_timer(TimerKind::I);
    assert_eq!(server.state(), ServerInviteState::Terminated);
    assert!(server_actions.contains(&Action::Terminated));
}

#[test]
fn register_round_trip_through_non_invite_transactions() {
    let mut register = SipMessage::new_request(Method::Register, "sip:example.com");
    register.set_header("Via", "SIP/2.0/UDP 192.168.1.10:5060;branch=z9hG4bK-reg-1");
    register.set_header("From", "<sip:alice@example.com>;tag=a1");
    register.set_header("To", "<sip:alice@example.com>");
    register.set_header("Call-ID", "reg-1@192.168.1.10");
    register.set_header("CSeq", "1 REGISTER");
    register.set_content_length();

    let (mut server, _) = ServerNonInviteTransaction::new(register.clone());
    assert_eq!(server.state(), ServerNonInviteState::Trying);

    let ok = SipMessage::response_to(&register, 200, "OK");
    let server_actions = server.on_response(ok.clone());
    assert_eq!(server.state(), ServerNonInviteState::Completed);
    assert!(server_actions
        .iter()
        .any(|a| matches!(a, Action::ScheduleTimer(TimerKind::F, _))));

    let (mut client, _) = ClientNonInviteTransaction::new(register);
    let client_actions = client.on_response(&ok);
    assert_eq!(client.state(), ClientNonInviteState::Completed);
    assert!(client_actions.contains(&Action::Deliver(ok)));
}
