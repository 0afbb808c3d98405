//! Session-level scenarios over a scripted mock stream

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use facteur::{
    client::mock::MockStream,
    Address, BodyKind, ByMode, ClientId, Credentials, DeliverBy, Direction, DsnRet, Error, Event,
    EventListener, Monitor, NetworkStream, Notify, Session, StatusKind, TlsPolicy,
};

/// A complete RFC 822 message so that no headers need synthesizing and the
/// wire is deterministic
const BODY: &str = "Date: Tue, 15 Nov 1994 08:12:31 +0000\r\nMessage-ID: <1@client.example.org>\r\nFrom: <a@x.org>\r\nSubject: test\r\n\r\nhello\r\n";

fn address(s: &str) -> Address {
    s.parse().unwrap()
}

fn session() -> Session {
    let mut session = Session::new();
    session.set_server("mail.example.org").unwrap();
    session.set_hello_name(ClientId::Domain("client.example.org".to_owned()));
    session.set_tls(TlsPolicy::None);
    session
}

fn run(session: &mut Session, script: &str) -> (String, Result<(), Error>) {
    let mock = MockStream::with_vec(script.as_bytes().to_vec());
    let result = session.start_with_stream(NetworkStream::Mock(mock.clone()));
    let wire = String::from_utf8(mock.clone().take_vec()).unwrap();
    (wire, result)
}

#[test]
fn happy_path_with_pipelining_and_size() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    message.set_size_estimate(123);
    message.set_body_bytes(BODY);

    let script = "220 mail.example.org ESMTP\r\n\
                  250-mail.example.org\r\n250-PIPELINING\r\n250 SIZE 10240000\r\n\
                  250 sender ok\r\n\
                  250 recipient ok\r\n\
                  354 go ahead\r\n\
                  250 accepted\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert_eq!(
        wire,
        format!(
            "EHLO client.example.org\r\n\
             MAIL FROM:<a@x.org> SIZE=123\r\n\
             RCPT TO:<b@y.org>\r\n\
             DATA\r\n\
             {BODY}.\r\n\
             QUIT\r\n"
        )
    );

    let message = session.messages().next().unwrap();
    assert_eq!(message.reverse_path_status().code(), 250);
    assert_eq!(message.status().kind(), StatusKind::Ok);
    let recipient = message.recipients().next().unwrap();
    assert!(recipient.is_complete());
    assert_eq!(recipient.status().kind(), StatusKind::Ok);
    assert_eq!(session.status().code(), 221);
}

#[test]
fn partial_recipient_rejection_still_sends() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("good@y.org"));
    message.add_recipient(address("bad@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 PIPELINING\r\n\
                  250 sender ok\r\n\
                  250 recipient ok\r\n\
                  550 no such user\r\n\
                  354 go ahead\r\n\
                  250 accepted\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert!(wire.contains("DATA\r\n"));

    let message = session.messages().next().unwrap();
    let recipients: Vec<_> = message.recipients().collect();
    assert_eq!(recipients[0].status().kind(), StatusKind::Ok);
    assert!(recipients[0].is_complete());
    assert_eq!(recipients[1].status().kind(), StatusKind::PermanentFailure);
    assert_eq!(recipients[1].status().code(), 550);
    assert!(recipients[1].is_complete());
    assert_eq!(message.status().kind(), StatusKind::Ok);
}

#[test]
fn all_recipients_rejected_resets_without_data() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("one@y.org"));
    message.add_recipient(address("two@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 PIPELINING\r\n\
                  250 sender ok\r\n\
                  550 no\r\n\
                  550 no\r\n\
                  250 reset\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert!(wire.contains("RSET\r\n"));
    assert!(!wire.contains("DATA"));
    assert!(!wire.contains("hello"));

    let message = session.messages().next().unwrap();
    assert_eq!(message.status().kind(), StatusKind::PermanentFailure);
    assert_eq!(message.status().text(), "no valid recipients");
}

#[test]
fn missing_required_extension_issues_no_mail() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    message.set_body_bytes(BODY);
    message.dsn_set_envid("tracer");

    // No DSN in the EHLO response
    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 PIPELINING\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    assert!(result.unwrap_err().is_protocol());
    assert!(!wire.contains("MAIL"));
    assert!(wire.ends_with("QUIT\r\n"));
    assert_eq!(session.status().kind(), StatusKind::ProtocolError);

    let message = session.messages().next().unwrap();
    assert_eq!(message.status().kind(), StatusKind::ProtocolError);
    let recipient = message.recipients().next().unwrap();
    assert_eq!(recipient.status().kind(), StatusKind::ProtocolError);
    assert!(!recipient.is_complete());
}

#[test]
fn mandatory_tls_refused_aborts_before_mail() {
    let mut session = session();
    session.set_tls(TlsPolicy::Required);
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 STARTTLS\r\n\
                  454 TLS not available\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    assert!(result.is_err());
    assert_eq!(session.status().kind(), StatusKind::LocalError);
    assert!(wire.contains("STARTTLS\r\n"));
    assert!(!wire.contains("MAIL"));
    assert!(!wire.contains("AUTH"));
}

#[test]
fn mandatory_tls_not_offered_aborts() {
    let mut session = session();
    session.set_tls(TlsPolicy::Required);

    let script = "220 ok\r\n\
                  250 mail.example.org\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    assert!(result.is_err());
    assert_eq!(session.status().kind(), StatusKind::LocalError);
    assert!(!wire.contains("STARTTLS"));
}

#[test]
fn opportunistic_tls_refusal_continues_cleartext() {
    let mut session = session();
    session.set_tls(TlsPolicy::Opportunistic);

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 STARTTLS\r\n\
                  454 not today\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert!(wire.contains("STARTTLS\r\n"));
    assert!(wire.ends_with("QUIT\r\n"));
}

#[test]
fn starttls_rehandshakes_ehlo() {
    let mut session = session();
    session.set_tls(TlsPolicy::Required);

    // The mock stream upgrades in place without a handshake
    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 STARTTLS\r\n\
                  220 ready for tls\r\n\
                  250 mail.example.org\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert_eq!(
        wire,
        "EHLO client.example.org\r\n\
         STARTTLS\r\n\
         EHLO client.example.org\r\n\
         QUIT\r\n"
    );
}

#[test]
fn eight_bit_body_on_seven_bit_server_fails_before_mail() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    let mut body = BODY.as_bytes().to_vec();
    body.extend_from_slice(b"na\xc3\xafve\r\n");
    message.set_body_bytes(body);

    // No 8BITMIME in the EHLO response
    let script = "220 ok\r\n\
                  250 mail.example.org\r\n\
                  250 reset\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    assert!(result.unwrap_err().is_protocol());
    assert!(!wire.contains("MAIL"));
    assert!(wire.contains("RSET\r\n"));
    assert!(wire.ends_with("QUIT\r\n"));

    let message = session.messages().next().unwrap();
    assert_eq!(message.status().kind(), StatusKind::ProtocolError);
}

#[test]
fn auth_plain_initial_response() {
    let mut session = session();
    session.set_credentials(Credentials::new(
        "username".to_owned(),
        "password".to_owned(),
    ));

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 AUTH PLAIN LOGIN\r\n\
                  235 2.7.0 authenticated\r\n\
                  250-mail.example.org\r\n250 AUTH PLAIN LOGIN\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert_eq!(
        wire,
        "EHLO client.example.org\r\n\
         AUTH PLAIN AHVzZXJuYW1lAHBhc3N3b3Jk\r\n\
         EHLO client.example.org\r\n\
         QUIT\r\n"
    );
}

#[test]
fn auth_login_challenge_loop() {
    let mut session = session();
    session.set_credentials(("alice", "wonderland"));

    // Username: / Password: challenges, base64-encoded
    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 AUTH LOGIN\r\n\
                  334 VXNlcm5hbWU6\r\n\
                  334 UGFzc3dvcmQ6\r\n\
                  235 2.7.0 authenticated\r\n\
                  250 mail.example.org\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert_eq!(
        wire,
        "EHLO client.example.org\r\n\
         AUTH LOGIN\r\n\
         YWxpY2U=\r\n\
         d29uZGVybGFuZA==\r\n\
         EHLO client.example.org\r\n\
         QUIT\r\n"
    );
}

#[test]
fn auth_permanent_failure_aborts() {
    let mut session = session();
    session.set_credentials(("alice", "nope"));
    let message = session.add_message();
    message.add_recipient(address("b@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 AUTH PLAIN\r\n\
                  535 5.7.8 bad credentials\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    assert!(result.unwrap_err().is_permanent());
    assert_eq!(session.status().kind(), StatusKind::PermanentFailure);
    assert!(!wire.contains("MAIL"));

    let message = session.messages().next().unwrap();
    assert_eq!(message.status().text(), "not attempted");
}

#[test]
fn auth_bad_challenge_cancels() {
    let mut session = session();
    session.set_credentials(("alice", "wonderland"));

    // "!!!" is not base64
    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 AUTH LOGIN\r\n\
                  334 !!!\r\n\
                  501 cancelled\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    assert!(result.is_err());
    assert!(wire.contains("AUTH LOGIN\r\n*\r\n"));
    assert_eq!(session.status().kind(), StatusKind::ProtocolError);
}

#[test]
fn missing_auth_with_requirement_aborts() {
    let mut session = session();
    session.set_credentials(("alice", "wonderland"));
    session.require_authentication();

    let script = "220 ok\r\n\
                  250 mail.example.org\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    assert!(result.unwrap_err().is_protocol());
    assert!(!wire.contains("AUTH"));
    assert_eq!(session.status().kind(), StatusKind::ProtocolError);
}

#[test]
fn dsn_and_deliverby_parameters_on_the_wire() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.dsn_set_ret(DsnRet::Full);
    message.dsn_set_envid("tracer");
    message
        .set_deliver_by(DeliverBy {
            time: 120,
            mode: ByMode::Return,
            trace: false,
        })
        .unwrap();
    let recipient = message.add_recipient(address("b@y.org"));
    recipient.dsn_set_notify(Notify {
        success: true,
        failure: true,
        delay: false,
    });
    recipient.dsn_set_orcpt("rfc822", "b@y.org");
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250-DSN\r\n250 DELIVERBY 60\r\n\
                  250 sender ok\r\n\
                  250 recipient ok\r\n\
                  354 go\r\n\
                  250 accepted\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert!(wire.contains("MAIL FROM:<a@x.org> RET=FULL ENVID=tracer BY=120;R\r\n"));
    assert!(wire.contains("RCPT TO:<b@y.org> NOTIFY=SUCCESS,FAILURE ORCPT=rfc822;b@y.org\r\n"));
}

#[test]
fn eight_bit_body_negotiated() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    message.set_body_kind(BodyKind::EightBitMime);
    let mut body = BODY.as_bytes().to_vec();
    body.extend_from_slice(b"na\xc3\xafve\r\n");
    message.set_body_bytes(body);

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 8BITMIME\r\n\
                  250 sender ok\r\n\
                  250 recipient ok\r\n\
                  354 go\r\n\
                  250 accepted\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert!(wire.contains("MAIL FROM:<a@x.org> BODY=8BITMIME\r\n"));
}

#[test]
fn sender_rejected_cascades_to_recipients() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 PIPELINING\r\n\
                  550 bad sender\r\n\
                  503 no sender\r\n\
                  250 reset\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert!(wire.contains("RSET\r\n"));

    let message = session.messages().next().unwrap();
    assert_eq!(
        message.reverse_path_status().kind(),
        StatusKind::PermanentFailure
    );
    let recipient = message.recipients().next().unwrap();
    assert_eq!(recipient.status().kind(), StatusKind::PermanentFailure);
    assert_eq!(recipient.status().text(), "not attempted: sender rejected");
    assert!(!recipient.is_complete());
}

#[test]
fn require_all_recipients_abandons_partial_acceptance() {
    let mut session = session();
    session.require_all_recipients(true);
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("good@y.org"));
    message.add_recipient(address("bad@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250 mail.example.org\r\n\
                  250 sender ok\r\n\
                  250 recipient ok\r\n\
                  550 no such user\r\n\
                  250 reset\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert!(!wire.contains("DATA"));
    assert!(wire.contains("RSET\r\n"));
    let message = session.messages().next().unwrap();
    assert_eq!(message.status().text(), "recipients rejected");
}

#[test]
fn two_messages_share_one_connection() {
    let mut session = session();
    for _ in 0..2 {
        let message = session.add_message();
        message.set_reverse_path(Some(address("a@x.org")));
        message.add_recipient(address("b@y.org"));
        message.set_body_bytes(BODY);
    }

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 PIPELINING\r\n\
                  250 ok\r\n250 ok\r\n354 go\r\n250 sent\r\n\
                  250 ok\r\n250 ok\r\n354 go\r\n250 sent\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert_eq!(wire.matches("MAIL FROM:").count(), 2);
    assert_eq!(wire.matches("DATA\r\n").count(), 2);
    assert_eq!(wire.matches("EHLO").count(), 1);
    for message in session.messages() {
        assert_eq!(message.status().kind(), StatusKind::Ok);
    }
}

#[test]
fn helo_fallback_after_ehlo_rejection() {
    let mut session = session();

    let script = "220 ok\r\n\
                  502 command not implemented\r\n\
                  250 mail.example.org\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert_eq!(
        wire,
        "EHLO client.example.org\r\n\
         HELO client.example.org\r\n\
         QUIT\r\n"
    );
}

#[test]
fn unexpected_greeting_is_a_local_error() {
    let mut session = session();

    let script = "554 go away\r\n221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    assert!(result.is_err());
    assert_eq!(session.status().kind(), StatusKind::LocalError);
    assert_eq!(session.status().code(), 554);
    assert!(wire.ends_with("QUIT\r\n"));
}

#[test]
fn dot_stuffing_on_the_wire() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    let body = format!("{BODY}.hidden dot\r\nsafe\r\n");
    message.set_body_bytes(body);

    let script = "220 ok\r\n\
                  250 mail.example.org\r\n\
                  250 ok\r\n250 ok\r\n354 go\r\n250 sent\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);

    result.unwrap();
    assert!(wire.contains("\r\n..hidden dot\r\nsafe\r\n.\r\n"));
}

#[test]
fn enhanced_status_codes_recorded_when_advertised() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250-mail.example.org\r\n250 ENHANCEDSTATUSCODES\r\n\
                  250 2.1.0 sender ok\r\n\
                  250 2.1.5 recipient ok\r\n\
                  354 go\r\n\
                  250 2.0.0 accepted\r\n\
                  221 bye\r\n";
    let (_, result) = run(&mut session, script);

    result.unwrap();
    let message = session.messages().next().unwrap();
    assert_eq!(
        message
            .reverse_path_status()
            .enhanced_code()
            .unwrap()
            .to_string(),
        "2.1.0"
    );
    let recipient = message.recipients().next().unwrap();
    assert_eq!(
        recipient.status().enhanced_code().unwrap().to_string(),
        "2.1.5"
    );
}

#[test]
fn statuses_reset_for_reexecution() {
    let mut session = session();
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250 mail.example.org\r\n\
                  250 ok\r\n250 ok\r\n354 go\r\n250 sent\r\n\
                  221 bye\r\n";
    let (_, result) = run(&mut session, script);
    result.unwrap();

    session.reset_status();
    for message in session.messages_mut() {
        message.reset_status();
        for recipient in message.recipients_mut() {
            recipient.reset_status();
        }
    }

    let (wire, result) = run(&mut session, script);
    result.unwrap();
    assert!(wire.contains("MAIL FROM:<a@x.org>"));
    let message = session.messages().next().unwrap();
    assert_eq!(message.status().kind(), StatusKind::Ok);
    assert!(message.recipients().next().unwrap().is_complete());
}

struct EventLog(Mutex<Vec<Event>>);

impl EventListener for EventLog {
    fn on_event(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

#[test]
fn events_follow_the_state_machine() {
    let log = Arc::new(EventLog(Mutex::new(Vec::new())));

    let mut session = session();
    session.set_event_listener(log.clone());
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250 mail.example.org\r\n\
                  250 ok\r\n250 ok\r\n354 go\r\n250 sent\r\n\
                  221 bye\r\n";
    let (_, result) = run(&mut session, script);
    result.unwrap();

    let events = log.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            Event::Connect,
            Event::Greeting,
            Event::Hello,
            Event::MailFrom,
            Event::RcptTo,
            Event::Data,
            Event::MessageDone,
            Event::Quit,
            Event::Disconnect,
        ]
    );
}

struct Wiretap(Mutex<Vec<(Direction, Vec<u8>)>>);

impl Monitor for Wiretap {
    fn on_traffic(&self, direction: Direction, octets: &[u8]) -> bool {
        self.0.lock().unwrap().push((direction, octets.to_vec()));
        true
    }
}

#[test]
fn headers_only_monitor_never_sees_the_body() {
    let tap = Arc::new(Wiretap(Mutex::new(Vec::new())));

    let mut session = session();
    session.set_monitor(tap.clone(), true);
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250 mail.example.org\r\n\
                  250 ok\r\n250 ok\r\n354 go\r\n250 sent\r\n\
                  221 bye\r\n";
    let (wire, result) = run(&mut session, script);
    result.unwrap();

    // The body went over the wire but not through the monitor
    assert!(wire.contains("hello"));
    let seen: Vec<u8> = tap
        .0
        .lock()
        .unwrap()
        .iter()
        .filter(|(direction, _)| *direction == Direction::Write)
        .flat_map(|(_, octets)| octets.clone())
        .collect();
    let seen = String::from_utf8(seen).unwrap();
    assert!(seen.contains("Subject: test"));
    assert!(!seen.contains("hello"));
}

/// Cancels the session as soon as a MAIL command goes out
struct PullThePlug;

impl Monitor for PullThePlug {
    fn on_traffic(&self, _direction: Direction, octets: &[u8]) -> bool {
        !octets.starts_with(b"MAIL")
    }
}

#[test]
fn monitor_can_cancel_the_session() {
    let mut session = session();
    session.set_monitor(Arc::new(PullThePlug), false);
    let message = session.add_message();
    message.set_reverse_path(Some(address("a@x.org")));
    message.add_recipient(address("b@y.org"));
    message.set_body_bytes(BODY);

    let script = "220 ok\r\n\
                  250 mail.example.org\r\n\
                  250 never read\r\n";
    let (wire, result) = run(&mut session, script);

    assert!(result.unwrap_err().is_cancelled());
    assert!(!wire.contains("MAIL FROM"));
    assert!(!wire.contains("DATA"));
}
