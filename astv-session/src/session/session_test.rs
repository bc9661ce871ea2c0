use super::*;
use sansio::Protocol;
use std::time::Duration;

const SERVER: &str = "10.0.0.5:1024";
const LOCAL: &str = "10.0.0.2:50000";

fn datagram(now: Instant, text: &str) -> TaggedBytesMut {
    TaggedBytesMut::udp(now, LOCAL.parse().unwrap(), SERVER.parse().unwrap(), text.as_bytes())
}

fn drain_writes(session: &mut Session) -> Vec<String> {
    let mut out = vec![];
    while let Some(packet) = session.poll_write() {
        assert_eq!(packet.transport.peer_addr, SERVER.parse::<SocketAddr>().unwrap());
        out.push(String::from_utf8(packet.message.to_vec()).unwrap());
    }
    out
}

fn drain_states(session: &mut Session) -> Vec<ConnectionState> {
    let mut states = vec![];
    while let Some(event) = session.poll_event() {
        if let SessionEvent::StateChanged(state) = event {
            states.push(state);
        }
    }
    states
}

fn connecting() -> Session {
    let mut session = Session::new(SessionConfig::default());
    session.handle_event(SessionInput::Discover).unwrap();
    session
        .handle_event(SessionInput::Discovered(SERVER.parse().unwrap()))
        .unwrap();
    session
        .handle_event(SessionInput::TransportReady(LOCAL.parse().unwrap()))
        .unwrap();
    session
}

fn connected() -> (Session, Instant) {
    let mut session = connecting();
    let now = Instant::now();
    session.handle_read(datagram(now, "astv_ack")).unwrap();
    session.handle_read(datagram(now, "astv_shake:10.0.0.5")).unwrap();
    drain_writes(&mut session);
    drain_states(&mut session);
    (session, now)
}

#[test]
fn test_handshake_connects() {
    let mut session = connecting();
    assert_eq!(drain_writes(&mut session), vec!["astv_discover"]);
    assert!(session.poll_timeout().is_some());

    let now = Instant::now();
    session.handle_read(datagram(now, "astv_ack")).unwrap();
    assert_eq!(session.state(), ConnectionState::Connecting);

    session.handle_read(datagram(now, "astv_shake:10.0.0.5")).unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(
        drain_states(&mut session),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
    // two replies to one send clamp to a full sample
    assert_eq!(session.strength(), 100.0);
    assert!(session.poll_timeout().is_none());
    assert_eq!(session.poll_read(), Some(Token::Ack));
    assert_eq!(session.poll_read(), Some(Token::Shake(Some(Ipv4Addr::new(10, 0, 0, 5)))));
}

#[test]
fn test_connected_survives_single_silent_window() {
    let (mut session, now) = connected();

    session.send(Token::from(crate::Direction::Up), now).unwrap();
    let deadline = session.poll_timeout().unwrap();
    assert_eq!(deadline, now + Duration::from_secs(2));

    session.handle_timeout(deadline - Duration::from_millis(1)).unwrap();
    assert_eq!(session.strength(), 100.0);

    session.handle_timeout(deadline).unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.strength(), 50.0);
    assert!(session.poll_timeout().is_none());
}

#[test]
fn test_connected_closes_quietly_when_strength_collapses() {
    let (mut session, mut now) = connected();

    for _ in 0..4 {
        session.send(Token::Greet, now).unwrap();
        now += Duration::from_secs(2);
        session.handle_timeout(now).unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    session.send(Token::Greet, now).unwrap();
    now += Duration::from_secs(2);
    session.handle_timeout(now).unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    // passive close, nothing but the greets went out
    assert!(drain_writes(&mut session).iter().all(|w| w == "astv_greet"));
}

#[test]
fn test_unanswered_discover_fails_after_retries() {
    let mut session = connecting();
    let mut now = Instant::now();

    for _ in 0..5 {
        now += Duration::from_secs(3);
        session.handle_timeout(now).unwrap();
        assert_eq!(session.state(), ConnectionState::Connecting);
    }
    now += Duration::from_secs(3);
    session.handle_timeout(now).unwrap();

    assert_eq!(
        session.state(),
        ConnectionState::Failed(FailureReason::ConnectShakeNoResponse)
    );
    assert_eq!(drain_writes(&mut session), vec!["astv_discover"; 6]);
    assert!(session.poll_timeout().is_none());
}

#[test]
fn test_peer_disconnect_is_not_echoed() {
    let (mut session, now) = connected();

    session.handle_read(datagram(now, "astv_disconnect")).unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(drain_writes(&mut session).is_empty());
    assert_eq!(
        session.handle_read(datagram(now, "astv_ack")),
        Err(Error::ErrSessionNotOpen)
    );
}

#[test]
fn test_disconnect_can_kill_server() {
    let (mut session, _) = connected();

    session
        .handle_event(SessionInput::Disconnect { kill_server: true })
        .unwrap();
    assert_eq!(drain_writes(&mut session), vec!["astv_disconnect"]);
    assert_eq!(drain_states(&mut session), vec![ConnectionState::Disconnected]);
    assert!(session.poll_timeout().is_none());

    // already closed
    session
        .handle_event(SessionInput::Disconnect { kill_server: true })
        .unwrap();
    assert!(drain_writes(&mut session).is_empty());
}

#[test]
fn test_send_requires_open_session() {
    let mut session = Session::new(SessionConfig::default());
    assert_eq!(
        session.send(Token::Greet, Instant::now()),
        Err(Error::ErrSessionNotOpen)
    );

    session.handle_event(SessionInput::Discover).unwrap();
    assert_eq!(
        session.send(Token::Greet, Instant::now()),
        Err(Error::ErrNoPeerAddr)
    );
}

#[test]
fn test_transport_error_maps_to_state() {
    let (mut session, _) = connected();
    session
        .handle_event(SessionInput::TransportError(io::Error::from(
            io::ErrorKind::ConnectionRefused,
        )))
        .unwrap();
    assert_eq!(
        session.state(),
        ConnectionState::Failed(FailureReason::ConnectRefused)
    );

    let mut session = connecting();
    session
        .handle_event(SessionInput::TransportError(io::Error::from(
            io::ErrorKind::NotConnected,
        )))
        .unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[test]
fn test_discovery_failure_and_stale_results() {
    let mut session = Session::new(SessionConfig::default());
    session.handle_event(SessionInput::Discover).unwrap();
    session
        .handle_event(SessionInput::DiscoverFailed(FailureReason::DiscoverTimeout))
        .unwrap();
    assert_eq!(
        session.state(),
        ConnectionState::Failed(FailureReason::DiscoverTimeout)
    );

    session
        .handle_event(SessionInput::Discovered(SERVER.parse().unwrap()))
        .unwrap();
    assert_eq!(session.peer_addr(), None);
    assert_eq!(
        session.handle_event(SessionInput::TransportReady(LOCAL.parse().unwrap())),
        Err(Error::ErrSessionNotOpen)
    );
}

#[test]
fn test_close_drops_queued_output() {
    let mut session = connecting();
    session.close().unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.poll_write().is_none());
    assert!(session.poll_timeout().is_none());
}
