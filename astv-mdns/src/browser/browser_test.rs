use super::*;
use crate::config::MdnsConfig;
use std::sync::mpsc;

const TYPE: &str = "_assistive-tech._udp.local.";
const NAME: &str = "Server-1._assistive-tech._udp.local.";

fn offline() -> Zeroconf {
    Zeroconf::new(
        MdnsConfig::default()
            .with_bind_sockets(false)
            .with_browser_initial_delay(Duration::from_millis(20))
            .with_browser_max_delay(Duration::from_millis(40)),
    )
    .unwrap()
}

fn ptr_response(ttl: u32) -> DnsIncoming {
    let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE | FLAGS_AA);
    out.add_answer_at_time(
        DnsRecord::pointer(TYPE, DnsType::Ptr, DNSCLASS_INET.0, ttl, NAME),
        None,
    );
    DnsIncoming::parse(&out.packet().unwrap()).unwrap()
}

fn channel_browser(zc: &Zeroconf) -> (ServiceBrowser, mpsc::Receiver<ServiceEvent>) {
    let (tx, rx) = mpsc::channel();
    let browser = ServiceBrowser::with_handler(zc, TYPE, move |_, event| {
        let _ = tx.send(event.clone());
    })
    .unwrap();
    (browser, rx)
}

#[test]
fn test_browser_reports_instance_once() -> Result<()> {
    let zc = offline();
    let (browser, rx) = channel_browser(&zc);

    zc.handle_response(&ptr_response(120))?;
    zc.handle_response(&ptr_response(120))?;

    let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(
        event,
        ServiceEvent::Added {
            service_type: TYPE.to_owned(),
            name: NAME.to_owned(),
        }
    );
    assert_eq!(event.instance_name(), "Server-1");
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(browser.services()?, vec![NAME.to_owned()]);

    drop(browser);
    zc.close()
}

#[test]
fn test_browser_reports_goodbye() -> Result<()> {
    let zc = offline();
    let (mut browser, rx) = channel_browser(&zc);

    zc.handle_response(&ptr_response(120))?;
    zc.handle_response(&ptr_response(0))?;

    let added = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let removed = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(matches!(added, ServiceEvent::Added { .. }));
    assert_eq!(
        removed,
        ServiceEvent::Removed {
            service_type: TYPE.to_owned(),
            name: NAME.to_owned(),
        }
    );
    assert!(browser.services()?.is_empty());

    browser.cancel()?;
    zc.close()
}

#[test]
fn test_goodbye_does_not_trigger_query() -> Result<()> {
    let zc = Zeroconf::new(
        MdnsConfig::default()
            .with_bind_sockets(false)
            .with_browser_initial_delay(Duration::from_secs(10))
            .with_browser_max_delay(Duration::from_secs(10)),
    )?;
    let (mut browser, rx) = channel_browser(&zc);

    let deadline = Instant::now() + Duration::from_secs(2);
    while zc.sent_packet_count() == 0 {
        assert!(Instant::now() < deadline, "no initial query");
        std::thread::sleep(Duration::from_millis(5));
    }
    let sent = zc.sent_packet_count();

    zc.handle_response(&ptr_response(120))?;
    zc.handle_response(&ptr_response(0))?;
    assert!(matches!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        ServiceEvent::Added { .. }
    ));
    assert!(matches!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        ServiceEvent::Removed { .. }
    ));

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(zc.sent_packet_count(), sent);

    browser.cancel()?;
    zc.close()
}

#[test]
fn test_browser_replays_cached_instances() -> Result<()> {
    let zc = offline();
    zc.handle_response(&ptr_response(120))?;

    let (_browser, rx) = channel_browser(&zc);
    let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event.name(), NAME);

    zc.close()
}

#[test]
fn test_browser_queries_with_backoff() -> Result<()> {
    let zc = offline();
    let (mut browser, _rx) = channel_browser(&zc);

    std::thread::sleep(Duration::from_millis(300));
    browser.cancel()?;
    let sent = zc.sent_packet_count();
    // immediately, then after 20ms and every 40ms from there on
    assert!(sent >= 3, "sent {sent} queries");

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(zc.sent_packet_count(), sent);
    zc.close()
}

#[test]
fn test_browser_rejects_bad_arguments() {
    let zc = offline();
    assert_eq!(
        ServiceBrowser::new(&zc, TYPE, vec![]).err(),
        Some(Error::ErrNoServiceHandler)
    );
    assert!(matches!(
        ServiceBrowser::with_handler(&zc, "_http._sctp.local.", |_, _| {}),
        Err(Error::ErrBadTypeInName(_))
    ));
    zc.close().unwrap();
}

#[test]
fn test_service_listener_lifecycle() -> Result<()> {
    let zc = offline();
    let (tx, rx) = mpsc::channel();
    let id = zc.add_service_listener(TYPE, move |_, event| {
        let _ = tx.send(event.name().to_owned());
    })?;

    zc.handle_response(&ptr_response(120))?;
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), NAME);

    zc.remove_service_listener(id)?;
    zc.remove_service_listener(id)?;
    zc.close()
}
