use super::writer::Writer;
use super::*;
use shared::error::Error;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

fn header(flags: u16, qd: u16, an: u16) -> Vec<u8> {
    let mut b = vec![0, 0];
    b.extend_from_slice(&flags.to_be_bytes());
    b.extend_from_slice(&qd.to_be_bytes());
    b.extend_from_slice(&an.to_be_bytes());
    b.extend_from_slice(&[0, 0, 0, 0]);
    b
}

#[test]
fn test_name_compression() {
    let mut w = Writer::new(64);
    w.write_bytes(&[0u8; HEADER_LEN]);

    w.write_name("a.foo.local.").unwrap();
    let first = w.len();
    assert_eq!(first - HEADER_LEN, 13);

    // only the new label plus a pointer to "foo.local."
    w.write_name("b.foo.local.").unwrap();
    assert_eq!(w.len() - first, 4);

    let before = w.len();
    w.write_name("a.foo.local.").unwrap();
    assert!(w.len() - before <= 2);
}

#[test]
fn test_truncate_drops_compression_targets() {
    let mut w = Writer::new(64);
    w.write_bytes(&[0u8; HEADER_LEN]);
    w.write_name("a.local.").unwrap();
    let mark = w.len();
    w.write_name("b.example.").unwrap();
    w.truncate(mark);

    // "example." must be written out again, not pointed at
    w.write_name("example.").unwrap();
    assert_eq!(w.len() - mark, 9);
}

#[test]
fn test_packet_round_trip() {
    let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE | FLAGS_AA);
    out.add_question(DnsQuestion::new(
        "_http._tcp.local.",
        DnsType::Ptr,
        DNSCLASS_INET,
    ));
    out.add_answer_at_time(
        DnsRecord::pointer(
            "_http._tcp.local.",
            DnsType::Ptr,
            DNSCLASS_INET.0,
            3600,
            "Web._http._tcp.local.",
        ),
        None,
    );
    out.add_answer_at_time(
        DnsRecord::service(
            "Web._http._tcp.local.",
            DNSCLASS_INET.0 | CLASS_UNIQUE,
            120,
            0,
            0,
            8080,
            "web.local.",
        ),
        None,
    );
    out.add_answer_at_time(
        DnsRecord::text(
            "Web._http._tcp.local.",
            DNSCLASS_INET.0,
            120,
            b"\x07path=/x".to_vec(),
        ),
        None,
    );
    out.add_additional_answer(DnsRecord::address(
        "web.local.",
        DNSCLASS_INET.0 | CLASS_UNIQUE,
        120,
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)),
    ));
    out.add_additional_answer(DnsRecord::address(
        "web.local.",
        DNSCLASS_INET.0,
        120,
        IpAddr::V6(Ipv6Addr::LOCALHOST),
    ));
    out.add_additional_answer(DnsRecord::host_info(
        "web.local.",
        DNSCLASS_INET.0,
        120,
        "ARM",
        "Linux",
    ));

    let packet = out.packet().unwrap();
    let msg = DnsIncoming::parse(&packet).unwrap();

    assert_eq!(msg.id, 0);
    assert!(msg.is_response());
    assert_eq!(msg.flags & FLAGS_AA, FLAGS_AA);
    assert_eq!(msg.num_questions, 1);
    assert_eq!(msg.num_answers, 3);
    assert_eq!(msg.num_additionals, 3);
    assert_eq!(msg.questions[0].name(), "_http._tcp.local.");
    assert_eq!(msg.answers.len(), 6);

    assert_eq!(msg.answers[0].alias(), Some("Web._http._tcp.local."));
    assert!(!msg.answers[0].is_unique());
    assert!(msg.answers[1].is_unique());
    assert_eq!(
        msg.answers[1].data(),
        &RecordData::Service {
            priority: 0,
            weight: 0,
            port: 8080,
            server: "web.local.".to_owned(),
        }
    );
    assert_eq!(msg.answers[2].data(), &RecordData::Text(b"\x07path=/x".to_vec()));
    assert_eq!(
        msg.answers[3].ip_addr(),
        Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)))
    );
    assert_eq!(msg.answers[4].typ(), DnsType::Aaaa);
    assert_eq!(msg.answers[4].ip_addr(), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    assert_eq!(
        msg.answers[5].data(),
        &RecordData::HostInfo {
            cpu: "ARM".to_owned(),
            os: "Linux".to_owned(),
        }
    );
}

#[test]
fn test_unicast_reply_echoes_id() {
    let mut query = DnsOutgoing::new(FLAGS_QR_QUERY);
    query.add_question(DnsQuestion::new("x.local.", DnsType::A, DNSCLASS_INET));
    let mut packet = query.packet().unwrap();
    packet[0] = 0x12;
    packet[1] = 0x34;
    let query = DnsIncoming::parse(&packet).unwrap();
    assert!(query.is_query());

    let mut reply = DnsOutgoing::reply_to(FLAGS_QR_RESPONSE | FLAGS_AA, &query);
    reply.add_answer(
        &query,
        DnsRecord::address(
            "x.local.",
            DNSCLASS_INET.0 | CLASS_UNIQUE,
            120,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        ),
    );
    let msg = DnsIncoming::parse(&reply.packet().unwrap()).unwrap();
    assert_eq!(msg.id, 0x1234);
    assert_eq!(msg.questions.len(), 1);
    // unicast replies do not set the cache-flush bit
    assert!(!msg.answers[0].is_unique());
}

#[test]
fn test_circular_pointer_rejected() {
    let mut b = header(0, 1, 0);
    b.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01]);
    match DnsIncoming::parse(&b) {
        Err(Error::ErrIncomingDecode(reason)) => assert!(reason.contains("circular")),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_forward_pointer_rejected() {
    let mut b = header(0, 1, 0);
    b.extend_from_slice(&[0xC0, 0x20, 0x00, 0x01, 0x00, 0x01]);
    assert!(DnsIncoming::parse(&b).is_err());
}

#[test]
fn test_truncated_packet_rejected() {
    let mut b = header(0, 1, 0);
    b.extend_from_slice(&[5, b'l', b'o']);
    assert!(matches!(
        DnsIncoming::parse(&b),
        Err(Error::ErrIncomingDecode(_))
    ));
    assert!(DnsIncoming::parse(&[0, 0, 0]).is_err());
}

#[test]
fn test_label_too_long() {
    let label = "x".repeat(65);
    let mut out = DnsOutgoing::new(FLAGS_QR_QUERY);
    out.add_question(DnsQuestion::new(
        &format!("{label}.local."),
        DnsType::A,
        DNSCLASS_INET,
    ));
    assert_eq!(out.packet().unwrap_err(), Error::ErrNamePartTooLong);

    let label = "x".repeat(64);
    let mut out = DnsOutgoing::new(FLAGS_QR_QUERY);
    out.add_question(DnsQuestion::new(
        &format!("{label}.local."),
        DnsType::A,
        DNSCLASS_INET,
    ));
    assert!(out.packet().is_ok());
}

#[test]
fn test_unknown_type_skipped() {
    let mut b = header(FLAGS_QR_RESPONSE, 0, 2);
    // x.local. type 99, rdlength 3
    b.extend_from_slice(&[1, b'x', 5, b'l', b'o', b'c', b'a', b'l', 0]);
    b.extend_from_slice(&[0, 99, 0, 1, 0, 0, 0, 120, 0, 3, 1, 2, 3]);
    // pointer to x.local., A 10.0.0.1
    b.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0, 120, 0, 4, 10, 0, 0, 1]);

    let msg = DnsIncoming::parse(&b).unwrap();
    assert_eq!(msg.answers.len(), 1);
    assert_eq!(msg.answers[0].name(), "x.local.");
    assert_eq!(
        msg.answers[0].ip_addr(),
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
    );
}

#[test]
fn test_packet_size_ceiling() {
    let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE);
    for i in 0..200 {
        let mut text = vec![99u8];
        text.extend(std::iter::repeat_n(b'a', 99));
        out.add_answer_at_time(
            DnsRecord::text(&format!("svc{i}._http._tcp.local."), 1, 120, text),
            None,
        );
    }
    let packet = out.packet().unwrap();
    assert!(packet.len() <= MAX_MSG_ABSOLUTE);

    let msg = DnsIncoming::parse(&packet).unwrap();
    assert!(msg.num_answers < 200);
    assert_eq!(msg.answers.len(), msg.num_answers as usize);
}

fn section_record(section: &str, i: usize) -> DnsRecord {
    let mut text = vec![99u8];
    text.extend(std::iter::repeat_n(b'a', 99));
    DnsRecord::text(&format!("svc{i}.{section}.local."), 1, 120, text)
}

// Fills each section with `counts[n]` entries and checks the written packet
// stays under the ceiling with header counts matching what was parsed.
fn overflow_sections(counts: [usize; 4]) -> [u16; 4] {
    let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE);
    for i in 0..counts[0] {
        let label = format!("{i:0>60}");
        out.add_question(DnsQuestion::new(
            &format!("{label}.qd.local."),
            DnsType::Ptr,
            DNSCLASS_INET,
        ));
    }
    for i in 0..counts[1] {
        out.add_answer_at_time(section_record("an", i), None);
    }
    for i in 0..counts[2] {
        out.add_authoritative_answer(section_record("ns", i));
    }
    for i in 0..counts[3] {
        out.add_additional_answer(section_record("ar", i));
    }

    let packet = out.packet().unwrap();
    assert!(packet.len() <= MAX_MSG_ABSOLUTE);

    let msg = DnsIncoming::parse(&packet).unwrap();
    assert_eq!(msg.questions.len(), msg.num_questions as usize);
    let in_section = |section: &str| {
        let suffix = format!(".{section}.local.");
        msg.answers
            .iter()
            .filter(|r| r.name().ends_with(&suffix))
            .count()
    };
    assert_eq!(in_section("an"), msg.num_answers as usize);
    assert_eq!(in_section("ns"), msg.num_authorities as usize);
    assert_eq!(in_section("ar"), msg.num_additionals as usize);
    assert_eq!(
        msg.answers.len(),
        (msg.num_answers + msg.num_authorities + msg.num_additionals) as usize
    );

    [
        msg.num_questions,
        msg.num_answers,
        msg.num_authorities,
        msg.num_additionals,
    ]
}

#[test]
fn test_packet_size_ceiling_every_section() {
    // questions overflow, nothing after them is written
    let [qd, an, ns, ar] = overflow_sections([200, 5, 5, 5]);
    assert!(qd > 0 && qd < 200);
    assert_eq!((an, ns, ar), (0, 0, 0));

    let [qd, an, ns, ar] = overflow_sections([3, 200, 5, 5]);
    assert_eq!(qd, 3);
    assert!(an > 0 && an < 200);
    assert_eq!((ns, ar), (0, 0));

    let [qd, an, ns, ar] = overflow_sections([3, 3, 200, 5]);
    assert_eq!((qd, an), (3, 3));
    assert!(ns > 0 && ns < 200);
    assert_eq!(ar, 0);

    // answers fit, additionals overflow
    let [qd, an, ns, ar] = overflow_sections([1, 10, 0, 200]);
    assert_eq!((qd, an, ns), (1, 10, 0));
    assert!(ar > 0 && ar < 200);

    // everything fits
    assert_eq!(overflow_sections([2, 4, 1, 3]), [2, 4, 1, 3]);
}

#[test]
fn test_remaining_ttl_written() {
    let record = DnsRecord::pointer("_x._udp.local.", DnsType::Ptr, 1, 100, "a._x._udp.local.")
        .with_created(0);
    let mut out = DnsOutgoing::new(FLAGS_QR_QUERY);
    out.add_answer_at_time(record.clone(), Some(40_000));
    // expired answers are not added at all
    out.add_answer_at_time(record, Some(100_000));
    assert_eq!(out.answers.len(), 1);

    let msg = DnsIncoming::parse(&out.packet().unwrap()).unwrap();
    assert_eq!(msg.answers[0].ttl(), 60);
}

#[test]
fn test_record_expiry_boundaries() {
    let record = DnsRecord::pointer("a.local.", DnsType::Ptr, 1, 10, "b.local.").with_created(1000);
    assert_eq!(record.expiration_time(100), 11_000);
    assert!(!record.is_expired(10_999));
    assert!(record.is_expired(11_000));
    assert!(!record.is_stale(5_999));
    assert!(record.is_stale(6_000));
    assert_eq!(record.remaining_ttl(10_000), 1_000);
    assert_eq!(record.remaining_ttl(20_000), 0);
}

#[test]
fn test_record_identity() {
    let a = DnsRecord::pointer("A.Local.", DnsType::Ptr, 1, 10, "x.local.");
    let b = DnsRecord::pointer("a.local.", DnsType::Ptr, 1 | CLASS_UNIQUE, 99, "y.local.");
    let c = DnsRecord::pointer("a.local.", DnsType::Cname, 1, 10, "x.local.");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_suppression() {
    let ours = DnsRecord::pointer("_x._udp.local.", DnsType::Ptr, 1, 120, "a._x._udp.local.");
    let fresh = DnsRecord::pointer("_x._udp.local.", DnsType::Ptr, 1, 61, "a._x._udp.local.");
    let old = DnsRecord::pointer("_x._udp.local.", DnsType::Ptr, 1, 60, "a._x._udp.local.");
    assert!(ours.suppressed_by_answer(&fresh));
    assert!(!ours.suppressed_by_answer(&old));

    let query = DnsIncoming {
        answers: vec![fresh],
        ..Default::default()
    };
    let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE);
    out.add_answer(&query, ours);
    assert!(out.answers.is_empty());
}

#[test]
fn test_reset_ttl() {
    let mut a = DnsRecord::pointer("a.local.", DnsType::Ptr, 1, 10, "x.local.").with_created(5);
    let b = DnsRecord::pointer("a.local.", DnsType::Ptr, 1, 20, "x.local.").with_created(50);
    a.reset_ttl(&b);
    assert_eq!(a.ttl(), 20);
    assert_eq!(a.created(), 50);
}

#[test]
fn test_answered_by() {
    let record = DnsRecord::text("Svc._x._udp.local.", 1 | CLASS_UNIQUE, 10, vec![]);
    assert!(DnsQuestion::new("svc._x._udp.local.", DnsType::Txt, DNSCLASS_INET).answered_by(&record));
    assert!(DnsQuestion::new("svc._x._udp.local.", DnsType::Any, DNSCLASS_INET).answered_by(&record));
    assert!(!DnsQuestion::new("svc._x._udp.local.", DnsType::Srv, DNSCLASS_INET).answered_by(&record));
    assert!(!DnsQuestion::new("other._x._udp.local.", DnsType::Txt, DNSCLASS_INET).answered_by(&record));
}
