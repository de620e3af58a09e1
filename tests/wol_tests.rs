use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::Duration;

use wakedeck::wol::{
    build_sleep_packet, build_wake_packet, send_packet, PacketKind, PacketSender, UdpBroadcaster,
    WolError,
};

#[test]
fn wake_packet_for_various_separators() {
    for input in [
        "AA:BB:CC:DD:EE:FF",
        "aa-bb-cc-dd-ee-ff",
        "AABB.CCDD.EEFF",
        " aabbccddeeff ",
        "AA BB CC DD EE FF",
    ] {
        let pkt = build_wake_packet(input).expect("valid MAC");
        assert_eq!(pkt.len(), 102, "{input}");
        assert_eq!(&pkt[..6], &[0xFF; 6]);
        for block in pkt[6..].chunks(6) {
            assert_eq!(block, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF], "{input}");
        }
    }
}

#[test]
fn sleep_packet_repeats_reversed_mac() {
    let pkt = build_sleep_packet("01:23:45:67:89:AB").expect("valid MAC");
    assert_eq!(pkt.len(), 102);
    assert_eq!(&pkt[..6], &[0xFF; 6]);
    assert_eq!(pkt[6..].chunks(6).count(), 16);
    for block in pkt[6..].chunks(6) {
        assert_eq!(block, &[0xAB, 0x89, 0x67, 0x45, 0x23, 0x01]);
    }
}

#[test]
fn both_builders_reject_wrong_hex_length() {
    for input in ["AA:BB", "AA:BB:CC:DD:EE:FF:0", "", "zz:zz:zz:zz:zz:zz"] {
        assert!(matches!(build_wake_packet(input), Err(WolError::InvalidMacAddress)), "{input}");
        assert!(matches!(build_sleep_packet(input), Err(WolError::InvalidMacAddress)), "{input}");
    }
}

fn loopback_receiver() -> Option<UdpSocket> {
    match UdpSocket::bind("127.0.0.1:0") {
        Ok(sock) => {
            sock.set_read_timeout(Some(Duration::from_secs(2)))
                .expect("failed to set read timeout");
            Some(sock)
        }
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            eprintln!("skipping UDP test because binding sockets is not permitted: {err}");
            None
        }
        Err(err) => panic!("failed to bind UDP receiver: {err}"),
    }
}

#[test]
fn broadcaster_delivers_single_datagram() {
    let Some(receiver) = loopback_receiver() else {
        return;
    };
    let port = receiver.local_addr().expect("receiver addr").port();

    let sender = UdpBroadcaster::default();
    let mac = send_packet(&sender, PacketKind::Wake, "AA:BB:CC:DD:EE:FF", "127.0.0.1", port)
        .expect("send should succeed");
    assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");

    let mut buf = [0u8; 256];
    let (n, _) = receiver.recv_from(&mut buf).expect("datagram should arrive");
    assert_eq!(n, 102);
    assert_eq!(&buf[..6], &[0xFF; 6]);
    assert_eq!(&buf[6..12], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
}

#[test]
fn broadcaster_sends_sleep_packet_as_is() {
    let Some(receiver) = loopback_receiver() else {
        return;
    };
    let port = receiver.local_addr().expect("receiver addr").port();

    let payload = build_sleep_packet("AA:BB:CC:DD:EE:FF").expect("valid MAC");
    UdpBroadcaster::new(Duration::from_millis(200))
        .send(&payload, "127.0.0.1", port)
        .expect("send should succeed");

    let mut buf = [0u8; 256];
    let (n, _) = receiver.recv_from(&mut buf).expect("datagram should arrive");
    assert_eq!(&buf[..n], &payload[..]);
}

#[test]
fn unresolvable_target_is_a_send_error() {
    let err = UdpBroadcaster::default()
        .send(&[0xFF; 6], "host.invalid", 9)
        .expect_err("resolution must fail");
    assert!(matches!(err, WolError::Send(_)));
}
