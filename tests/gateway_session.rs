// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

// End-to-end session tests against a scripted gateway on an in-memory stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

use dsair_bridge::event::event_channel;
use dsair_bridge::protocol::{Decoded, Frame, FrameCodec, encode_frame};
use dsair_bridge::transport::DirectTcpTransport;
use dsair_bridge::{
    AirConStatus, DeviceKey, DeviceKind, DsAirError, EventReceiver, GatewayConfig, GatewayEvent,
    HookUpdate, Mode, Param, Session, Switch,
};

const STEP: Duration = Duration::from_secs(2);

/// Scripted gateway end of the connection.
struct FakeGateway {
    stream: DuplexStream,
    codec: FrameCodec,
}

impl FakeGateway {
    async fn next_frame(&mut self) -> Frame {
        let mut buf = [0u8; 1024];
        loop {
            match self.codec.decode().expect("client sent a malformed frame") {
                Some(Decoded::Frame(frame)) => return frame,
                Some(Decoded::Heartbeat) => continue,
                None => {}
            }
            let n = timeout(STEP, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for a client frame")
                .unwrap();
            assert!(n > 0, "client closed the stream");
            self.codec.push(&buf[..n]);
        }
    }

    async fn send(&mut self, device_id: u32, command: u16, subbody_version: u8, subbody: Bytes) {
        self.send_seq(0, device_id, command, subbody_version, subbody).await;
    }

    async fn send_seq(
        &mut self,
        sequence: u32,
        device_id: u32,
        command: u16,
        subbody_version: u8,
        subbody: Bytes,
    ) {
        let frame = Frame {
            subbody_version,
            sequence,
            type_code: 8,
            device_id,
            need_ack: false,
            command,
            subbody,
        };
        self.stream.write_all(&encode_frame(&frame).unwrap()).await.unwrap();
    }
}

fn put_utf(buf: &mut BytesMut, s: &str) {
    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());
}

/// Two rooms: "Living" with an aircon, "Bed" (alias "Master") with a new-aircon.
fn room_info() -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u16_le(2);
    buf.put_u8(2);

    buf.put_u16_le(1);
    buf.put_u8(3);
    put_utf(&mut buf, "Living");
    put_utf(&mut buf, "");
    put_utf(&mut buf, "sofa");
    buf.put_u16_le(1);
    buf.put_u32_le(18);
    buf.put_u16_le(1);
    put_utf(&mut buf, "AC1");
    put_utf(&mut buf, "");

    buf.put_u16_le(2);
    buf.put_u8(3);
    put_utf(&mut buf, "Bed");
    put_utf(&mut buf, "Master");
    put_utf(&mut buf, "bed");
    buf.put_u16_le(1);
    buf.put_u32_le(23);
    buf.put_u16_le(1);
    put_utf(&mut buf, "AC2");
    put_utf(&mut buf, "");

    buf.freeze()
}

/// Old-protocol capability body for one unit: cool, heat and ventilation.
fn capability(room: u8, unit: u8) -> Bytes {
    Bytes::from(vec![1, room, 1, unit, 0b0000_0111, 0])
}

/// Switch, mode, current and target temperature.
fn status(room: u8, unit: u8, switch: u8, mode: u8, current: u16, setted: u16) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(room);
    buf.put_u8(unit);
    buf.put_u8(0b0001_1011);
    buf.put_u8(switch);
    buf.put_u8(mode);
    buf.put_u16_le(current);
    buf.put_u16_le(setted);
    buf.freeze()
}

async fn wait_for<F>(events: &mut EventReceiver, mut pred: F) -> GatewayEvent
where
    F: FnMut(&GatewayEvent) -> bool,
{
    timeout(STEP, async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn setup() -> (
    DirectTcpTransport,
    Arc<Session>,
    FakeGateway,
    EventReceiver,
) {
    setup_with_timeout(500)
}

fn setup_with_timeout(
    command_timeout_ms: u64,
) -> (DirectTcpTransport, Arc<Session>, FakeGateway, EventReceiver) {
    let (client, server) = tokio::io::duplex(8192);
    let (reader, writer) = tokio::io::split(client);
    let (tx, events) = event_channel(256);
    let session = Arc::new(Session::new(tx));
    let config = GatewayConfig::builder()
        .command_timeout_ms(command_timeout_ms)
        .build();
    let transport = DirectTcpTransport::from_parts(reader, writer, &config, session.clone()).unwrap();
    let gateway = FakeGateway {
        stream: server,
        codec: FrameCodec::new(),
    };
    (transport, session, gateway, events)
}

/// Drive the session through handshake, discovery and status queries.
async fn bootstrap(session: &Session, gw: &mut FakeGateway, events: &mut EventReceiver) {
    let hello = gw.next_frame().await;
    assert_eq!((hello.device_id, hello.command), (0, 11));
    assert_eq!(hello.subbody.len(), 14);

    gw.send(0, 11, 0, Bytes::from_static(b"20260101120000")).await;
    let rooms_req = gw.next_frame().await;
    assert_eq!((rooms_req.device_id, rooms_req.command), (0, 8));
    assert_eq!(rooms_req.subbody_version, 1);
    assert_eq!(&rooms_req.subbody[..], &[1, 0xFF, 0xFF]);

    gw.send(0, 8, 1, room_info()).await;
    let event = wait_for(events, |e| matches!(e, GatewayEvent::RoomsDiscovered { .. })).await;
    assert!(matches!(event, GatewayEvent::RoomsDiscovered { rooms: 2, aircons: 2 }));

    let indoor = gw.next_frame().await;
    assert_eq!((indoor.device_id, indoor.command), (18, 22));
    let cap_ac = gw.next_frame().await;
    assert_eq!((cap_ac.device_id, cap_ac.command), (18, 23));
    assert_eq!(&cap_ac.subbody[..], &[1, 1, 1, 0]);
    let cap_new = gw.next_frame().await;
    assert_eq!((cap_new.device_id, cap_new.command), (23, 23));
    assert_eq!(&cap_new.subbody[..], &[1, 2, 1, 0]);
    assert!(!session.is_ready().await);

    gw.send(18, 23, 0, capability(1, 0)).await;
    let query = gw.next_frame().await;
    assert_eq!((query.device_id, query.command), (18, 11));
    assert_eq!(&query.subbody[..], &[1, 0, 0b0001_1011]);

    gw.send(23, 23, 0, capability(2, 0)).await;
    let query = gw.next_frame().await;
    assert_eq!((query.device_id, query.command), (23, 11));
    assert_eq!(&query.subbody[..], &[2, 0, 0b0001_1011]);

    gw.send(18, 11, 0, status(1, 0, 1, 4, 205, 220)).await;
    gw.send(23, 11, 0, status(2, 0, 0, 0, 260, 240)).await;
    wait_for(events, |e| matches!(e, GatewayEvent::Ready)).await;
    assert!(session.is_ready().await);
}

#[tokio::test]
async fn test_bootstrap_discovers_and_becomes_ready() {
    let (_transport, session, mut gw, mut events) = setup();
    bootstrap(&session, &mut gw, &mut events).await;

    let aircons = session.get_aircons().await;
    assert_eq!(aircons.len(), 2);

    let living = session
        .get_aircon(&DeviceKey::new(DeviceKind::AirCon, 1, 0))
        .await
        .unwrap();
    assert!(living.heat_mode && living.cool_mode && living.ventilation_mode);
    assert!(!living.dry_mode);
    assert_eq!(living.name, "AC1");
    assert_eq!(living.status.switch, Some(Switch::On));
    assert_eq!(living.status.mode, Some(Mode::Heat));
    assert_eq!(living.status.current_temp, Some(205));

    let bed = session
        .get_aircon(&DeviceKey::new(DeviceKind::NewAirCon, 2, 0))
        .await
        .unwrap();
    assert_eq!(bed.alias, "Master");
    assert_eq!(bed.display_name(), "Master");
    assert_eq!(bed.status.switch, Some(Switch::Off));

    let rooms = session.get_rooms().await;
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].name, "Living");
    assert_eq!(rooms[1].display_name(), "Master");
}

#[tokio::test]
async fn test_capability_after_ready_fires_hook_once() {
    let (_transport, session, mut gw, mut events) = setup();
    bootstrap(&session, &mut gw, &mut events).await;

    let key = DeviceKey::new(DeviceKind::AirCon, 1, 0);
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = calls.clone();
        session
            .register_status_hook(key, move |update| {
                assert!(matches!(update, HookUpdate::AirCon(ac) if ac.dry_mode));
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await;
    }

    // dry mode added
    gw.send(18, 23, 0, Bytes::from(vec![1, 1, 1, 0, 0b0001_0111, 0]))
        .await;
    wait_for(&mut events, |e| matches!(e, GatewayEvent::AirConUpdated { .. })).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // readiness already latched: no fresh status query
    let living = session.get_aircon(&key).await.unwrap();
    assert!(living.dry_mode);
    assert_eq!(living.status.mode, Some(Mode::Heat));
}

#[tokio::test]
async fn test_status_change_merges_and_notifies() {
    let (_transport, session, mut gw, mut events) = setup();
    bootstrap(&session, &mut gw, &mut events).await;

    let key = DeviceKey::new(DeviceKind::AirCon, 1, 0);
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        session
            .register_status_hook(key, move |update| {
                if let HookUpdate::Status(status) = update {
                    seen.lock().unwrap().push(status.clone());
                }
            })
            .await;
    }

    // target temperature only
    let mut body = BytesMut::new();
    body.put_slice(&[1, 0, 0b0001_0000]);
    body.put_u16_le(255);
    gw.send(18, 10, 0, body.freeze()).await;

    let event = wait_for(&mut events, |e| matches!(e, GatewayEvent::StatusChanged { .. })).await;
    let GatewayEvent::StatusChanged { status, .. } = event else {
        unreachable!()
    };
    assert_eq!(status.setted_temp, Some(255));
    assert_eq!(status.mode, Some(Mode::Heat));
    assert_eq!(status.switch, Some(Switch::On));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].setted_temp, Some(255));
}

#[tokio::test]
async fn test_control_updates_locally_and_sends() {
    let (_transport, session, mut gw, mut events) = setup();
    bootstrap(&session, &mut gw, &mut events).await;

    let key = DeviceKey::new(DeviceKind::AirCon, 1, 0);
    let off = AirConStatus {
        switch: Some(Switch::Off),
        ..Default::default()
    };
    session.control(key, off).await.unwrap();

    assert_eq!(
        session.get_aircon(&key).await.unwrap().status.switch,
        Some(Switch::Off)
    );
    let frame = gw.next_frame().await;
    assert_eq!((frame.device_id, frame.command), (18, 3));
    assert_eq!(&frame.subbody[..], &[1, 0, 0b0000_0001, 0]);

    let unknown = DeviceKey::new(DeviceKind::Bathroom, 9, 0);
    let err = session.control(unknown, AirConStatus::default()).await.unwrap_err();
    assert!(matches!(err, DsAirError::UnknownDevice { .. }));
}

#[tokio::test]
async fn test_execute_waits_for_matching_ack() {
    let (transport, _session, mut gw, _events) = setup();
    let _hello = gw.next_frame().await;

    let transport = Arc::new(transport);
    let waiter = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.execute(&Param::RecommendedIndoorTemp).await })
    };

    let frame = gw.next_frame().await;
    assert_eq!(frame.command, 22);
    // ack for some other sequence first
    gw.send_seq(frame.sequence + 100, 0, 1, 0, Bytes::new()).await;
    gw.send_seq(frame.sequence, 0, 1, 0, Bytes::new()).await;

    assert!(waiter.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_execute_times_out_without_ack() {
    let (transport, _session, mut gw, _events) = setup();
    let _hello = gw.next_frame().await;

    let err = transport.execute(&Param::all_rooms()).await.unwrap_err();
    assert!(matches!(err, DsAirError::CommandTimeout { .. }));
}

#[tokio::test]
async fn test_ack_with_version_upgrades_protocol() {
    let (_transport, session, mut gw, mut events) = setup();
    let _hello = gw.next_frame().await;

    gw.send(0, 1, 0, Bytes::from_static(&[2])).await;
    wait_for(&mut events, |e| matches!(e, GatewayEvent::ProtocolVersionChanged(_))).await;
    assert!(session.protocol_version().await.is_new());
}

#[tokio::test]
async fn test_bad_record_is_skipped() {
    let (transport, session, mut gw, mut events) = setup();
    let _hello = gw.next_frame().await;

    // truncated time sync, then a valid one
    gw.send(0, 3, 0, Bytes::from_static(&[1, 2])).await;
    gw.send(0, 3, 0, Bytes::from_static(&[7, 0, 0, 0])).await;

    let event = wait_for(&mut events, |e| matches!(e, GatewayEvent::TimeSync { .. })).await;
    assert!(matches!(event, GatewayEvent::TimeSync { time: 7 }));
    assert!(transport.is_connected().await);
    assert!(!session.is_ready().await);
}

#[tokio::test]
async fn test_malformed_stream_disconnects() {
    let (transport, _session, mut gw, mut events) = setup();
    let _hello = gw.next_frame().await;

    gw.stream.write_all(&[0x55, 0x00, 0x10]).await.unwrap();
    wait_for(&mut events, |e| matches!(e, GatewayEvent::Disconnected)).await;
    assert!(!transport.is_connected().await);
}

#[tokio::test]
async fn test_heartbeats_are_ignored() {
    let (transport, _session, mut gw, mut events) = setup();
    let _hello = gw.next_frame().await;

    gw.stream.write_all(&[0x02, 0x00, 0x00, 0x03]).await.unwrap();
    gw.send(0, 3, 0, Bytes::from_static(&[9, 0, 0, 0])).await;
    wait_for(&mut events, |e| matches!(e, GatewayEvent::TimeSync { time: 9 })).await;
    assert!(transport.is_connected().await);
}

#[tokio::test]
async fn test_unanswered_queued_command_reports_failure() {
    let (_transport, session, mut gw, mut events) = setup_with_timeout(50);
    let hello = gw.next_frame().await;
    gw.send_seq(hello.sequence, 0, 1, 0, Bytes::new()).await;

    session.send_msg(Param::RecommendedIndoorTemp).unwrap();
    let frame = gw.next_frame().await;
    assert_eq!(frame.command, 22);

    let mut failed = Vec::new();
    let event = wait_for(&mut events, |e| {
        if let GatewayEvent::CommandFailed { command, .. } = e {
            failed.push(*command);
            return *command == "recommended_indoor_temp";
        }
        false
    })
    .await;
    assert!(matches!(event, GatewayEvent::CommandFailed { error, .. } if error.contains("timeout")));
    // the acknowledged handshake never fails
    assert_eq!(failed, vec!["recommended_indoor_temp"]);
}

#[tokio::test]
async fn test_acked_queued_command_does_not_fail() {
    let (_transport, session, mut gw, mut events) = setup_with_timeout(50);
    let hello = gw.next_frame().await;
    gw.send_seq(hello.sequence, 0, 1, 0, Bytes::new()).await;

    session.send_msg(Param::RecommendedIndoorTemp).unwrap();
    let frame = gw.next_frame().await;
    gw.send_seq(frame.sequence, 0, 1, 0, Bytes::new()).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, GatewayEvent::CommandFailed { .. }), "{:?}", event);
    }
}

#[tokio::test]
async fn test_repeated_room_info_keeps_live_state() {
    let (_transport, session, mut gw, mut events) = setup();
    bootstrap(&session, &mut gw, &mut events).await;

    gw.send(0, 8, 1, room_info()).await;
    wait_for(&mut events, |e| matches!(e, GatewayEvent::RoomsDiscovered { .. })).await;

    assert!(session.is_ready().await);
    session.wait_ready(Duration::from_millis(10)).await.unwrap();
    assert_eq!(session.get_aircons().await.len(), 2);
    let living = session
        .get_aircon(&DeviceKey::new(DeviceKind::AirCon, 1, 0))
        .await
        .unwrap();
    assert!(living.heat_mode);
    assert_eq!(living.status.switch, Some(Switch::On));
    assert_eq!(living.status.setted_temp, Some(220));

    // capability replies are merged, not followed by a second status sweep
    let _indoor = gw.next_frame().await;
    let _cap_ac = gw.next_frame().await;
    let _cap_new = gw.next_frame().await;
    gw.send(18, 23, 0, capability(1, 0)).await;
    wait_for(&mut events, |e| matches!(e, GatewayEvent::AirConUpdated { .. })).await;
    session.send_msg(Param::RecommendedIndoorTemp).unwrap();
    let next = gw.next_frame().await;
    assert_eq!(next.command, 22);
}
