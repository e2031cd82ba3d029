// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use super::*;
use crate::api::bleuuid::uuid_from_u16;
use crate::api::CharPropFlags;
use crate::encoding::EncodingError;
use crate::mock::{Call, MockPeripheral, MockTransport, Operation};
use futures::FutureExt;
use std::sync::Mutex as StdMutex;
use uuid::Uuid;

fn uart() -> (Uuid, Uuid, Uuid, Uuid) {
    (
        uuid_from_u16(0xfff0),
        uuid_from_u16(0xfff1),
        uuid_from_u16(0xfff2),
        uuid_from_u16(0x2a26),
    )
}

fn mt60() -> MockPeripheral {
    let (service, rx, tx, firmware) = uart();
    MockPeripheral::new("mt60")
        .name("MT60")
        .service(
            service,
            [
                (rx, CharPropFlags::READ | CharPropFlags::NOTIFY),
                (tx, CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
                (firmware, CharPropFlags::READ),
            ],
        )
        .value(service, rx, b"hello")
        .value(service, firmware, b"v1.2")
}

fn rx() -> CharacteristicRef {
    let (service_uuid, uuid, _, _) = uart();
    CharacteristicRef { service_uuid, uuid }
}

fn id() -> PeripheralId {
    PeripheralId::from("mt60")
}

fn session_with(config: SessionConfig) -> (MockTransport, Session<MockTransport>) {
    let _ = pretty_env_logger::try_init();
    let transport = MockTransport::new();
    transport.add_peripheral(mt60());
    let session = Session::new(transport.clone(), config.event_capacity(64));
    (transport, session)
}

fn session() -> (MockTransport, Session<MockTransport>) {
    session_with(SessionConfig::default())
}

async fn connected() -> (MockTransport, Session<MockTransport>) {
    let (transport, session) = session();
    session.connect(&id()).await.unwrap();
    (transport, session)
}

/// Lets spawned tasks run until they are all waiting.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn drain(events: &mut SessionEventStream) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Some(Some(event)) = events.next().now_or_never() {
        seen.push(event);
    }
    seen
}

fn collector() -> (Arc<StdMutex<Vec<Notification>>>, impl Fn(Notification) + Send + Sync) {
    let received = Arc::new(StdMutex::new(Vec::new()));
    let sink = received.clone();
    (received, move |n| sink.lock().unwrap().push(n))
}

#[tokio::test(start_paused = true)]
async fn scan_reports_each_named_peripheral_once_then_times_out() {
    let (transport, session) = session();
    let mut events = session.events();

    session.scan().await.unwrap();
    assert_eq!(session.state(), SessionState::Scanning);
    assert!(transport.is_scanning());
    settle().await;

    transport.advertise(&id());
    transport.advertise(&id());
    transport.advertise_properties(PeripheralProperties::new("anonymous"));
    transport.advertise_properties(PeripheralProperties::new("blank").with_name(""));
    settle().await;

    let found = session.peripherals();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id());
    assert_eq!(found[0].local_name.as_deref(), Some("MT60"));
    assert_eq!(found[0].state, ConnectionState::Discovered);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!transport.is_scanning());

    let seen = drain(&mut events);
    let discovered = seen
        .iter()
        .filter(|e| matches!(e, SessionEvent::PeripheralDiscovered(_)))
        .count();
    assert_eq!(discovered, 1);
    assert_eq!(
        seen.last(),
        Some(&SessionEvent::ScanStopped { timed_out: true })
    );
    // The list survives the end of the scan.
    assert_eq!(session.peripherals().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_scan_replaces_the_first() {
    let (transport, session) = session();
    let mut events = session.events();

    session.scan().await.unwrap();
    settle().await;
    transport.advertise(&id());
    settle().await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    session.scan().await.unwrap();
    assert!(session.peripherals().is_empty());
    settle().await;

    // Past the first scan's deadline, inside the second's.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(session.state(), SessionState::Scanning);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(session.state(), SessionState::Idle);

    let stops: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::ScanStopped { timed_out } => Some(timed_out),
            _ => None,
        })
        .collect();
    assert_eq!(stops, vec![false, true]);
    let starts = transport
        .calls()
        .iter()
        .filter(|c| **c == Call::StartScan)
        .count();
    assert_eq!(starts, 2);
}

#[tokio::test(start_paused = true)]
async fn stop_scan_ends_early_and_is_idempotent() {
    let (transport, session) = session();
    let mut events = session.events();

    session.scan_for(Duration::from_secs(60)).await.unwrap();
    session.stop_scan().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!transport.is_scanning());

    session.stop_scan().await.unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;

    let stops = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::ScanStopped { .. }))
        .collect::<Vec<_>>();
    assert_eq!(stops, vec![SessionEvent::ScanStopped { timed_out: false }]);
}

#[tokio::test(start_paused = true)]
async fn scan_with_radio_off_is_unavailable() {
    let (transport, session) = session();
    transport.set_adapter_state(AdapterState::PoweredOff);

    let err = session.scan().await.unwrap_err();
    assert!(matches!(
        err,
        Error::TransportUnavailable(TransportError::PoweredOff)
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!transport.calls().contains(&Call::StartScan));
}

#[tokio::test(start_paused = true)]
async fn scan_start_failure_returns_to_idle() {
    let (transport, session) = session();
    transport.fail(Operation::StartScan, TransportError::Other("busy".into()));

    let err = session.scan().await.unwrap_err();
    assert!(matches!(
        err,
        Error::TransportOperationFailed {
            operation: "scan",
            ..
        }
    ));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn connect_builds_registry() {
    let (transport, session) = connected().await;

    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.connected_peripheral(), Some(id()));
    assert!(transport.is_connected(&id()));

    let registry = session.registry();
    assert_eq!(registry.len(Capability::Read), 2);
    assert_eq!(registry.len(Capability::WriteWithResponse), 1);
    assert_eq!(registry.len(Capability::WriteWithoutResponse), 1);
    assert_eq!(registry.len(Capability::Notify), 1);
    assert_eq!(registry.get(Capability::Notify, 0), Some(&rx()));

    let services = session.services();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].characteristics.len(), 3);
    assert_eq!(
        transport.calls(),
        vec![Call::Connect(id()), Call::DiscoverServices(id())]
    );
}

#[tokio::test(start_paused = true)]
async fn connect_stops_a_running_scan() {
    let (transport, session) = session();
    session.scan().await.unwrap();
    settle().await;
    transport.advertise(&id());
    settle().await;

    session.connect(&id()).await.unwrap();
    assert!(!transport.is_scanning());
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.peripherals()[0].state, ConnectionState::Connected);

    // The aborted scan timer never fires.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(session.state(), SessionState::Connected);

    session.disconnect().await.unwrap();
    assert_eq!(session.peripherals()[0].state, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn connect_failure_leaves_session_idle() {
    let (transport, session) = session();
    transport.fail(Operation::Connect, TransportError::Gatt("refused".into()));

    let err = session.connect(&id()).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed { ref id, .. } if *id == self::id()));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.registry().is_empty());
    assert_eq!(session.connected_peripheral(), None);

    transport.heal(Operation::Connect);
    session.connect(&id()).await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn connect_to_unknown_peripheral() {
    let (_, session) = session();
    let err = session.connect(&"nowhere".into()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ConnectionFailed {
            source: TransportError::DeviceNotFound,
            ..
        }
    ));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn discovery_failure_drops_the_link() {
    let (transport, session) = session();
    transport.fail(
        Operation::DiscoverServices,
        TransportError::Gatt("att error".into()),
    );

    let err = session.connect(&id()).await.unwrap_err();
    assert!(matches!(err, Error::DiscoveryFailed { .. }));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.services().is_empty());
    assert!(!transport.is_connected(&id()));
    assert!(transport.calls().contains(&Call::Disconnect(id())));
}

#[tokio::test(start_paused = true)]
async fn connect_times_out() {
    let (transport, session) =
        session_with(SessionConfig::default().connect_timeout(Duration::from_secs(1)));
    transport.set_delay(Operation::Connect, Duration::from_secs(5));

    let err = session.connect(&id()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ConnectionFailed {
            source: TransportError::TimedOut(t),
            ..
        } if t == Duration::from_secs(1)
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!transport.is_connected(&id()));
}

#[tokio::test(start_paused = true)]
async fn disconnect_supersedes_pending_connect() {
    let (transport, session) = session();
    transport.set_delay(Operation::Connect, Duration::from_secs(2));

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.connect(&id()).await }
    });
    settle().await;
    assert_eq!(session.state(), SessionState::Connecting);

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(Error::Superseded)));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.registry().is_empty());
    assert!(!transport.is_connected(&id()));
}

fn spawn_connect(
    session: &Session<MockTransport>,
    id: PeripheralId,
) -> tokio::task::JoinHandle<Result<()>> {
    let session = session.clone();
    tokio::spawn(async move { session.connect(&id).await })
}

#[tokio::test(start_paused = true)]
async fn second_connect_supersedes_pending_one() {
    let (transport, session) = session();
    transport.add_peripheral(MockPeripheral::new("mt61").name("MT61"));
    transport.set_delay(Operation::Connect, Duration::from_secs(2));
    let other = PeripheralId::from("mt61");

    let first = spawn_connect(&session, id());
    settle().await;
    let second = spawn_connect(&session, other.clone());
    settle().await;
    assert_eq!(session.state(), SessionState::Connecting);

    assert!(matches!(first.await.unwrap(), Err(Error::Superseded)));
    second.await.unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.connected_peripheral(), Some(other.clone()));
    assert!(!transport.is_connected(&id()));
    assert!(transport.is_connected(&other));
    assert!(transport.calls().contains(&Call::Disconnect(id())));
}

#[tokio::test(start_paused = true)]
async fn reconnecting_to_the_same_peripheral_keeps_the_link() {
    let (transport, session) = session();
    transport.set_delay(Operation::Connect, Duration::from_secs(2));

    let first = spawn_connect(&session, id());
    settle().await;
    let second = spawn_connect(&session, id());

    assert!(matches!(first.await.unwrap(), Err(Error::Superseded)));
    second.await.unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert!(transport.is_connected(&id()));
    assert!(!transport.calls().contains(&Call::Disconnect(id())));
    assert_eq!(session.read(0).await.unwrap(), "hello");
}

#[tokio::test(start_paused = true)]
async fn scan_supersedes_pending_connect() {
    let (transport, session) = session();
    transport.set_delay(Operation::Connect, Duration::from_secs(2));

    let pending = spawn_connect(&session, id());
    settle().await;
    session.scan().await.unwrap();
    assert_eq!(session.state(), SessionState::Scanning);

    assert!(matches!(pending.await.unwrap(), Err(Error::Superseded)));
    assert_eq!(session.state(), SessionState::Scanning);
    assert!(session.registry().is_empty());
    assert!(!transport.is_connected(&id()));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!transport.is_scanning());
}

#[tokio::test(start_paused = true)]
async fn scan_started_during_connect_setup_is_stopped() {
    let (transport, session) = session();
    let mut events = session.events();
    transport.set_delay(Operation::AdapterState, Duration::from_secs(1));

    // The connect waits on the adapter while a scan gets going.
    let pending = spawn_connect(&session, id());
    settle().await;
    transport.heal(Operation::AdapterState);
    session.scan().await.unwrap();
    assert!(transport.is_scanning());

    pending.await.unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert!(!transport.is_scanning());
    assert!(transport.calls().contains(&Call::StopScan));
    assert!(drain(&mut events).contains(&SessionEvent::ScanStopped { timed_out: false }));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(session.state(), SessionState::Connected);
    assert!(!transport.is_scanning());
}

#[tokio::test(start_paused = true)]
async fn scan_or_connect_while_connected_is_rejected() {
    let (_, session) = connected().await;

    assert!(matches!(
        session.scan().await,
        Err(Error::OperationOutOfState {
            operation: "scan",
            state: SessionState::Connected
        })
    ));
    assert!(matches!(
        session.connect(&id()).await,
        Err(Error::OperationOutOfState {
            operation: "connect",
            ..
        })
    ));
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn read_by_capability_index() {
    let (_, session) = connected().await;

    assert_eq!(session.read(0).await.unwrap(), "hello");
    assert_eq!(session.read(1).await.unwrap(), "v1.2");
    assert_eq!(session.buffers().last_read, Some(b"v1.2".to_vec()));
    assert_eq!(session.read_bytes(0).await.unwrap(), b"hello".to_vec());
}

#[tokio::test(start_paused = true)]
async fn malformed_stored_value_fails_the_read() {
    let _ = pretty_env_logger::try_init();
    let (service, rx, _, _) = uart();
    let transport = MockTransport::new();
    transport.add_peripheral(mt60().raw_value(service, rx, "%%%"));
    let session = Session::new(transport.clone(), SessionConfig::default());
    session.connect(&id()).await.unwrap();

    assert!(matches!(
        session.read(0).await,
        Err(Error::Encoding(EncodingError::InvalidBase64(_)))
    ));
    assert_eq!(session.buffers().last_read, None);
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.read(1).await.unwrap(), "v1.2");
}

#[tokio::test(start_paused = true)]
async fn read_out_of_range_makes_no_transport_call() {
    let (transport, session) = connected().await;
    transport.clear_calls();

    let err = session.read(2).await.unwrap_err();
    assert!(matches!(
        err,
        Error::IndexOutOfRange {
            capability: Capability::Read,
            index: 2,
            len: 2
        }
    ));
    assert!(matches!(
        session
            .write_without_response(5, Payload::text("x"))
            .await,
        Err(Error::IndexOutOfRange {
            capability: Capability::WriteWithoutResponse,
            ..
        })
    ));
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn operations_need_a_connection() {
    let (transport, session) = session();

    assert!(matches!(
        session.read(0).await,
        Err(Error::OperationOutOfState {
            operation: "read",
            state: SessionState::Idle
        })
    ));
    assert!(matches!(
        session.write(0, Payload::text("x")).await,
        Err(Error::OperationOutOfState {
            operation: "write",
            ..
        })
    ));
    assert!(matches!(
        session.notify(0, |_| {}).await,
        Err(Error::OperationOutOfState {
            operation: "notify",
            ..
        })
    ));
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn write_sends_the_callers_payload() {
    let (transport, session) = connected().await;

    session.write(0, Payload::text("MT+1")).await.unwrap();
    session.write(0, Payload::hex("0D0a")).await.unwrap();
    session.write(0, Payload::from(vec![0xff, 0x00])).await.unwrap();

    assert_eq!(
        transport.written(),
        vec![
            EncodedValue::from_bytes(b"MT+1"),
            EncodedValue::from_bytes(&[0x0d, 0x0a]),
            EncodedValue::from_bytes(&[0xff, 0x00]),
        ]
    );
    assert_eq!(session.buffers().last_written, Some(vec![0xff, 0x00]));
    assert!(transport
        .calls()
        .iter()
        .all(|c| !matches!(c, Call::Write(_, _, _, WriteType::WithoutResponse))));
}

#[tokio::test(start_paused = true)]
async fn write_without_response_uses_its_own_list() {
    let (transport, session) = connected().await;
    let (service_uuid, _, tx, _) = uart();

    session
        .write_without_response(0, Payload::base64("TVQ="))
        .await
        .unwrap();
    assert_eq!(
        transport.calls().last(),
        Some(&Call::Write(
            id(),
            CharacteristicRef {
                service_uuid,
                uuid: tx
            },
            EncodedValue::from_bytes(b"MT"),
            WriteType::WithoutResponse
        ))
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_is_not_sent() {
    let (transport, session) = connected().await;
    transport.clear_calls();

    let err = session.write(0, Payload::hex("abc")).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::OddLength(3))
    ));
    assert!(transport.written().is_empty());
    assert_eq!(session.buffers().last_written, None);
}

#[tokio::test(start_paused = true)]
async fn write_failure_keeps_connection() {
    let (transport, session) = connected().await;
    transport.fail(Operation::Write, TransportError::Gatt("rejected".into()));

    let err = session.write(0, Payload::text("x")).await.unwrap_err();
    assert!(matches!(
        err,
        Error::TransportOperationFailed {
            operation: "write",
            source: TransportError::Gatt(_)
        }
    ));
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn notify_delivers_until_cancelled() {
    let (transport, session) = connected().await;
    let (received, on_value) = collector();

    let subscription = session.notify(0, on_value).await.unwrap();
    assert!(subscription.is_active());
    assert!(transport.is_subscribed(&id(), &rx()));

    transport.notify(&id(), rx(), b"abc");
    settle().await;
    {
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].text(), "abc");
        assert_eq!(received[0].hex(), "616263");
        assert_eq!(received[0].characteristic, rx());
    }
    assert_eq!(session.buffers().last_received, Some(b"abc".to_vec()));

    subscription.cancel().await.unwrap();
    assert!(!transport.is_subscribed(&id(), &rx()));
    transport.notify(&id(), rx(), b"def");
    settle().await;
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn undecodable_notification_is_skipped() {
    let (transport, session) = connected().await;
    let (received, on_value) = collector();
    let _subscription = session.notify(0, on_value).await.unwrap();

    transport.notify_raw(&id(), rx(), "not base64!");
    transport.notify(&id(), rx(), b"ok");
    settle().await;

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].text(), "ok");
    assert_eq!(session.buffers().last_received, Some(b"ok".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn subscription_that_lost_its_connection_is_undone() {
    let (transport, session) = connected().await;
    transport.set_delay(Operation::Subscribe, Duration::from_secs(1));

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.notify(0, |_| {}).await.map(|s| s.is_active()) }
    });
    settle().await;
    session.disconnect().await.unwrap();
    transport.heal(Operation::Subscribe);
    session.connect(&id()).await.unwrap();

    assert!(matches!(pending.await.unwrap(), Err(Error::Superseded)));
    assert!(!transport.is_subscribed(&id(), &rx()));
    assert!(transport.calls().contains(&Call::Unsubscribe(id(), rx())));
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn resubscribing_replaces_previous_subscription() {
    let (transport, session) = connected().await;
    let (first, on_first) = collector();
    let (second, on_second) = collector();

    let old = session.notify(0, on_first).await.unwrap();
    let new = session.notify(0, on_second).await.unwrap();
    assert!(!old.is_active());
    assert!(new.is_active());

    transport.notify(&id(), rx(), b"x");
    settle().await;
    assert!(first.lock().unwrap().is_empty());
    assert_eq!(second.lock().unwrap().len(), 1);

    // Cancelling the replaced handle leaves the live one alone.
    old.cancel().await.unwrap();
    assert!(new.is_active());
    assert!(transport.is_subscribed(&id(), &rx()));
}

#[tokio::test(start_paused = true)]
async fn disconnect_clears_everything_and_is_idempotent() {
    let (transport, session) = connected().await;
    let mut events = session.events();
    let (received, on_value) = collector();
    let subscription = session.notify(0, on_value).await.unwrap();
    session.read(0).await.unwrap();

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.registry().is_empty());
    assert!(session.services().is_empty());
    assert_eq!(session.buffers(), Buffers::default());
    assert!(!subscription.is_active());
    assert!(!transport.is_connected(&id()));

    transport.notify(&id(), rx(), b"late");
    settle().await;
    assert!(received.lock().unwrap().is_empty());

    session.disconnect().await.unwrap();
    let disconnects = transport
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Disconnect(_)))
        .count();
    assert_eq!(disconnects, 1);

    let seen = drain(&mut events);
    assert_eq!(
        seen,
        vec![
            SessionEvent::StateChanged(SessionState::Idle),
            SessionEvent::Disconnected {
                id: id(),
                cause: DisconnectCause::User
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn peripheral_side_disconnect_resets_session() {
    let (transport, session) = connected().await;
    let mut events = session.events();
    let subscription = session.notify(0, |_| {}).await.unwrap();

    transport.drop_link(&id());
    settle().await;

    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.registry().is_empty());
    assert!(!subscription.is_active());
    assert!(drain(&mut events).contains(&SessionEvent::Disconnected {
        id: id(),
        cause: DisconnectCause::Peripheral
    }));

    // Nothing left to tear down.
    transport.clear_calls();
    session.disconnect().await.unwrap();
    assert!(transport.calls().is_empty());
    subscription.cancel().await.unwrap();
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn radio_power_loss_ends_connection() {
    let (transport, session) = connected().await;
    let mut events = session.events();

    transport.set_adapter_state(AdapterState::PoweredOff);
    settle().await;

    assert_eq!(session.state(), SessionState::Idle);
    let seen = drain(&mut events);
    assert!(seen.contains(&SessionEvent::AdapterStateChanged(AdapterState::PoweredOff)));
    assert!(seen.contains(&SessionEvent::Disconnected {
        id: id(),
        cause: DisconnectCause::Peripheral
    }));
}

#[tokio::test(start_paused = true)]
async fn stale_link_loss_does_not_touch_new_connection() {
    let (transport, session) = connected().await;
    session.disconnect().await.unwrap();
    session.connect(&id()).await.unwrap();

    // Only the observer of the current connection reacts, and only to its own peripheral.
    transport.drop_link(&PeripheralId::from("someone-else"));
    settle().await;
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.read(0).await.unwrap(), "hello");
}
