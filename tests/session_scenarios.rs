//! End-to-end session behavior over in-memory transports.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use etp_devkit::codec::{Encoding, MessageFlags, MessageHeader};
use etp_devkit::config::SessionConfig;
use etp_devkit::correlation::{CancelReason, RequestError};
use etp_devkit::error::{ErrorCode, ProtocolFault};
use etp_devkit::handlers::memory::sample_object;
use etp_devkit::handlers::{
    customer_registry, store_registry, DiscoveryCustomerHandler, DiscoveryStoreHandler, MemoryStore,
    NotificationCustomerHandler, NotificationStoreHandler, StoreCustomerHandler,
};
use etp_devkit::messages::{
    current_date_time, EtpMessage, GetObject, GetResources, MessageBody, MessageKind,
    NotificationRequest, NotificationRequestRecord, Ping, Pong, ProtocolException, Protocol, Raw,
    RawPayload, Role,
};
use etp_devkit::registry::{HandlerRegistry, ProtocolHandler};
use etp_devkit::session::SessionPhase;
use etp_devkit::subscription::SubscriptionEvent;
use etp_devkit::transport::memory;
use etp_devkit::version::EtpVersion;
use etp_devkit::{Session, SessionError, SessionOptions};

mod common;
use common::{codec, connect, connect_to_store, eventually, frame, within};

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.seed_sample_wells();
    store
}

/// GrowingObject endpoint with an opaque payload: answers message type 1
/// with the bytes reversed and rejects anything else.
struct ReversingGrowingObject(Role);

impl ProtocolHandler for ReversingGrowingObject {
    fn protocol(&self) -> Protocol {
        Protocol::GROWING_OBJECT
    }

    fn role(&self) -> Role {
        self.0
    }

    fn handle_message(&self, session: &Session, message: &EtpMessage) -> Result<(), ProtocolFault> {
        match message.body() {
            MessageBody::Raw(Raw {
                message_type: 1,
                payload: RawPayload::Binary(bytes),
                ..
            }) => {
                let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
                session.respond(message.header(), Raw::binary(Protocol::GROWING_OBJECT, 2, reversed))?;
                Ok(())
            }
            _ => Err(ProtocolFault::not_found("no such growing object")),
        }
    }
}

/// Accepts GetResources and never answers.
struct SilentDiscovery;

impl ProtocolHandler for SilentDiscovery {
    fn protocol(&self) -> Protocol {
        Protocol::DISCOVERY
    }

    fn role(&self) -> Role {
        Role::Store
    }

    fn handle_message(&self, _session: &Session, _message: &EtpMessage) -> Result<(), ProtocolFault> {
        Ok(())
    }
}

#[tokio::test]
async fn negotiates_only_common_protocols() {
    let server_registry =
        HandlerRegistry::new().with(Arc::new(DiscoveryStoreHandler::new(seeded_store())));
    let c = connect(EtpVersion::V12, Encoding::Binary, customer_registry(), server_registry).await;

    let state = c.client.state().unwrap();
    assert_eq!(state.protocol_numbers(), vec![Protocol::DISCOVERY]);
    assert_eq!(state.local_role(Protocol::DISCOVERY), Some(Role::Customer));
    assert_eq!(
        c.server.state().unwrap().local_role(Protocol::DISCOVERY),
        Some(Role::Store)
    );

    let err = c
        .client
        .request(GetObject {
            uri: "eml:///witsml1411/well(1)".into(),
        })
        .unwrap_err();
    assert!(matches!(err, SessionError::UnsupportedProtocol(p) if p == Protocol::STORE));
}

#[tokio::test]
async fn get_resources_streams_one_part_per_resource() {
    let c = connect_to_store(EtpVersion::V12, Encoding::Binary, seeded_store()).await;
    let discovery = c.client.handler::<DiscoveryCustomerHandler>().unwrap();

    let root = within(discovery.get_resources(&c.client, "/")).await.unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].uri, "eml:///witsml1411");
    assert_eq!(root[0].has_children, 3);

    let pending = c
        .client
        .request(GetResources {
            uri: "eml:///witsml1411".into(),
        })
        .unwrap();
    let request_id = pending.request_id();
    let response = within(pending.wait()).await.unwrap();
    assert_eq!(response.len(), 3);
    for part in response.parts() {
        assert_eq!(part.header().correlation_id, request_id);
        assert!(part.header().message_flags.is_multi_part());
    }
    assert!(response.parts()[2].header().message_flags.is_final_part());
    assert!(!response.parts()[0].header().message_flags.is_final_part());
}

#[tokio::test]
async fn empty_result_is_acknowledged_without_data() {
    let c = connect_to_store(EtpVersion::V12, Encoding::Binary, Arc::new(MemoryStore::new())).await;

    let response = within(
        c.client
            .request(GetResources { uri: "/".into() })
            .unwrap()
            .wait(),
    )
    .await
    .unwrap();
    assert!(response.is_empty());

    let discovery = c.client.handler::<DiscoveryCustomerHandler>().unwrap();
    assert!(within(discovery.get_resources(&c.client, "/")).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_uri_surfaces_the_store_exception() {
    let c = connect_to_store(EtpVersion::V12, Encoding::Binary, seeded_store()).await;
    let discovery = c.client.handler::<DiscoveryCustomerHandler>().unwrap();

    let err = within(discovery.get_resources(&c.client, "eml:///nowhere"))
        .await
        .unwrap_err();
    match err {
        SessionError::Request(RequestError::Exception(exception)) => {
            assert_eq!(exception.error_code, ErrorCode::NotFound.code());
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(c.client.is_open());
}

#[tokio::test]
async fn store_round_trip_over_json() {
    let store = Arc::new(MemoryStore::new());
    let c = connect_to_store(EtpVersion::V11, Encoding::Json, store.clone()).await;
    let customer = c.client.handler::<StoreCustomerHandler>().unwrap();

    let object = sample_object("eml:///witsml1411/well(9)", "Well 09", "well");
    within(customer.put_object(&c.client, object.clone())).await.unwrap();
    assert_eq!(store.len(), 1);

    let fetched = within(customer.get_object(&c.client, "eml:///witsml1411/well(9)"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.data, object.data);
    assert_eq!(fetched.resource.name, "Well 09");

    within(customer.delete_object(&c.client, "eml:///witsml1411/well(9)"))
        .await
        .unwrap();
    assert!(store.is_empty());
    let err = within(customer.get_object(&c.client, "eml:///witsml1411/well(9)"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Request(RequestError::Exception(ProtocolException { error_code: 11, .. }))
    ));
}

#[tokio::test]
async fn pushes_are_routed_by_subscription_key() {
    let store = seeded_store();
    let c = connect_to_store(EtpVersion::V12, Encoding::Binary, store.clone()).await;
    let notifications = c.client.handler::<NotificationCustomerHandler>().unwrap();

    let mut subscription = notifications
        .subscribe(&c.client, "eml:///witsml1411/well(1)", Vec::new(), false)
        .unwrap();
    eventually(|| c.server.subscriptions().len() == 1).await;

    store.put(sample_object("eml:///witsml1411/well(2)/wellbore(29)", "elsewhere", "wellbore"));
    store.put(sample_object("eml:///witsml1411/well(1)/wellbore(19)", "here", "wellbore"));

    let event = within(subscription.next()).await.unwrap();
    let SubscriptionEvent::Notification(message) = event else {
        panic!("expected a notification, got {event:?}");
    };
    assert_eq!(message.header().correlation_id, 0);
    match message.body() {
        MessageBody::ChangeNotification(change) => {
            assert_eq!(change.request_uuid, subscription.key());
            assert_eq!(change.change.data_object.resource.uri, "eml:///witsml1411/well(1)/wellbore(19)");
            assert!(change.change.data_object.data.is_empty());
        }
        other => panic!("unexpected body {other:?}"),
    }

    store.delete("eml:///witsml1411/well(1)/wellbore(19)");
    let event = within(subscription.next()).await.unwrap();
    assert!(matches!(
        event,
        SubscriptionEvent::Notification(ref m) if m.kind() == MessageKind::DeleteNotification
    ));

    let key = subscription.key().to_string();
    subscription.cancel().unwrap();
    assert!(c.client.subscriptions().lookup(&key).is_none());
    eventually(|| c.server.subscriptions().is_empty()).await;
}

#[tokio::test]
async fn close_cancels_pending_requests_and_subscriptions() {
    let store = Arc::new(MemoryStore::new());
    let server_registry = HandlerRegistry::new()
        .with(Arc::new(SilentDiscovery))
        .with(Arc::new(NotificationStoreHandler::new(store)));
    let c = connect(EtpVersion::V12, Encoding::Binary, customer_registry(), server_registry).await;

    let pending = c.client.request(GetResources { uri: "/".into() }).unwrap();
    let notifications = c.client.handler::<NotificationCustomerHandler>().unwrap();
    let mut subscription = notifications.subscribe(&c.client, "/", Vec::new(), true).unwrap();
    assert_eq!(c.client.pending_requests(), 1);

    within(c.client.close("done")).await;
    assert_eq!(c.client.phase(), SessionPhase::Closed);
    assert_eq!(c.client.pending_requests(), 0);

    assert!(matches!(
        within(pending.wait()).await,
        Err(RequestError::Cancelled(CancelReason::ConnectionClosed))
    ));
    assert_eq!(within(subscription.next()).await, Some(SubscriptionEvent::Closed));
    assert_eq!(within(subscription.next()).await, None);

    // CloseSession reached the server, which closed without echoing it.
    within(c.server.closed()).await;
    assert_eq!(c.server.phase(), SessionPhase::Closed);

    assert!(matches!(
        c.client.send(GetResources { uri: "/".into() }),
        Err(SessionError::Closed)
    ));
    // Closing twice is harmless.
    within(c.client.close("again")).await;
}

#[tokio::test]
async fn ping_is_a_v12_feature() {
    let c = connect_to_store(EtpVersion::V12, Encoding::Json, seeded_store()).await;
    within(c.client.ping()).await.unwrap();

    let c = connect_to_store(EtpVersion::V11, Encoding::Binary, seeded_store()).await;
    assert!(matches!(
        c.client.ping().await,
        Err(SessionError::UnsupportedMessage(MessageKind::Ping, EtpVersion::V11))
    ));
}

#[tokio::test]
async fn token_renewal_updates_both_sides() {
    for version in [EtpVersion::V11, EtpVersion::V12] {
        let c = connect_to_store(version, Encoding::Binary, seeded_store()).await;
        within(c.client.renew_security_token("fresh-token")).await.unwrap();

        assert_eq!(
            c.client.state().unwrap().authorization.as_deref(),
            Some("fresh-token")
        );
        eventually(|| {
            c.server.state().and_then(|s| s.authorization.clone()).as_deref() == Some("fresh-token")
        })
        .await;
    }
}

#[tokio::test]
async fn handlers_cannot_be_added_after_attach() {
    let c = connect_to_store(EtpVersion::V12, Encoding::Binary, seeded_store()).await;
    let err = c
        .client
        .register_handler(Arc::new(DiscoveryCustomerHandler::new()))
        .unwrap_err();
    assert!(matches!(err, SessionError::Registry(_)));
}

#[tokio::test]
async fn non_core_traffic_before_open_is_rejected() {
    let (handle, mut probe) = memory::probe();
    let server = Session::new(
        SessionOptions::server(EtpVersion::V12, Encoding::Binary),
        store_registry(seeded_store(), 100),
    )
    .unwrap();
    server.attach(handle).unwrap();
    let codec = codec(EtpVersion::V12, Encoding::Binary);

    probe
        .send(frame(&codec, EtpVersion::V12, 7, 0, MessageFlags::NONE, GetResources { uri: "/".into() }))
        .await;
    let reply = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(reply.header().correlation_id, 7);
    match reply.body() {
        MessageBody::ProtocolException(e) => assert_eq!(e.error_code, ErrorCode::InvalidState.code()),
        other => panic!("unexpected body {other:?}"),
    }
    assert_eq!(server.phase(), SessionPhase::Opening);
}

#[tokio::test]
async fn faults_are_correlated_and_exceptions_never_answered() {
    let (handle, mut probe) = memory::probe();
    let server = Session::new(
        SessionOptions::server(EtpVersion::V12, Encoding::Binary),
        store_registry(seeded_store(), 100),
    )
    .unwrap();
    server.attach(handle).unwrap();
    let codec = codec(EtpVersion::V12, Encoding::Binary);
    let v12 = EtpVersion::V12;

    let customer = Session::new(SessionOptions::client(v12, Encoding::Binary), customer_registry()).unwrap();
    probe
        .send(frame(&codec, v12, 1, 0, MessageFlags::NONE, customer.build_request_session()))
        .await;
    let open = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(open.kind(), MessageKind::OpenSession);
    assert_eq!(open.header().correlation_id, 1);
    assert!(server.is_open());

    // Unknown protocol: answered on Core.
    let header = MessageHeader::new(Protocol(99), 1, 0, MessageFlags::NONE).with_message_id(2);
    let unknown = codec
        .encode(&EtpMessage::new(header, GetResources { uri: "/".into() }))
        .unwrap();
    probe.send(unknown).await;
    let reply = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(reply.header().protocol, Protocol::CORE);
    assert_eq!(reply.header().correlation_id, 2);
    assert!(matches!(
        reply.body(),
        MessageBody::ProtocolException(e) if e.error_code == ErrorCode::UnsupportedProtocol.code()
    ));

    // Compressed bodies are refused.
    probe
        .send(frame(&codec, v12, 3, 0, MessageFlags::COMPRESSED, GetResources { uri: "/".into() }))
        .await;
    let reply = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(reply.header().correlation_id, 3);
    assert!(matches!(
        reply.body(),
        MessageBody::ProtocolException(e) if e.error_code == ErrorCode::CompressionNotSupported.code()
    ));

    // An exception gets no reply; the following Ping is answered directly.
    let exception = ProtocolFault::new(ErrorCode::InvalidArgument, "bogus").to_exception();
    probe
        .send(frame(&codec, v12, 4, 0, MessageFlags::NONE, exception))
        .await;
    probe
        .send(frame(&codec, v12, 5, 0, MessageFlags::NONE, Ping {
            current_date_time: current_date_time(),
        }))
        .await;
    let reply = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(reply.kind(), MessageKind::Pong);
    assert_eq!(reply.header().correlation_id, 5);
}

#[tokio::test]
async fn peer_disconnect_closes_the_session() {
    let (handle, probe) = memory::probe();
    let client = Session::new(
        SessionOptions::client(EtpVersion::V12, Encoding::Binary),
        customer_registry(),
    )
    .unwrap();
    client.attach(handle).unwrap();
    let opening = {
        let client = client.clone();
        tokio::spawn(async move { client.open().await })
    };
    eventually(|| client.pending_requests() == 1).await;

    probe.close().await;
    within(client.closed()).await;
    assert_eq!(client.phase(), SessionPhase::Closed);
    assert!(within(opening).await.unwrap().is_err());
}

#[tokio::test]
async fn uncatalogued_protocols_flow_once_negotiated() {
    let server_registry = HandlerRegistry::new()
        .with(Arc::new(DiscoveryStoreHandler::new(seeded_store())))
        .with(Arc::new(ReversingGrowingObject(Role::Store)));
    let client_registry = customer_registry().with(Arc::new(ReversingGrowingObject(Role::Customer)));
    let c = connect(EtpVersion::V12, Encoding::Binary, client_registry, server_registry).await;

    assert!(c.client.state().unwrap().supports(Protocol::GROWING_OBJECT));
    assert_eq!(
        c.server.state().unwrap().local_role(Protocol::GROWING_OBJECT),
        Some(Role::Store)
    );

    let response = within(
        c.client
            .request(Raw::binary(Protocol::GROWING_OBJECT, 1, vec![1, 2, 3]))
            .unwrap()
            .wait(),
    )
    .await
    .unwrap();
    let bodies: Vec<MessageBody> = response.bodies().cloned().collect();
    assert_eq!(
        bodies,
        vec![MessageBody::Raw(Raw::binary(Protocol::GROWING_OBJECT, 2, vec![3, 2, 1]))]
    );

    // The handler's fault comes back as an exception on the same protocol.
    let err = within(
        c.client
            .request(Raw::binary(Protocol::GROWING_OBJECT, 7, Vec::new()))
            .unwrap()
            .wait(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::NotFound));

    assert!(matches!(
        c.client.send(Raw::binary(Protocol(24), 1, Vec::new())),
        Err(SessionError::UnsupportedProtocol(p)) if p == Protocol(24)
    ));
    assert!(matches!(
        c.client.send(Raw::binary(Protocol::DISCOVERY, 1, Vec::new())),
        Err(SessionError::RawForCataloguedProtocol(_))
    ));
}

#[tokio::test]
async fn store_subscriptions_survive_exceptions_about_store_messages() {
    let store = Arc::new(MemoryStore::new());
    let (handle, mut probe) = memory::probe();
    let server = Session::new(
        SessionOptions::server(EtpVersion::V12, Encoding::Binary),
        store_registry(store.clone(), 100),
    )
    .unwrap();
    server.attach(handle).unwrap();
    let codec = codec(EtpVersion::V12, Encoding::Binary);
    let v12 = EtpVersion::V12;

    let customer = Session::new(SessionOptions::client(v12, Encoding::Binary), customer_registry()).unwrap();
    probe
        .send(frame(&codec, v12, 1, 0, MessageFlags::NONE, customer.build_request_session()))
        .await;
    let open = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(open.kind(), MessageKind::OpenSession);

    let subscribe = NotificationRequest {
        request: NotificationRequestRecord {
            uri: "/".into(),
            uuid: "K".into(),
            include_object_data: false,
            start_time: 0,
            object_types: Vec::new(),
        },
    };
    probe
        .send(frame(&codec, v12, 2, 0, MessageFlags::NONE, subscribe))
        .await;
    eventually(|| server.subscriptions().lookup("K").is_some()).await;

    store.put(sample_object("eml:///witsml1411/well(1)", "Well 1", "well"));
    let push = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(push.kind(), MessageKind::ChangeNotification);
    // The store's push and the customer's subscribe share a message id.
    assert_eq!(push.header().message_id, 2);

    let header = MessageHeader::new(Protocol::STORE_NOTIFICATION, 1000, push.header().message_id, MessageFlags::FINAL_PART)
        .with_message_id(3);
    let exception = ProtocolFault::invalid_argument("push refused").to_exception();
    probe
        .send(codec.encode(&EtpMessage::new(header, exception)).unwrap())
        .await;
    probe
        .send(frame(&codec, v12, 4, 0, MessageFlags::NONE, Ping {
            current_date_time: current_date_time(),
        }))
        .await;
    let pong = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(pong.kind(), MessageKind::Pong);
    assert!(server.subscriptions().lookup("K").is_some());

    store.put(sample_object("eml:///witsml1411/well(2)", "Well 2", "well"));
    let push = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(push.kind(), MessageKind::ChangeNotification);
}

#[tokio::test]
async fn dropping_a_subscription_handle_cancels_it() {
    let store = seeded_store();
    let c = connect_to_store(EtpVersion::V12, Encoding::Binary, store.clone()).await;
    let notifications = c.client.handler::<NotificationCustomerHandler>().unwrap();

    let subscription = notifications.subscribe(&c.client, "/", Vec::new(), false).unwrap();
    let key = subscription.key().to_string();
    eventually(|| c.server.subscriptions().len() == 1).await;

    drop(subscription);
    assert!(c.client.subscriptions().lookup(&key).is_none());
    eventually(|| c.server.subscriptions().is_empty()).await;

    let mut unclaimed = notifications.notifications();
    store.put(sample_object("eml:///witsml1411/well(7)", "Well 7", "well"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(unclaimed.try_recv().is_err());
    assert!(c.client.is_open());
}

#[tokio::test(start_paused = true)]
async fn keepalive_pings_and_closes_when_a_ping_goes_unanswered() {
    let config = SessionConfig {
        keepalive_interval_secs: 2,
        request_timeout_secs: 1,
        ..SessionConfig::default()
    };
    let (handle, mut probe) = memory::probe();
    let server = Session::new(
        SessionOptions::server(EtpVersion::V12, Encoding::Binary).with_config(config),
        store_registry(seeded_store(), 100),
    )
    .unwrap();
    server.attach(handle).unwrap();
    let codec = codec(EtpVersion::V12, Encoding::Binary);
    let v12 = EtpVersion::V12;

    let customer = Session::new(SessionOptions::client(v12, Encoding::Binary), customer_registry()).unwrap();
    probe
        .send(frame(&codec, v12, 1, 0, MessageFlags::NONE, customer.build_request_session()))
        .await;
    let open = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(open.kind(), MessageKind::OpenSession);
    let opened_at = tokio::time::Instant::now();

    let ping = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(ping.kind(), MessageKind::Ping);
    assert!(opened_at.elapsed() >= Duration::from_secs(2));
    probe
        .send(frame(&codec, v12, 2, ping.header().message_id, MessageFlags::FINAL_PART, Pong {
            current_date_time: current_date_time(),
        }))
        .await;

    let unanswered = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(unanswered.kind(), MessageKind::Ping);
    assert!(server.is_open());

    let close = codec.decode(&within(probe.next_frame()).await.unwrap()).unwrap();
    assert_eq!(close.kind(), MessageKind::CloseSession);
    within(server.closed()).await;
    assert_eq!(server.phase(), SessionPhase::Closed);
    assert!(within(probe.next_frame()).await.is_none());
}

/// Sends `tasks * per_task` pings from concurrent tasks and returns the
/// message ids in the order they reached the wire.
async fn send_pings_concurrently(tasks: usize, per_task: usize) -> Vec<i64> {
    let (handle, mut probe) = memory::probe();
    let client = Session::new(
        SessionOptions::client(EtpVersion::V12, Encoding::Binary),
        customer_registry(),
    )
    .unwrap();
    client.attach(handle).unwrap();

    let senders: Vec<_> = (0..tasks)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                for _ in 0..per_task {
                    let pending = client
                        .request(Ping {
                            current_date_time: current_date_time(),
                        })
                        .unwrap();
                    drop(pending);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for sender in senders {
        sender.await.unwrap();
    }

    let codec = codec(EtpVersion::V12, Encoding::Binary);
    let mut ids = Vec::new();
    while let Some(frame) = probe.try_next_frame() {
        ids.push(codec.decode(&frame).unwrap().header().message_id);
    }
    ids
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn concurrent_senders_get_increasing_ids_in_wire_order(tasks in 1usize..10, per_task in 1usize..30) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        let ids = runtime.block_on(send_pings_concurrently(tasks, per_task));

        prop_assert_eq!(ids.len(), tasks * per_task);
        prop_assert!(ids[0] > 0);
        prop_assert!(ids.windows(2).all(|pair| pair[1] == pair[0] + 1));
    }
}
