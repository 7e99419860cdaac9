//! Integration tests for the broker core
//!
//! Clients are modelled the way a transport would drive the broker: each one
//! owns the receiving end of a [`ChannelConnection`] and goes through
//! `init_session` / `release_session`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::timeout;

use vibemq_core::broker::{
    Broker, BrokerConfig, ChannelConnection, ConnectAck, ConnectRequest, ReleaseReason,
};
use vibemq_core::config::Config;
use vibemq_core::protocol::{Publish, QoS};
use vibemq_core::session::WillMessage;

struct TestClient {
    ack: ConnectAck,
    rx: mpsc::Receiver<Publish>,
}

impl TestClient {
    fn connect(broker: &Broker, request: ConnectRequest) -> Self {
        let (conn, rx) = ChannelConnection::channel(64);
        let ack = broker.init_session(request, Arc::new(conn)).unwrap();
        Self { ack, rx }
    }

    fn id(&self) -> &str {
        &self.ack.client_id
    }

    fn subscribe(&self, broker: &Broker, filter: &str, qos: QoS) -> QoS {
        broker.subscribe(filter, self.id(), qos).unwrap()
    }

    fn release(&self, broker: &Broker, reason: ReleaseReason) -> bool {
        let token = self.ack.token;
        broker.release_session(self.id(), token, reason).unwrap()
    }

    async fn recv(&mut self) -> Publish {
        timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("timed out waiting for publish")
            .expect("connection closed")
    }

    fn assert_idle(&mut self) {
        assert!(
            self.rx.try_recv().is_err(),
            "unexpected publish for {}",
            self.id()
        );
    }
}

fn send(broker: &Broker, topic: &str, payload: &'static [u8], qos: QoS, retain: bool) {
    let payload = Bytes::from_static(payload);
    broker.publish(topic, payload, qos, retain).unwrap();
}

fn summary(publish: &Publish) -> (&str, &[u8], QoS, bool) {
    (
        &publish.topic,
        &publish.payload,
        publish.qos,
        publish.retain,
    )
}

#[tokio::test]
async fn test_sensor_readings_with_retained_replay() {
    let broker = Broker::default();

    let mut a = TestClient::connect(&broker, ConnectRequest::new("A", true));
    a.subscribe(&broker, "sensors/+/temp", QoS::AtLeastOnce);

    let topic = "sensors/room1/temp";
    send(&broker, topic, b"21.5", QoS::AtLeastOnce, true);

    let received = a.recv().await;
    assert_eq!(
        summary(&received),
        (topic, &b"21.5"[..], QoS::AtLeastOnce, false)
    );

    let mut b = TestClient::connect(&broker, ConnectRequest::new("B", true));
    b.subscribe(&broker, "sensors/#", QoS::AtMostOnce);

    let replayed = b.recv().await;
    assert_eq!(
        summary(&replayed),
        (topic, &b"21.5"[..], QoS::AtMostOnce, true)
    );
    a.assert_idle();
    b.assert_idle();
}

#[tokio::test]
async fn test_persistent_session_survives_reconnect() {
    let broker = Broker::default();

    let topic = "commands/device-1";

    let first = TestClient::connect(&broker, ConnectRequest::new("device-1", false));
    first.subscribe(&broker, topic, QoS::ExactlyOnce);
    assert!(first.release(&broker, ReleaseReason::Disconnect));

    send(&broker, topic, b"reboot", QoS::AtLeastOnce, false);

    let mut second = TestClient::connect(&broker, ConnectRequest::new("device-1", false));
    assert!(second.ack.session_present);

    let queued = second.recv().await;
    assert_eq!(
        summary(&queued),
        (topic, &b"reboot"[..], QoS::AtLeastOnce, false)
    );

    send(&broker, topic, b"status", QoS::ExactlyOnce, false);
    assert_eq!(second.recv().await.qos, QoS::ExactlyOnce);
}

#[tokio::test]
async fn test_clean_session_starts_over() {
    let broker = Broker::default();

    let first = TestClient::connect(&broker, ConnectRequest::new("c", false));
    first.subscribe(&broker, "a/#", QoS::AtLeastOnce);
    first.release(&broker, ReleaseReason::ConnectionLost);

    let mut second = TestClient::connect(&broker, ConnectRequest::new("c", true));
    assert!(!second.ack.session_present);
    assert!(broker.subscriptions_of("c").is_empty());

    send(&broker, "a/b", b"x", QoS::AtLeastOnce, false);
    second.assert_idle();

    second.release(&broker, ReleaseReason::Disconnect);
    assert_eq!(broker.session_count(), 0);
}

#[tokio::test]
async fn test_takeover_is_rejected_while_active() {
    let broker = Broker::default();
    let mut owner = TestClient::connect(&broker, ConnectRequest::new("dup", true));
    owner.subscribe(&broker, "t", QoS::AtMostOnce);

    let (conn, _rx) = ChannelConnection::channel(8);
    let request = ConnectRequest::new("dup", true);
    assert!(broker.init_session(request, Arc::new(conn)).is_err());

    send(&broker, "t", b"still here", QoS::AtMostOnce, false);
    assert_eq!(&owner.recv().await.payload[..], b"still here");
}

#[tokio::test]
async fn test_late_teardown_does_not_clobber_new_connection() {
    let broker = Broker::default();

    let old = TestClient::connect(&broker, ConnectRequest::new("flaky", false));
    old.subscribe(&broker, "t", QoS::AtLeastOnce);
    old.release(&broker, ReleaseReason::ConnectionLost);

    let mut new = TestClient::connect(&broker, ConnectRequest::new("flaky", false));

    // the old connection task finishes its cleanup late
    assert!(!old.release(&broker, ReleaseReason::ConnectionLost));
    assert!(broker.has_active_session("flaky"));

    send(&broker, "t", b"x", QoS::AtLeastOnce, false);
    assert_eq!(&new.recv().await.payload[..], b"x");
}

#[tokio::test]
async fn test_last_will() {
    let broker = Broker::default();
    let mut monitor = TestClient::connect(&broker, ConnectRequest::new("monitor", true));
    monitor.subscribe(&broker, "devices/+/online", QoS::AtLeastOnce);

    let will = WillMessage {
        topic: "devices/d1/online".to_string(),
        payload: Bytes::from_static(b"false"),
        qos: QoS::AtLeastOnce,
        retain: false,
    };

    let request = ConnectRequest::new("d1", true).with_will(will.clone());
    let polite = TestClient::connect(&broker, request);
    polite.release(&broker, ReleaseReason::Disconnect);
    monitor.assert_idle();

    let request = ConnectRequest::new("d1", true).with_will(will);
    let dropped = TestClient::connect(&broker, request);
    dropped.release(&broker, ReleaseReason::ConnectionLost);

    let received = monitor.recv().await;
    assert_eq!(
        summary(&received),
        ("devices/d1/online", &b"false"[..], QoS::AtLeastOnce, false)
    );
}

#[tokio::test]
async fn test_overlapping_subscriptions_of_one_client() {
    let broker = Broker::default();
    let mut client = TestClient::connect(&broker, ConnectRequest::new("o", true));
    client.subscribe(&broker, "a/+/c", QoS::AtMostOnce);
    client.subscribe(&broker, "a/b/#", QoS::AtLeastOnce);
    client.subscribe(&broker, "#", QoS::ExactlyOnce);

    send(&broker, "a/b/c", b"x", QoS::ExactlyOnce, false);

    let mut qos = vec![
        client.recv().await.qos,
        client.recv().await.qos,
        client.recv().await.qos,
    ];
    qos.sort();
    assert_eq!(
        qos,
        vec![QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce]
    );
    client.assert_idle();
}

#[tokio::test]
async fn test_full_outbound_channel_drops_delivery() {
    let broker = Broker::default();
    let (conn, mut rx) = ChannelConnection::channel(1);
    let request = ConnectRequest::new("slow", true);
    broker.init_session(request, Arc::new(conn)).unwrap();
    broker.subscribe("t", "slow", QoS::AtMostOnce).unwrap();

    for i in 0..3u8 {
        let payload = Bytes::from(vec![i]);
        broker
            .publish("t", payload, QoS::AtMostOnce, false)
            .unwrap();
    }

    assert_eq!(&rx.recv().await.unwrap().payload[..], &[0]);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_broker_from_loaded_config() {
    let config = Config::parse(
        r#"
[mqtt]
max_qos = 1

[limits]
max_queued_messages = 3
"#,
    )
    .unwrap();

    let broker = Broker::new(BrokerConfig::from(&config));
    let client = TestClient::connect(&broker, ConnectRequest::new("q", false));
    let granted = client.subscribe(&broker, "t", QoS::ExactlyOnce);
    assert_eq!(granted, QoS::AtLeastOnce);
    client.release(&broker, ReleaseReason::Disconnect);

    for i in 0..5u8 {
        let payload = Bytes::from(vec![i]);
        broker
            .publish("t", payload, QoS::AtLeastOnce, false)
            .unwrap();
    }

    let (conn, mut rx) = ChannelConnection::channel(16);
    let request = ConnectRequest::new("q", false);
    broker.init_session(request, Arc::new(conn)).unwrap();

    let payloads: Vec<u8> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|p| p.payload[0])
        .collect();
    assert_eq!(payloads, vec![2, 3, 4]);
}

#[test]
fn test_concurrent_churn_leaves_consistent_state() {
    let broker = Arc::new(Broker::default());
    let filters = ["a/#", "a/+/c", "+/b/c", "a/b/c", "#", "x/y"];
    let topics = ["a/b/c", "a/x/c", "x/y", "q/b/c"];

    let handles: Vec<_> = (0..4u64)
        .map(|worker| {
            let broker = broker.clone();
            thread::spawn(move || {
                let mut rng = rand::rngs::StdRng::seed_from_u64(worker);
                let request = ConnectRequest::new(format!("worker-{}", worker), true);
                let (conn, mut rx) = ChannelConnection::channel(1024);
                let ack = broker.init_session(request, Arc::new(conn)).unwrap();
                let client_id = ack.client_id;

                for _ in 0..500 {
                    let filter = filters[rng.gen_range(0..filters.len())];
                    match rng.gen_range(0..3) {
                        0 => {
                            let qos = QoS::AtMostOnce;
                            broker.subscribe(filter, &client_id, qos).unwrap();
                        }
                        1 => {
                            broker.unsubscribe(filter, &client_id).unwrap();
                        }
                        _ => {
                            let topic = topics[rng.gen_range(0..topics.len())];
                            send(&broker, topic, b"x", QoS::AtMostOnce, false);
                        }
                    }
                    while rx.try_recv().is_ok() {}
                }

                broker.unsubscribe_all(&client_id);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(broker.subscription_count(), 0);
    assert_eq!(broker.session_count(), 4);
    assert_eq!(broker.active_session_count(), 4);
}
