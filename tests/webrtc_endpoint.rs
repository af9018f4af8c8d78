use std::time::Duration;

use drawpad_lib::peer::{EndpointTag, EventSink, ServerConfig, TaggedEvent, TransportEvent};
use drawpad_lib::rendezvous::{RelayMessage, RelayServer, Registry};
use drawpad_lib::signaling::SignalingClient;
use drawpad_lib::{Transport, WebRtcTransport};
use tokio::sync::mpsc::{self, UnboundedReceiver};

async fn start_relay() -> (String, Registry) {
    let server = RelayServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    tokio::spawn(server.run());
    (format!("ws://{addr}"), registry)
}

// STUN, на котором никто не отвечает: сбор кандидатов висит до таймаута
fn silent_stun() -> Vec<ServerConfig> {
    vec![ServerConfig {
        id: "silent".into(),
        r#type: "stun".into(),
        url: "127.0.0.1:9".into(),
        username: None,
        credential: None,
    }]
}

async fn wait_open(events: &mut UnboundedReceiver<TaggedEvent>) {
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("endpoint never opened")
        .expect("endpoint dropped its sink");
    assert!(matches!(event.event, TransportEvent::Open(_)), "{event:?}");
}

#[tokio::test]
async fn phone_offer_reaches_host_through_relay() {
    let (url, _registry) = start_relay().await;
    let mut host = SignalingClient::connect(&url).await.unwrap();
    let host_id = host.register().await.unwrap();
    let (_host_tx, mut host_rx) = host.into_split();

    let transport = WebRtcTransport::new(url.clone(), silent_stun());
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut phone = transport
        .create_endpoint(EventSink::new(EndpointTag(1), tx))
        .unwrap();
    wait_open(&mut events).await;
    phone.connect(&host_id).unwrap();

    let got = tokio::time::timeout(Duration::from_secs(20), host_rx.recv())
        .await
        .expect("offer never arrived")
        .unwrap();
    let Some(RelayMessage::Signal { payload, .. }) = got else {
        panic!("unexpected relay message: {got:?}");
    };
    assert_eq!(payload["sdp"]["type"], "offer");
    assert_eq!(payload["id"].as_str().map(str::len), Some(16));
    phone.disconnect();
}

#[tokio::test]
async fn disconnect_is_not_held_up_by_ice_gathering() {
    let (url, registry) = start_relay().await;
    let mut host = SignalingClient::connect(&url).await.unwrap();
    let host_id = host.register().await.unwrap();

    let transport = WebRtcTransport::new(url.clone(), silent_stun());
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut phone = transport
        .create_endpoint(EventSink::new(EndpointTag(1), tx))
        .unwrap();
    wait_open(&mut events).await;
    assert_eq!(registry.count().await, 2);

    phone.connect(&host_id).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    phone.disconnect();

    // actor не ждёт сбора кандидатов и сразу уходит из relay
    let started = tokio::time::Instant::now();
    while registry.count().await != 1 {
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "endpoint stayed registered while gathering"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
