//! gRPC Streaming Integration Tests
//!
//! Tests the full flow from a simulator tick to a gRPC client reception.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Channel, Server};
use tonic::{Code, Request, Streaming};

use currency_service::{
    CurrencyServer, CurrencyServerConfig, DeliveryMode, RateQueryService, RateSimulator,
    RateTable, RateUpdateHub, ScriptedDrift, SubscriptionRegistry,
    proto::{
        Currencies, RateRequest, StreamingRateResponse,
        currency_service_client::CurrencyServiceClient,
        currency_service_server::CurrencyServiceServer, streaming_rate_response::Message,
    },
};

const WAIT: Duration = Duration::from_secs(2);

struct TestServer {
    client: CurrencyServiceClient<Channel>,
    table: Arc<RateTable>,
    hub: Arc<RateUpdateHub>,
    registry: Arc<SubscriptionRegistry>,
    _handle: tokio::task::JoinHandle<()>,
}

/// Start a test gRPC server on a random port and return the client.
async fn setup_test_server(config: CurrencyServerConfig) -> TestServer {
    let table = Arc::new(
        RateTable::from_rates([("USD".to_string(), 1.1), ("INR".to_string(), 90.0)]).unwrap(),
    );
    let hub = Arc::new(RateUpdateHub::with_defaults());
    let registry = Arc::new(SubscriptionRegistry::new());

    let server = CurrencyServer::new(
        config,
        RateQueryService::new(Arc::clone(&table)),
        Arc::clone(&registry),
        Arc::clone(&hub),
    );

    // Find an available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        Server::builder()
            .add_service(CurrencyServiceServer::new(server))
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = CurrencyServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();

    TestServer {
        client,
        table,
        hub,
        registry,
        _handle: handle,
    }
}

fn request(base: Currencies, destination: Currencies) -> RateRequest {
    RateRequest {
        base: base.into(),
        destination: destination.into(),
    }
}

impl TestServer {
    /// Open a subscription stream and return the request sender with it.
    async fn subscribe(&mut self) -> (mpsc::Sender<RateRequest>, Streaming<StreamingRateResponse>) {
        let (tx, rx) = mpsc::channel(16);
        let response = self
            .client
            .subscribe_rates(Request::new(ReceiverStream::new(rx)))
            .await
            .unwrap();
        (tx, response.into_inner())
    }

    async fn wait_for_requests(&self, count: usize) {
        timeout(WAIT, async {
            while self.registry.stats().request_count < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription requests were not registered");
    }

    fn tick(&self, drifts: &[(&str, i32)]) {
        let mut simulator = RateSimulator::new(
            Arc::clone(&self.table),
            self.hub.clone(),
            ScriptedDrift::new(drifts.iter().copied()),
            Duration::from_secs(5),
        );
        simulator.tick().unwrap();
    }
}

async fn next_message(stream: &mut Streaming<StreamingRateResponse>) -> Message {
    timeout(WAIT, stream.message())
        .await
        .expect("timed out waiting for a push")
        .unwrap()
        .expect("stream ended")
        .message
        .expect("empty message")
}

// =============================================================================
// GetRate
// =============================================================================

#[tokio::test]
async fn get_rate_returns_cross_rate() {
    let mut server = setup_test_server(CurrencyServerConfig::default()).await;

    let response = server
        .client
        .get_rate(request(Currencies::Usd, Currencies::Inr))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.base, Currencies::Usd as i32);
    assert_eq!(response.destination, Currencies::Inr as i32);
    assert!((response.rate - 81.818).abs() < 0.001);
    assert!(response.updated_at.is_some());
}

#[tokio::test]
async fn get_rate_from_reference_currency() {
    let mut server = setup_test_server(CurrencyServerConfig::default()).await;

    let response = server
        .client
        .get_rate(request(Currencies::Eur, Currencies::Usd))
        .await
        .unwrap()
        .into_inner();

    assert!((response.rate - 1.1).abs() < 1e-9);
}

#[tokio::test]
async fn get_rate_same_currency_is_invalid_argument() {
    let mut server = setup_test_server(CurrencyServerConfig::default()).await;

    let status = server
        .client
        .get_rate(request(Currencies::Gbp, Currencies::Gbp))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn get_rate_missing_currency_is_not_found() {
    let mut server = setup_test_server(CurrencyServerConfig::default()).await;

    let status = server
        .client
        .get_rate(request(Currencies::Usd, Currencies::Rub))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::NotFound);
}

// =============================================================================
// SubscribeRates
// =============================================================================

#[tokio::test]
async fn tick_pushes_updated_rate_to_subscriber() {
    let mut server = setup_test_server(CurrencyServerConfig::default()).await;
    let (requests, mut stream) = server.subscribe().await;

    requests
        .send(request(Currencies::Usd, Currencies::Inr))
        .await
        .unwrap();
    server.wait_for_requests(1).await;

    server.tick(&[("USD", 10), ("INR", -5)]);

    match next_message(&mut stream).await {
        Message::RateResponse(response) => {
            assert_eq!(response.base, Currencies::Usd as i32);
            assert_eq!(response.destination, Currencies::Inr as i32);
            let expected = (90.0 * 0.95) / (1.1 * 1.1);
            assert!((response.rate - expected).abs() < 1e-9);
        }
        Message::Error(e) => panic!("unexpected error: {e:?}"),
    }

    // Exactly one push per tick per pair
    assert!(
        timeout(Duration::from_millis(200), stream.message())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn same_currency_request_is_answered_in_band() {
    let mut server = setup_test_server(CurrencyServerConfig::default()).await;
    let (requests, mut stream) = server.subscribe().await;

    requests
        .send(request(Currencies::Usd, Currencies::Usd))
        .await
        .unwrap();

    match next_message(&mut stream).await {
        Message::Error(e) => {
            assert_eq!(e.code, Code::InvalidArgument as i32);
            assert_eq!(e.request, Some(request(Currencies::Usd, Currencies::Usd)));
        }
        Message::RateResponse(r) => panic!("unexpected rate: {r:?}"),
    }

    // The stream stays usable after an in-band error
    requests
        .send(request(Currencies::Eur, Currencies::Usd))
        .await
        .unwrap();
    server.wait_for_requests(1).await;
    server.tick(&[]);

    assert!(matches!(
        next_message(&mut stream).await,
        Message::RateResponse(_)
    ));
}

#[tokio::test]
async fn missing_currency_is_reported_per_push() {
    let mut server = setup_test_server(CurrencyServerConfig::default()).await;
    let (requests, mut stream) = server.subscribe().await;

    requests
        .send(request(Currencies::Rub, Currencies::Usd))
        .await
        .unwrap();
    requests
        .send(request(Currencies::Usd, Currencies::Inr))
        .await
        .unwrap();
    server.wait_for_requests(2).await;

    server.tick(&[("INR", 2)]);

    match next_message(&mut stream).await {
        Message::Error(e) => {
            assert_eq!(e.code, Code::NotFound as i32);
            assert!(e.message.contains("RUB"));
        }
        Message::RateResponse(r) => panic!("unexpected rate: {r:?}"),
    }
    assert!(matches!(
        next_message(&mut stream).await,
        Message::RateResponse(_)
    ));
}

#[tokio::test]
async fn duplicate_request_pushes_once_per_tick() {
    let mut server = setup_test_server(CurrencyServerConfig::default()).await;
    let (requests, mut stream) = server.subscribe().await;

    for _ in 0..2 {
        requests
            .send(request(Currencies::Usd, Currencies::Inr))
            .await
            .unwrap();
    }
    requests
        .send(request(Currencies::Eur, Currencies::Usd))
        .await
        .unwrap();
    server.wait_for_requests(2).await;

    server.tick(&[]);

    let first = next_message(&mut stream).await;
    let second = next_message(&mut stream).await;
    assert!(matches!(first, Message::RateResponse(ref r) if r.base == Currencies::Usd as i32));
    assert!(matches!(second, Message::RateResponse(ref r) if r.base == Currencies::Eur as i32));
    assert!(
        timeout(Duration::from_millis(200), stream.message())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn subscribers_receive_the_same_tick() {
    let mut server = setup_test_server(CurrencyServerConfig::default()).await;
    let (requests_a, mut stream_a) = server.subscribe().await;
    let (requests_b, mut stream_b) = server.subscribe().await;

    requests_a
        .send(request(Currencies::Usd, Currencies::Inr))
        .await
        .unwrap();
    requests_b
        .send(request(Currencies::Usd, Currencies::Inr))
        .await
        .unwrap();
    server.wait_for_requests(2).await;

    server.tick(&[("USD", -4), ("INR", 7)]);

    let rate = |message: Message| match message {
        Message::RateResponse(r) => r.rate,
        Message::Error(e) => panic!("unexpected error: {e:?}"),
    };
    let a = rate(next_message(&mut stream_a).await);
    let b = rate(next_message(&mut stream_b).await);
    assert!((a - b).abs() < f64::EPSILON);
}

#[tokio::test]
async fn client_disconnect_removes_session_and_later_ticks_skip_it() {
    let mut server = setup_test_server(CurrencyServerConfig::default()).await;
    let (requests, stream) = server.subscribe().await;

    requests
        .send(request(Currencies::Usd, Currencies::Inr))
        .await
        .unwrap();
    server.wait_for_requests(1).await;
    assert_eq!(server.registry.session_count(), 1);

    drop(requests);
    drop(stream);

    timeout(WAIT, async {
        while server.registry.session_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session was not removed");
    assert_eq!(server.registry.stats().pair_count, 0);

    // Later ticks reach nobody and do not fail
    server.tick(&[("USD", 3)]);
    server.tick(&[("INR", -2)]);
    timeout(WAIT, async {
        while server.hub.receiver_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("tick receiver was not released");
    assert_eq!(server.registry.session_count(), 0);
}

#[tokio::test]
async fn poll_mode_pushes_without_ticks() {
    let config = CurrencyServerConfig {
        delivery_mode: DeliveryMode::Poll,
        poll_interval: Duration::from_millis(100),
        ..CurrencyServerConfig::default()
    };
    let mut server = setup_test_server(config).await;
    let (requests, mut stream) = server.subscribe().await;

    requests
        .send(request(Currencies::Usd, Currencies::Inr))
        .await
        .unwrap();

    for _ in 0..2 {
        match next_message(&mut stream).await {
            Message::RateResponse(r) => assert!((r.rate - 81.818).abs() < 0.001),
            Message::Error(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(server.hub.receiver_count(), 0);
}
