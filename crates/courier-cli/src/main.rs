use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;

use courier_core::{
    CourierConfig, CourierError, Envelope, Handler, InMemoryTransport, Manager, SubscribeOptions,
};

#[derive(Debug, Deserialize)]
struct GreetingPayload {
    name: String,
}

/// Fails the first `n` deliveries, then greets.
struct GreetingHandler {
    remaining_failures: AtomicU32,
    succeeded: AtomicBool,
}

impl GreetingHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
            succeeded: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Handler for GreetingHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<(), CourierError> {
        let p: GreetingPayload = serde_json::from_slice(&envelope.payload)
            .map_err(|e| CourierError::Handler(format!("json decode: {e}")))?;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(CourierError::Handler(format!(
                "intentional failure (left={left})"
            )));
        }

        println!(
            "Hello, {}! (attempt {} of {})",
            p.name,
            envelope.retry_index + 1,
            envelope.retry_max + 1
        );
        self.succeeded.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Never succeeds; its envelopes end up in the dead topic.
struct DoomedHandler;

#[async_trait]
impl Handler for DoomedHandler {
    async fn handle(&self, _envelope: &Envelope) -> Result<(), CourierError> {
        Err(CourierError::Handler("this task never succeeds".to_string()))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // (A) Transport and manager. The in-memory transport stands in for a
    // real broker; swap it for a broker-backed Transport in production.
    let transport = Arc::new(InMemoryTransport::new());
    let config = CourierConfig::new()
        .with_name("courier-demo")
        .with_retry_delay(Duration::from_millis(300))
        .with_handle_timeout(Duration::from_secs(5));
    let manager = Manager::new(config, transport.clone() as _);

    // (B) Built-in topics with the default handlers: retry republishes after
    // the configured delay, dead emits a JSON audit record.
    manager.register_retry(None).await.expect("register retry");
    manager.register_dead(None).await.expect("register dead");

    // (C) A flaky subscription: fails twice, succeeds on the third attempt.
    let greeter = Arc::new(GreetingHandler::new(2));
    manager
        .register_subscriber(
            "greetings",
            SubscribeOptions::new().with_handler(greeter.clone()),
        )
        .await
        .expect("register greetings subscriber");

    // (D) A doomed subscription with a single-retry budget, to show the
    // dead-letter path.
    manager
        .register_subscriber(
            "doomed",
            SubscribeOptions::new().with_handler(Arc::new(DoomedHandler)),
        )
        .await
        .expect("register doomed subscriber");

    // (E) Publish one envelope to each.
    let greeting = SubscribeOptions::new()
        .with_topic("greetings")
        .with_trace_id("demo-trace-1")
        .with_retry_max(3)
        .normalize()
        .build_envelope(serde_json::to_vec(&serde_json::json!({ "name": "courier" })).unwrap());
    manager
        .publish("greetings", &greeting)
        .await
        .expect("publish greeting");

    let doomed = SubscribeOptions::new()
        .with_topic("doomed")
        .with_retry_max(1)
        .normalize()
        .build_envelope(b"{}".to_vec());
    manager.publish("doomed", &doomed).await.expect("publish doomed");

    // (F) Wait for the greeting to make it through its retries, then give
    // the doomed envelope a moment to reach the dead topic.
    while !greeter.succeeded.load(Ordering::Relaxed) {
        sleep(Duration::from_millis(50)).await;
    }
    sleep(Duration::from_secs(1)).await;

    println!(
        "done: published={} acked={}",
        transport.published_count(),
        transport.acked_count()
    );

    // (G) Close every feed so the processing loops finish.
    transport.shutdown().await;
}
