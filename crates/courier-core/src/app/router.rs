//! Failure routing: classify a failed delivery and the default handlers for
//! the two built-in topics.

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::app::manager::Manager;
use crate::domain::envelope::Envelope;
use crate::domain::errors::CourierError;
use crate::ports::handler::Handler;
use crate::{DEAD_TOPIC, RETRY_TOPIC};

/// Where a failed delivery goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Retry,
    Dead,
}

/// True for the two built-in topics.
pub fn is_inner_topic(topic: &str) -> bool {
    topic == RETRY_TOPIC || topic == DEAD_TOPIC
}

/// Pure classification of a failed delivery.
///
/// The built-in topics are terminal sinks: a failure on either of them
/// always classifies `Dead`, regardless of the envelope's remaining budget.
/// Everywhere else the retry budget decides.
pub fn classify(topic: &str, envelope: &Envelope) -> RouteTarget {
    if is_inner_topic(topic) || envelope.is_dead() {
        RouteTarget::Dead
    } else {
        RouteTarget::Retry
    }
}

/// Record a failed invocation on the envelope and publish it to the
/// classified destination through the manager.
///
/// No retry bookkeeping happens on the terminal path: for a built-in topic
/// the envelope is forwarded as-is. The retry count is never incremented
/// here; that is the retry handler's job.
pub async fn route(
    topic: &str,
    executor: &str,
    envelope: &mut Envelope,
    err: &CourierError,
    manager: &Manager,
) -> Result<(), CourierError> {
    if !is_inner_topic(topic) {
        envelope.record_result(executor, Some(err));
    }
    let destination = match classify(topic, envelope) {
        RouteTarget::Dead => DEAD_TOPIC,
        RouteTarget::Retry => RETRY_TOPIC,
    };
    manager.publish(destination, envelope).await
}

/// Default handler for the retry topic.
///
/// Waits the configured delay, increments the retry count, and republishes
/// the envelope to its original topic. Holds the manager weakly: once the
/// manager is gone there is nothing to publish through.
pub struct DefaultRetryHandler {
    manager: Weak<Manager>,
    delay: Duration,
}

impl DefaultRetryHandler {
    pub fn new(manager: Weak<Manager>, delay: Duration) -> Self {
        Self { manager, delay }
    }
}

#[async_trait]
impl Handler for DefaultRetryHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<(), CourierError> {
        tokio::time::sleep(self.delay).await;
        let Some(manager) = self.manager.upgrade() else {
            return Err(CourierError::ManagerUnavailable);
        };

        let mut envelope = envelope.clone();
        envelope.retry_index += 1;
        info!(
            id = %envelope.id,
            topic = %envelope.topic,
            retry_index = envelope.retry_index,
            "requeueing message to its original topic",
        );
        manager.publish(&envelope.topic, &envelope).await
    }
}

/// Default handler for the dead topic: emit the envelope as a JSON audit
/// record. Dead letters are never republished.
pub struct DefaultDeadHandler;

#[async_trait]
impl Handler for DefaultDeadHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<(), CourierError> {
        let record = serde_json::to_string(envelope)
            .map_err(|err| CourierError::Other(format!("dead letter encode: {err}")))?;
        info!(dead_letter = %record, "dead letter consumed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::app::config::CourierConfig;
    use crate::domain::envelope::{HEADER_EXEC_ERROR, HEADER_EXECUTOR, HEADER_RETRIES};
    use crate::impls::inmem_transport::InMemoryTransport;
    use crate::ports::transport::{DeliveryFeed, Transport};

    fn envelope(retry_index: i64, retry_max: i64) -> Envelope {
        Envelope {
            id: "m-1".to_string(),
            group: "orders".to_string(),
            topic: "order-created".to_string(),
            retry_index,
            retry_max,
            ..Envelope::default()
        }
    }

    #[rstest]
    #[case::budget_left("order-created", 1, 2, RouteTarget::Retry)]
    #[case::budget_exhausted("order-created", 2, 2, RouteTarget::Dead)]
    #[case::no_budget("order-created", 0, 0, RouteTarget::Dead)]
    #[case::retry_topic_short_circuits(RETRY_TOPIC, 1, 5, RouteTarget::Dead)]
    #[case::dead_topic_short_circuits(DEAD_TOPIC, 1, 5, RouteTarget::Dead)]
    fn classify_follows_budget_and_inner_short_circuit(
        #[case] topic: &str,
        #[case] retry_index: i64,
        #[case] retry_max: i64,
        #[case] expected: RouteTarget,
    ) {
        assert_eq!(classify(topic, &envelope(retry_index, retry_max)), expected);
    }

    async fn capture(transport: &InMemoryTransport, topic: &str) -> DeliveryFeed {
        let subscriber = transport.build_subscriber("capture").await.unwrap();
        subscriber.subscribe(topic).await.unwrap()
    }

    #[tokio::test]
    async fn route_publishes_to_retry_without_touching_the_count() {
        let transport = Arc::new(InMemoryTransport::new());
        let manager = Manager::new(CourierConfig::default(), Arc::clone(&transport) as _);
        let mut retry_feed = capture(&transport, RETRY_TOPIC).await;

        let mut env = envelope(1, 2);
        let err = CourierError::Handler("boom".to_string());
        route("order-created", "courier,orders", &mut env, &err, &manager)
            .await
            .unwrap();

        let routed = retry_feed.recv().await.unwrap();
        assert_eq!(routed.message().header(HEADER_RETRIES), Some("1"));
        assert_eq!(routed.message().header(HEADER_EXECUTOR), Some("courier,orders"));
        assert_eq!(
            routed.message().header(HEADER_EXEC_ERROR),
            Some("handler failed: boom"),
        );
    }

    #[tokio::test]
    async fn route_publishes_exhausted_envelopes_to_dead() {
        let transport = Arc::new(InMemoryTransport::new());
        let manager = Manager::new(CourierConfig::default(), Arc::clone(&transport) as _);
        let mut dead_feed = capture(&transport, DEAD_TOPIC).await;

        let mut env = envelope(2, 2);
        let err = CourierError::Handler("boom".to_string());
        route("order-created", "courier,orders", &mut env, &err, &manager)
            .await
            .unwrap();

        assert!(dead_feed.recv().await.is_some());
    }

    #[tokio::test]
    async fn route_from_an_inner_topic_records_nothing() {
        let transport = Arc::new(InMemoryTransport::new());
        let manager = Manager::new(CourierConfig::default(), Arc::clone(&transport) as _);
        let mut dead_feed = capture(&transport, DEAD_TOPIC).await;

        // Plenty of budget left; the inner topic still short-circuits.
        let mut env = envelope(1, 5);
        let err = CourierError::Handler("boom".to_string());
        route(RETRY_TOPIC, "courier,inner-group", &mut env, &err, &manager)
            .await
            .unwrap();

        let routed = dead_feed.recv().await.unwrap();
        assert_eq!(routed.message().header(HEADER_EXECUTOR), Some(""));
        assert_eq!(routed.message().header(HEADER_EXEC_ERROR), Some(""));
        assert!(env.executor.is_empty());
        assert!(env.last_error.is_empty());
    }

    #[tokio::test]
    async fn default_retry_handler_increments_and_republishes() {
        let transport = Arc::new(InMemoryTransport::new());
        let manager = Manager::new(CourierConfig::default(), Arc::clone(&transport) as _);
        let mut original_feed = capture(&transport, "order-created").await;

        let handler =
            DefaultRetryHandler::new(Arc::downgrade(&manager), Duration::from_millis(1));
        handler.handle(&envelope(1, 3)).await.unwrap();

        let republished = original_feed.recv().await.unwrap();
        assert_eq!(republished.message().header(HEADER_RETRIES), Some("2"));
    }

    #[tokio::test]
    async fn default_retry_handler_fails_once_the_manager_is_gone() {
        let transport = Arc::new(InMemoryTransport::new());
        let manager = Manager::new(CourierConfig::default(), Arc::clone(&transport) as _);
        let handler =
            DefaultRetryHandler::new(Arc::downgrade(&manager), Duration::from_millis(1));
        drop(manager);

        let err = handler.handle(&envelope(1, 3)).await.unwrap_err();
        assert!(matches!(err, CourierError::ManagerUnavailable));
    }

    #[tokio::test]
    async fn default_dead_handler_consumes_without_republishing() {
        let transport = Arc::new(InMemoryTransport::new());

        DefaultDeadHandler.handle(&envelope(3, 3)).await.unwrap();

        assert_eq!(transport.published_count(), 0);
    }
}
