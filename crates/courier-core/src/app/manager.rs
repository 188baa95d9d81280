//! Manager: the per-group publisher/subscriber registry and the
//! registration surface.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::error;

use crate::app::config::CourierConfig;
use crate::app::process_loop::process_loop;
use crate::app::router::{DefaultDeadHandler, DefaultRetryHandler};
use crate::domain::envelope::Envelope;
use crate::domain::errors::CourierError;
use crate::domain::options::SubscribeOptions;
use crate::ports::handler::Handler;
use crate::ports::transport::{Publisher, Subscriber, Transport};
use crate::{DEAD_TOPIC, RETRY_TOPIC};

/// Process-wide registry: one publisher and one subscriber per group,
/// constructed lazily through the transport and cached.
///
/// Design:
/// - Created once via [`Manager::new`] and shared as an `Arc`; there is no
///   implicit global instance.
/// - Each cache lock is held across construction, so concurrent
///   first-callers for a group observe exactly one build. Constructions for
///   different groups serialize behind the same lock; registration is not a
///   hot path.
/// - Only successful constructions are cached. A failed build leaves the
///   slot empty and the next caller triggers a fresh attempt.
pub struct Manager {
    config: CourierConfig,
    transport: Arc<dyn Transport>,
    publishers: Mutex<HashMap<String, Arc<dyn Publisher>>>,
    subscribers: Mutex<HashMap<String, Arc<dyn Subscriber>>>,
}

impl Manager {
    pub fn new(config: CourierConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            config,
            transport,
            publishers: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Publish an envelope to a topic through the publisher cached for the
    /// envelope's group. Transport errors come back verbatim.
    pub async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), CourierError> {
        let publisher = self.publisher_for(&envelope.group).await?;
        publisher.publish(topic, envelope.encode()).await
    }

    /// Register a subscription: verified options, one subscriber per group,
    /// one processing loop per registration.
    ///
    /// Returns once the loop has been started; the loop itself runs until
    /// the transport closes the feed.
    pub async fn register_subscriber(
        self: &Arc<Self>,
        topic: &str,
        options: SubscribeOptions,
    ) -> Result<(), CourierError> {
        let options = if options.topic.is_empty() {
            options.with_topic(topic)
        } else {
            options
        };
        let options = options.normalize();
        options.verify()?;

        let Some(handler) = options.handler.clone() else {
            return Err(CourierError::MissingHandler);
        };

        let subscriber = self.subscriber_for(&options.group).await?;
        let feed = subscriber.subscribe(topic).await?;

        let executor = format!("{},{}", self.config.name, options.group);
        tokio::spawn(process_loop(
            Arc::clone(self),
            topic.to_string(),
            executor,
            handler,
            feed,
            self.config.handle_timeout,
        ));
        Ok(())
    }

    /// Subscribe to the built-in retry topic. Without an explicit handler
    /// the default retry handler republishes envelopes to their original
    /// topic after the configured delay.
    pub async fn register_retry(
        self: &Arc<Self>,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<(), CourierError> {
        let handler = handler.unwrap_or_else(|| {
            Arc::new(DefaultRetryHandler::new(
                Arc::downgrade(self),
                self.config.retry_delay,
            ))
        });
        self.register_subscriber(
            RETRY_TOPIC,
            SubscribeOptions::new()
                .with_shared_group()
                .with_topic(RETRY_TOPIC)
                .with_handler(handler),
        )
        .await
    }

    /// Subscribe to the built-in dead topic. Without an explicit handler the
    /// default dead handler emits each envelope as a JSON audit record.
    pub async fn register_dead(
        self: &Arc<Self>,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<(), CourierError> {
        let handler = handler.unwrap_or_else(|| Arc::new(DefaultDeadHandler));
        self.register_subscriber(
            DEAD_TOPIC,
            SubscribeOptions::new()
                .with_shared_group()
                .with_topic(DEAD_TOPIC)
                .with_handler(handler),
        )
        .await
    }

    async fn publisher_for(&self, group: &str) -> Result<Arc<dyn Publisher>, CourierError> {
        let mut cache = self.publishers.lock().await;
        if let Some(publisher) = cache.get(group) {
            return Ok(Arc::clone(publisher));
        }
        match self.transport.build_publisher(group).await {
            Ok(publisher) => {
                cache.insert(group.to_string(), Arc::clone(&publisher));
                Ok(publisher)
            }
            Err(err) => {
                error!(group, error = %err, "publisher construction failed");
                Err(CourierError::PublisherUnavailable)
            }
        }
    }

    async fn subscriber_for(&self, group: &str) -> Result<Arc<dyn Subscriber>, CourierError> {
        let mut cache = self.subscribers.lock().await;
        if let Some(subscriber) = cache.get(group) {
            return Ok(Arc::clone(subscriber));
        }
        match self.transport.build_subscriber(group).await {
            Ok(subscriber) => {
                cache.insert(group.to_string(), Arc::clone(&subscriber));
                Ok(subscriber)
            }
            Err(err) => {
                error!(group, error = %err, "subscriber construction failed");
                Err(CourierError::SubscriberUnavailable)
            }
        }
    }
}
