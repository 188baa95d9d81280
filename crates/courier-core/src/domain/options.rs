//! Subscribe options: the registration-time value object.

use std::sync::Arc;
use std::time::Duration;

use super::envelope::Envelope;
use super::errors::CourierError;
use crate::INNER_GROUP;
use crate::ports::handler::Handler;

/// Configuration for one subscription (or one outbound envelope).
///
/// Built with the `with_*` methods; each returns a modified copy, so a
/// registration reads as a chain of named overrides. `normalize` and
/// `verify` run inside the manager before anything is constructed.
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    pub group: String,
    pub topic: String,
    pub key: String,
    pub trace_id: String,
    pub retry_max: i64,
    pub retry_index: i64,
    pub handle_timeout: Duration,
    pub handler: Option<Arc<dyn Handler>>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Pin the subscription to the shared group of the built-in topics.
    pub fn with_shared_group(mut self) -> Self {
        self.group = INNER_GROUP.to_string();
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_retry_max(mut self, retry_max: i64) -> Self {
        self.retry_max = retry_max;
        self
    }

    pub fn with_retry_index(mut self, retry_index: i64) -> Self {
        self.retry_index = retry_index;
        self
    }

    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Build an outbound envelope carrying these options.
    pub fn build_envelope(&self, payload: Vec<u8>) -> Envelope {
        Envelope {
            payload,
            group: self.group.clone(),
            topic: self.topic.clone(),
            partition_key: self.key.clone(),
            trace_id: self.trace_id.clone(),
            retry_index: self.retry_index,
            retry_max: self.retry_max,
            handle_timeout: self.handle_timeout,
            ..Envelope::default()
        }
    }

    /// Fill `group` from `topic` when empty. Idempotent.
    pub fn normalize(mut self) -> Self {
        if self.group.is_empty() {
            self.group = self.topic.clone();
        }
        self
    }

    /// A registration without a topic (and therefore without a group after
    /// normalization) is a misconfiguration.
    pub fn verify(&self) -> Result<(), CourierError> {
        if self.topic.is_empty() {
            return Err(CourierError::MissingTopic);
        }
        if self.group.is_empty() {
            return Err(CourierError::MissingGroup);
        }
        Ok(())
    }
}
