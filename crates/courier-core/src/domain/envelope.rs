//! Envelope: the retry-aware message unit and its wire header codec.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::errors::CourierError;
use crate::ports::transport::WireMessage;

/// Header keys used to carry envelope metadata on the wire.
///
/// These are part of the wire contract: every publisher and subscriber on a
/// topic must agree on them, so changing one is a breaking change.
pub const HEADER_PARTITION: &str = "_partition";
pub const HEADER_TRACE_ID: &str = "_traceid";
pub const HEADER_MSG_ID: &str = "_msgid";
pub const HEADER_GROUP: &str = "_msggp";
pub const HEADER_TOPIC: &str = "_msgtopic";
pub const HEADER_RETRIES: &str = "_retries";
pub const HEADER_RETRIES_MAX: &str = "_retriesmax";
pub const HEADER_EXECUTOR: &str = "_execer";
pub const HEADER_EXECUTED_AT: &str = "_execat";
pub const HEADER_EXEC_ERROR: &str = "_execerr";
pub const HEADER_TIMEOUT: &str = "_timeout";

/// Longest error message recorded on an envelope.
const MAX_ERROR_LEN: usize = 255;

/// A payload plus the execution/retry metadata that travels with it.
///
/// Design:
/// - Each envelope is owned exclusively by the loop processing it, so no
///   locking is needed around mutation.
/// - `retry_index` only increases. The envelope is dead once `retry_max` is
///   zero or the index reaches it.
/// - Serde derive exists for the dead-letter audit record, not for the wire:
///   the wire format is the header map produced by [`Envelope::encode`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Transport-level message id; unique per delivery attempt.
    pub id: String,

    /// Opaque application content.
    pub payload: Vec<u8>,

    pub group: String,
    pub topic: String,
    pub partition_key: String,
    pub trace_id: String,

    /// Delivery attempts already made.
    pub retry_index: i64,

    /// Retry ceiling. Zero means no retries are allowed.
    pub retry_max: i64,

    /// Budget for a single handler invocation. Zero disables the bound.
    pub handle_timeout: Duration,

    /// Identity of the last component that ran the handler.
    pub executor: String,

    /// Unix seconds of the last invocation.
    pub executed_at: i64,

    /// Last invocation's error message, truncated to 255 characters.
    pub last_error: String,
}

impl Envelope {
    /// Fresh envelope carrying only the default handler timeout.
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            handle_timeout: default_timeout,
            ..Self::default()
        }
    }

    /// True once the retry budget is exhausted.
    pub fn is_dead(&self) -> bool {
        self.retry_max == 0 || self.retry_index >= self.retry_max
    }

    /// Record the outcome of one handler invocation.
    ///
    /// Sets the executor, refreshes `executed_at`, and stores the error
    /// message (truncated) when the invocation failed. This never touches
    /// `retry_index` and never publishes; routing is the caller's job.
    pub fn record_result(&mut self, executor: &str, err: Option<&CourierError>) {
        self.executor = executor.to_string();
        self.executed_at = chrono::Utc::now().timestamp();
        if let Some(err) = err {
            let msg = err.to_string();
            self.last_error = if msg.chars().count() > MAX_ERROR_LEN {
                msg.chars().take(MAX_ERROR_LEN).collect()
            } else {
                msg
            };
        }
    }

    /// Populate this envelope from a delivered wire message.
    ///
    /// Headers merge additively: a key that is absent or empty leaves the
    /// field unchanged. The wire id wins over the `_msgid` header, so a
    /// decoded attempt is identified by the id the transport assigned to it;
    /// `_msgid` only fills in for transports that deliver without one.
    pub fn decode(&mut self, message: &WireMessage) {
        self.payload = message.payload.clone();
        self.merge_headers(&message.headers);
        if !message.id.is_empty() {
            self.id = message.id.clone();
        }
    }

    /// Merge a header map into this envelope, additively.
    pub fn merge_headers(&mut self, headers: &HashMap<String, String>) {
        let get = |key: &str| headers.get(key).filter(|v| !v.is_empty());

        if let Some(v) = get(HEADER_MSG_ID) {
            self.id = v.clone();
        }
        if let Some(v) = get(HEADER_GROUP) {
            self.group = v.clone();
        }
        if let Some(v) = get(HEADER_TOPIC) {
            self.topic = v.clone();
        }
        if let Some(v) = get(HEADER_PARTITION) {
            self.partition_key = v.clone();
        }
        if let Some(v) = get(HEADER_TRACE_ID) {
            self.trace_id = v.clone();
        }
        if let Some(v) = get(HEADER_RETRIES) {
            self.retry_index = v.parse().unwrap_or_default();
        }
        if let Some(v) = get(HEADER_RETRIES_MAX) {
            self.retry_max = v.parse().unwrap_or_default();
        }
        if let Some(v) = get(HEADER_TIMEOUT) {
            let millis: u64 = v.parse().unwrap_or_default();
            self.handle_timeout = Duration::from_millis(millis);
        }
        if let Some(v) = get(HEADER_EXECUTOR) {
            self.executor = v.clone();
        }
        if let Some(v) = get(HEADER_EXECUTED_AT) {
            self.executed_at = v.parse().unwrap_or_default();
        }
        if let Some(v) = get(HEADER_EXEC_ERROR) {
            self.last_error = v.clone();
        }
    }

    /// Produce a wire message for publication.
    ///
    /// The transport-level id is always fresh; the previous attempt's id
    /// still travels in the `_msgid` header. Numeric fields serialize as
    /// decimal strings, the timeout as milliseconds.
    pub fn encode(&self) -> WireMessage {
        let mut message = WireMessage::new(Ulid::new().to_string(), self.payload.clone());
        message.set_header(HEADER_MSG_ID, &self.id);
        message.set_header(HEADER_GROUP, &self.group);
        message.set_header(HEADER_TOPIC, &self.topic);
        message.set_header(HEADER_PARTITION, &self.partition_key);
        message.set_header(HEADER_TRACE_ID, &self.trace_id);
        message.set_header(HEADER_RETRIES, &self.retry_index.to_string());
        message.set_header(HEADER_RETRIES_MAX, &self.retry_max.to_string());
        message.set_header(
            HEADER_TIMEOUT,
            &(self.handle_timeout.as_millis() as u64).to_string(),
        );
        message.set_header(HEADER_EXECUTOR, &self.executor);
        message.set_header(HEADER_EXECUTED_AT, &self.executed_at.to_string());
        message.set_header(HEADER_EXEC_ERROR, &self.last_error);
        message
    }
}
