use std::time::Duration;

use thiserror::Error;

/// Crate-level error.
///
/// Configuration errors surface synchronously from registration/publish
/// calls. Execution errors (handler failure, timeout, panic) stay inside the
/// processing loop and are only ever recorded on the envelope.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("topic is not configured")]
    MissingTopic,

    #[error("group is not configured")]
    MissingGroup,

    #[error("handler is not configured")]
    MissingHandler,

    #[error("manager is not available")]
    ManagerUnavailable,

    #[error("publisher is not available")]
    PublisherUnavailable,

    #[error("subscriber is not available")]
    SubscriberUnavailable,

    #[error("handler timed out after {0:?}")]
    HandleTimeout(Duration),

    #[error("handler panicked: {0}")]
    HandlerPanic(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}
