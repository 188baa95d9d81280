//! Subscription processing loop: receive, decode, invoke, route, ack.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, error, warn};

use crate::app::manager::Manager;
use crate::app::router::route;
use crate::domain::envelope::Envelope;
use crate::domain::errors::CourierError;
use crate::ports::handler::Handler;
use crate::ports::transport::DeliveryFeed;

/// Drive one subscription feed until the transport closes it.
///
/// Per delivered message: decode a fresh envelope, invoke the handler under
/// its timeout budget, route a failure to the retry/dead topic, then ack.
/// The ack is unconditional: a delivery attempt is consumed whether or not
/// the handler or the rerouting publish succeeded.
pub(crate) async fn process_loop(
    manager: Arc<Manager>,
    topic: String,
    executor: String,
    handler: Arc<dyn Handler>,
    mut feed: DeliveryFeed,
    default_timeout: Duration,
) {
    while let Some(delivery) = feed.recv().await {
        let mut envelope = Envelope::new(default_timeout);
        envelope.decode(delivery.message());

        if let Err(err) = invoke(Arc::clone(&handler), envelope.clone()).await {
            // Routing failures are logged only. The delivery below is acked
            // either way, so a failed publish here loses the message.
            if let Err(route_err) = route(&topic, &executor, &mut envelope, &err, &manager).await {
                error!(
                    topic = %topic,
                    id = %envelope.id,
                    error = %route_err,
                    "failed to route failed delivery",
                );
            }
        }

        if let Err(err) = delivery.ack().await {
            warn!(topic = %topic, error = %err, "ack failed");
        }
    }
    debug!(topic = %topic, "feed closed, processing loop finished");
}

/// Run the handler inside its own task, bounded by the envelope's timeout.
///
/// The spawned task is the recovery boundary: a panic surfaces as a join
/// error instead of tearing down the loop. A timeout abandons the join but
/// does not abort the task; cancellation is advisory to the handler.
async fn invoke(handler: Arc<dyn Handler>, envelope: Envelope) -> Result<(), CourierError> {
    let timeout = envelope.handle_timeout;
    let span = tracing::info_span!(
        "handle",
        trace_id = %envelope.trace_id,
        topic = %envelope.topic,
        id = %envelope.id,
    );
    let task = tokio::spawn(async move { handler.handle(&envelope).await }.instrument(span));

    let joined = if timeout.is_zero() {
        task.await
    } else {
        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined,
            Err(_) => return Err(CourierError::HandleTimeout(timeout)),
        }
    };

    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            Err(CourierError::HandlerPanic(panic_message(err.into_panic())))
        }
        Err(err) => Err(CourierError::Other(format!("handler task failed: {err}"))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
