//! Handler port: the seam for application code.

use async_trait::async_trait;

use crate::domain::envelope::Envelope;
use crate::domain::errors::CourierError;

/// A message handler.
///
/// Runs inside the processing loop under the envelope's timeout budget. An
/// `Err` return routes the envelope to the retry or dead topic; a panic is
/// recovered and treated the same way.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<(), CourierError>;
}
