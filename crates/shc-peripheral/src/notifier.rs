use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Destination of one subscriber's notifications.
///
/// Any error means the subscriber is gone; the producer loop stops.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one frame.
    async fn notify(&self, frame: Bytes) -> Result<()>;

    /// Signal that the current transfer is complete.
    async fn end_of_stream(&self) -> Result<()>;
}
