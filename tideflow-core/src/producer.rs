//! Contract of the downstream producer. `send` is fire-and-forget with a
//! oneshot acknowledgement that resolves once the record is accepted and
//! assigned an offset; `flush` blocks until everything sent so far is
//! durable. The record collector is the only caller.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::message::{ProducerRecord, SendAck};
use crate::Result;

#[async_trait]
pub trait Producer: Send + Sync {
    /// Hand one record to the producer. Must not block; the returned channel
    /// resolves with the acknowledged partition and offset.
    fn send(&self, record: ProducerRecord) -> Result<oneshot::Receiver<SendAck>>;

    /// Block until every record sent before this call is durable.
    async fn flush(&self) -> Result<()>;
}
