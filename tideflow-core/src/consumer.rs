//! Contract of the upstream fetcher. The engine never polls it; the fetcher
//! pushes batches into the task from outside, and the task talks back
//! through this trait: synchronous pause/resume signals for flow control and
//! a blocking offset commit.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::message::TopicPartition;
use crate::Result;

#[async_trait]
pub trait Consumer: Send + Sync {
    /// Stop fetching `partition`. Idempotent.
    fn pause(&self, partition: &TopicPartition);

    /// Start fetching `partition` again. Idempotent.
    fn resume(&self, partition: &TopicPartition);

    /// Synchronously commit consumed offsets; returns once they are durable.
    /// The offset stored for a partition is the offset of the last processed
    /// record — readers add 1 to get the next offset to fetch.
    async fn commit(&self, offsets: &HashMap<TopicPartition, i64>) -> Result<()>;
}
