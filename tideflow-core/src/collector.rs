//! RecordCollector sits between sink nodes and the producer. It serializes
//! outgoing records, forwards them without blocking, and keeps the highest
//! acknowledged offset per output partition — the produced-offset leg of the
//! commit protocol. `flush` is the commit-time barrier: once it returns,
//! every record submitted before the call is durable.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::Error;
use crate::message::{ProducerRecord, SendAck, TopicPartition};
use crate::producer::Producer;
use crate::serialization::Serializer;
use crate::topology::StreamPartitioner;
use crate::Result;

pub(crate) struct RecordCollector {
    producer: Arc<dyn Producer>,
    pending: Vec<(String, oneshot::Receiver<SendAck>)>,
    offsets: HashMap<TopicPartition, i64>,
}

impl RecordCollector {
    pub(crate) fn new(producer: Arc<dyn Producer>) -> Self {
        Self {
            producer,
            pending: Vec::new(),
            offsets: HashMap::new(),
        }
    }

    /// Serialize and route one record to the producer. The acknowledgement
    /// is collected at the next flush.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn send<K, V>(
        &mut self,
        topic: &str,
        key: &K,
        value: &V,
        timestamp: i64,
        key_serializer: &dyn Serializer<K>,
        value_serializer: &dyn Serializer<V>,
        partitioner: Option<&dyn StreamPartitioner<K, V>>,
    ) -> Result<()> {
        let partition = partitioner.map(|p| p.partition(topic, key, value));
        let record = ProducerRecord {
            topic: topic.to_string(),
            partition,
            key: key_serializer.serialize(topic, key)?,
            value: value_serializer.serialize(topic, value)?,
            timestamp,
        };
        trace!(topic, ?partition, timestamp, "collecting produced record");
        let ack = self.producer.send(record)?;
        self.pending.push((topic.to_string(), ack));
        Ok(())
    }

    /// Block until all previously sent records are durable, folding their
    /// acknowledged offsets into the per-partition highs.
    pub(crate) async fn flush(&mut self) -> Result<()> {
        self.producer.flush().await?;
        for (topic, ack) in self.pending.drain(..) {
            let ack = ack.await.map_err(|_| {
                Error::Producer(format!(
                    "producer dropped the acknowledgement for a record on {topic}"
                ))
            })?;
            let tp = TopicPartition::new(topic, ack.partition);
            let highest = self.offsets.entry(tp).or_insert(ack.offset);
            *highest = (*highest).max(ack.offset);
        }
        Ok(())
    }

    /// Highest acknowledged offset per output partition, as of the last
    /// flush.
    pub(crate) fn offsets(&self) -> &HashMap<TopicPartition, i64> {
        &self.offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::StringSerde;
    use crate::test_utils::MockProducer;

    #[tokio::test]
    async fn test_flush_records_highest_offsets() {
        let producer = Arc::new(MockProducer::new());
        let mut collector = RecordCollector::new(producer.clone());

        for i in 0..3i64 {
            collector
                .send(
                    "out",
                    &"k".to_string(),
                    &format!("v{i}"),
                    100 + i,
                    &StringSerde,
                    &StringSerde,
                    None,
                )
                .unwrap();
        }
        collector.flush().await.unwrap();

        assert_eq!(producer.flush_count(), 1);
        assert_eq!(
            collector.offsets().get(&TopicPartition::new("out", 0)),
            Some(&2)
        );
    }

    #[tokio::test]
    async fn test_partitioner_routes_records() {
        struct KeyLength;
        impl StreamPartitioner<String, String> for KeyLength {
            fn partition(&self, _topic: &str, key: &String, _value: &String) -> u32 {
                key.len() as u32
            }
        }

        let producer = Arc::new(MockProducer::new());
        let mut collector = RecordCollector::new(producer.clone());

        collector
            .send(
                "out",
                &"ab".to_string(),
                &"v".to_string(),
                0,
                &StringSerde,
                &StringSerde,
                Some(&KeyLength),
            )
            .unwrap();
        collector.flush().await.unwrap();

        assert_eq!(
            collector.offsets().get(&TopicPartition::new("out", 2)),
            Some(&0)
        );
    }
}
