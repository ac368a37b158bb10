//! RecordQueue is the per-partition FIFO of stamped records buffered between
//! the fetcher and the task's step loop. It never reorders: cross-partition
//! time ordering is the partition group's job. The queue also owns the
//! min-timestamp tracker and remembers the highest offset it has ever
//! admitted.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::message::{StampedRecord, TopicPartition};
use crate::serialization::Deserializer;
use crate::topology::NodeId;
use crate::tracker::MinTimestampTracker;

/// The deserializer pair of the source node a queue feeds. Records are
/// deserialized with these at ingestion, before timestamp extraction.
pub(crate) struct SourceSerde<K, V> {
    pub(crate) key: Arc<dyn Deserializer<K>>,
    pub(crate) value: Arc<dyn Deserializer<V>>,
}

impl<K, V> Clone for SourceSerde<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
            value: Arc::clone(&self.value),
        }
    }
}

pub(crate) struct RecordQueue<K, V> {
    partition: TopicPartition,
    source: NodeId,
    serde: SourceSerde<K, V>,
    queue: VecDeque<StampedRecord<K, V>>,
    tracker: MinTimestampTracker,
    highest_offset: i64,
}

impl<K, V> RecordQueue<K, V> {
    pub(crate) fn new(partition: TopicPartition, source: NodeId, serde: SourceSerde<K, V>) -> Self {
        Self {
            partition,
            source,
            serde,
            queue: VecDeque::new(),
            tracker: MinTimestampTracker::new(),
            highest_offset: -1,
        }
    }

    pub(crate) fn add(&mut self, record: StampedRecord<K, V>) {
        self.tracker.add(record.timestamp, record.offset);
        self.highest_offset = self.highest_offset.max(record.offset);
        self.queue.push_back(record);
    }

    pub(crate) fn poll(&mut self) -> Option<StampedRecord<K, V>> {
        let record = self.queue.pop_front()?;
        self.tracker.remove(record.offset);
        Some(record)
    }

    /// Timestamp of the record at the head of the FIFO, i.e. the next record
    /// this partition will yield.
    pub(crate) fn head_timestamp(&self) -> Option<i64> {
        self.queue.front().map(|r| r.timestamp)
    }

    pub(crate) fn size(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn partition(&self) -> &TopicPartition {
        &self.partition
    }

    pub(crate) fn source_node(&self) -> NodeId {
        self.source
    }

    pub(crate) fn serde(&self) -> &SourceSerde<K, V> {
        &self.serde
    }

    pub(crate) fn highest_offset(&self) -> i64 {
        self.highest_offset
    }

    /// Lower bound on the timestamps of the records currently buffered, or
    /// -1 when the queue is empty.
    pub(crate) fn tracked_timestamp(&self) -> i64 {
        self.tracker.get()
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.tracker = MinTimestampTracker::new();
    }
}
