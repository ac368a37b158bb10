//! PartitionGroup merges the per-partition record queues of one task into a
//! single logical stream. Raw records are deserialized, stamped, and
//! buffered the moment they arrive; the step loop then repeatedly asks for
//! the queue whose head record carries the lowest timestamp, which
//! approximates merging K sorted per-partition streams.
//!
//! The group also owns stream time: the minimum tracked timestamp across the
//! non-empty queues, clamped so that late records may enter a queue but can
//! never turn the clock back.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::config::DeserializationPolicy;
use crate::error::Error;
use crate::message::{RawRecord, StampedRecord, TopicPartition};
use crate::queue::RecordQueue;
use crate::timestamp::{self, TimestampExtractor};
use crate::topology::NodeId;
use crate::Result;

/// Outcome of one `add_raw_records` call.
#[derive(Debug)]
pub(crate) struct AddedRecords {
    /// Size of the partition's queue after ingestion.
    pub(crate) queue_size: usize,
    /// Offsets of records dropped under [DeserializationPolicy::SkipAndLog].
    pub(crate) skipped_offsets: Vec<i64>,
}

pub(crate) struct PartitionGroup<K, V> {
    // BTreeMap so that iteration order, and therefore head-timestamp
    // tie-breaking, is the lowest (topic, partition).
    queues: BTreeMap<TopicPartition, RecordQueue<K, V>>,
    extractor: Arc<dyn TimestampExtractor<K, V>>,
    policy: DeserializationPolicy,
    stream_time: i64,
}

impl<K, V> PartitionGroup<K, V> {
    pub(crate) fn new(
        queues: BTreeMap<TopicPartition, RecordQueue<K, V>>,
        extractor: Arc<dyn TimestampExtractor<K, V>>,
        policy: DeserializationPolicy,
    ) -> Self {
        Self {
            queues,
            extractor,
            policy,
            stream_time: -1,
        }
    }

    /// Deserialize, stamp, and buffer a batch of raw records. Ingestion is
    /// immediate: by the time this returns, the records are visible to the
    /// step loop and the returned queue size reflects them.
    pub(crate) fn add_raw_records<I>(
        &mut self,
        partition: &TopicPartition,
        records: I,
    ) -> Result<AddedRecords>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let queue = self
            .queues
            .get_mut(partition)
            .ok_or_else(|| Error::UnknownPartition(partition.to_string()))?;
        let serde = queue.serde().clone();

        let mut skipped_offsets = Vec::new();
        for raw in records {
            let deserialized = serde
                .key
                .deserialize(&raw.topic, &raw.key)
                .and_then(|key| {
                    serde
                        .value
                        .deserialize(&raw.topic, &raw.value)
                        .map(|value| (key, value))
                });
            let (key, value) = match deserialized {
                Ok(kv) => kv,
                Err(e) => match self.policy {
                    DeserializationPolicy::Fail => return Err(e),
                    DeserializationPolicy::SkipAndLog => {
                        warn!(
                            partition = %partition,
                            offset = raw.offset,
                            error = %e,
                            "skipping undeserializable record"
                        );
                        skipped_offsets.push(raw.offset);
                        continue;
                    }
                },
            };

            let extracted = self.extractor.extract(&raw.topic, &key, &value);
            let ts = timestamp::clamp(extracted, &raw.topic, raw.partition, raw.offset);
            queue.add(StampedRecord {
                topic: raw.topic,
                partition: raw.partition,
                offset: raw.offset,
                timestamp: ts,
                key,
                value,
            });
        }

        Ok(AddedRecords {
            queue_size: queue.size(),
            skipped_offsets,
        })
    }

    /// The partition whose queue should be drained next: non-empty, lowest
    /// head-record timestamp, ties to the lowest (topic, partition). `None`
    /// iff every queue is empty.
    pub(crate) fn next_queue(&self) -> Option<TopicPartition> {
        let mut best: Option<(i64, &TopicPartition)> = None;
        for (partition, queue) in &self.queues {
            if let Some(head) = queue.head_timestamp() {
                if best.map_or(true, |(ts, _)| head < ts) {
                    best = Some((head, partition));
                }
            }
        }
        best.map(|(_, partition)| partition.clone())
    }

    /// Pop the head of the queue just selected by [Self::next_queue],
    /// advancing the group's clock first: the record being handed out still
    /// counts as buffered work at selection time, so the clock moves to the
    /// minimum tracked timestamp as of before the pop.
    pub(crate) fn poll_record(&mut self, partition: &TopicPartition) -> Option<StampedRecord<K, V>> {
        if let Some(min) = self.tracked_minimum() {
            self.stream_time = self.stream_time.max(min);
        }
        self.queues.get_mut(partition)?.poll()
    }

    /// The group's logical clock. It advances on every poll to the minimum
    /// tracked timestamp across the non-empty queues, clamped to never
    /// decrease; while all queues are empty it holds the last value. A late
    /// record can enter a queue but cannot turn the clock back.
    pub(crate) fn stream_time(&self) -> i64 {
        self.stream_time
    }

    fn tracked_minimum(&self) -> Option<i64> {
        self.queues
            .values()
            .filter(|q| !q.is_empty())
            .map(|q| q.tracked_timestamp())
            .min()
    }

    pub(crate) fn source_node(&self, partition: &TopicPartition) -> Option<NodeId> {
        self.queues.get(partition).map(|q| q.source_node())
    }

    pub(crate) fn num_buffered(&self, partition: &TopicPartition) -> usize {
        self.queues.get(partition).map_or(0, |q| q.size())
    }

    pub(crate) fn num_buffered_total(&self) -> usize {
        self.queues.values().map(|q| q.size()).sum()
    }

    pub(crate) fn partitions(&self) -> impl Iterator<Item = &TopicPartition> {
        self.queues.keys()
    }

    pub(crate) fn close(&mut self) {
        for queue in self.queues.values_mut() {
            queue.clear();
        }
    }
}
