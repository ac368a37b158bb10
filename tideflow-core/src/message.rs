//! Record types that flow through the engine. A [RawRecord] is what the
//! upstream fetcher hands to [crate::task::StreamTask::add_records]; once its
//! key and value are deserialized and a timestamp has been extracted it
//! becomes a [StampedRecord] buffered in a per-partition queue. On the way
//! out, sink nodes build a [ProducerRecord] and the producer acknowledges it
//! with a [SendAck].

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A partition of one input or output topic. The engine treats the pair as an
/// opaque identity; ordering (topic, then partition index) is only used to
/// make cross-queue tie-breaks deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: u32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A record as delivered by the fetcher, before deserialization.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: i64,
    pub key: Bytes,
    pub value: Bytes,
}

/// A deserialized record paired with its extracted timestamp. Immutable once
/// constructed.
#[derive(Debug, Clone)]
pub struct StampedRecord<K, V> {
    pub topic: String,
    pub partition: u32,
    pub offset: i64,
    pub timestamp: i64,
    pub key: K,
    pub value: V,
}

impl<K, V> StampedRecord<K, V> {
    pub fn metadata(&self) -> RecordMetadata {
        RecordMetadata {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
            timestamp: self.timestamp,
        }
    }
}

/// The coordinates of the record currently being processed, exposed to user
/// processors through [crate::context::ProcessorContext::record].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: u32,
    pub offset: i64,
    pub timestamp: i64,
}

impl fmt::Display for RecordMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}@{} ts={}",
            self.topic, self.partition, self.offset, self.timestamp
        )
    }
}

/// A serialized record on its way to the producer.
#[derive(Debug, Clone)]
pub struct ProducerRecord {
    pub topic: String,
    /// Explicit partition when a sink partitioner chose one; the producer
    /// assigns a partition when `None`.
    pub partition: Option<u32>,
    pub key: Bytes,
    pub value: Bytes,
    pub timestamp: i64,
}

/// Acknowledgement for one produced record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendAck {
    pub partition: u32,
    pub offset: i64,
}
