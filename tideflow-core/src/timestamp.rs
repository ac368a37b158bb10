//! Timestamp extraction. Every record admitted into the partition group gets
//! a millisecond timestamp from the configured extractor; that timestamp is
//! what drives stream time, queue selection, and punctuation. A negative
//! extraction is clamped to −1 so it can never advance stream time.

use chrono::Utc;
use tracing::warn;

/// Extracts a millisecond timestamp from a deserialized key/value pair.
pub trait TimestampExtractor<K, V>: Send + Sync {
    fn extract(&self, topic: &str, key: &K, value: &V) -> i64;
}

/// Stamps every record with the wall-clock time at ingestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClockExtractor;

impl<K, V> TimestampExtractor<K, V> for WallClockExtractor {
    fn extract(&self, _topic: &str, _key: &K, _value: &V) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clamp an extracted timestamp to the engine's domain. Anything negative
/// becomes −1: the record is still processable but contributes nothing to
/// stream time.
pub(crate) fn clamp(extracted: i64, topic: &str, partition: u32, offset: i64) -> i64 {
    if extracted < -1 {
        warn!(
            topic,
            partition, offset, extracted, "negative extracted timestamp, treating as -1"
        );
        return -1;
    }
    extracted
}
