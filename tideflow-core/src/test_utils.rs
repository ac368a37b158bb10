//! Test doubles shared across module tests: a consumer that records
//! pause/resume transitions and commits, a producer that acknowledges sends
//! in order, a state store that logs flushes, and a few probe processors.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::consumer::Consumer;
use crate::context::ProcessorContext;
use crate::message::{ProducerRecord, RawRecord, SendAck, TopicPartition};
use crate::producer::Producer;
use crate::state::StateStore;
use crate::timestamp::TimestampExtractor;
use crate::topology::Processor;
use crate::Result;

/// Shared chronological log used to assert cross-collaborator ordering.
pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Extracts the record timestamp from the value, which tests encode as a
/// decimal string.
pub(crate) struct ValueTimestampExtractor;

impl TimestampExtractor<String, String> for ValueTimestampExtractor {
    fn extract(&self, _topic: &str, _key: &String, value: &String) -> i64 {
        value.parse().unwrap_or(-1)
    }
}

pub(crate) fn raw_record(topic: &str, partition: u32, offset: i64, timestamp: i64) -> RawRecord {
    RawRecord {
        topic: topic.to_string(),
        partition,
        offset,
        key: Bytes::from(format!("k{offset}")),
        value: Bytes::from(timestamp.to_string()),
    }
}

#[derive(Default)]
struct MockConsumerInner {
    paused: HashSet<TopicPartition>,
    pauses: HashMap<TopicPartition, usize>,
    resumes: HashMap<TopicPartition, usize>,
    committed: HashMap<TopicPartition, i64>,
    commit_count: usize,
}

/// Consumer double counting effective pause/resume transitions (repeated
/// pause of an already-paused partition is the idempotent no-op a real
/// consumer treats it as).
#[derive(Default)]
pub(crate) struct MockConsumer {
    inner: Mutex<MockConsumerInner>,
    events: Option<EventLog>,
}

impl MockConsumer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_events(events: EventLog) -> Self {
        Self {
            inner: Mutex::default(),
            events: Some(events),
        }
    }

    pub(crate) fn pauses(&self, partition: &TopicPartition) -> usize {
        self.inner
            .lock()
            .unwrap()
            .pauses
            .get(partition)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn resumes(&self, partition: &TopicPartition) -> usize {
        self.inner
            .lock()
            .unwrap()
            .resumes
            .get(partition)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn is_paused(&self, partition: &TopicPartition) -> bool {
        self.inner.lock().unwrap().paused.contains(partition)
    }

    pub(crate) fn committed(&self, partition: &TopicPartition) -> Option<i64> {
        self.inner
            .lock()
            .unwrap()
            .committed
            .get(partition)
            .copied()
    }

    pub(crate) fn commit_count(&self) -> usize {
        self.inner.lock().unwrap().commit_count
    }
}

#[async_trait]
impl Consumer for MockConsumer {
    fn pause(&self, partition: &TopicPartition) {
        let mut inner = self.inner.lock().unwrap();
        if inner.paused.insert(partition.clone()) {
            *inner.pauses.entry(partition.clone()).or_default() += 1;
        }
    }

    fn resume(&self, partition: &TopicPartition) {
        let mut inner = self.inner.lock().unwrap();
        if inner.paused.remove(partition) {
            *inner.resumes.entry(partition.clone()).or_default() += 1;
        }
    }

    async fn commit(&self, offsets: &HashMap<TopicPartition, i64>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.commit_count += 1;
        inner
            .committed
            .extend(offsets.iter().map(|(k, v)| (k.clone(), *v)));
        if let Some(events) = &self.events {
            events.lock().unwrap().push("consumer.commit".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SentRecord {
    pub(crate) topic: String,
    pub(crate) partition: u32,
    pub(crate) offset: i64,
    pub(crate) key: Bytes,
    pub(crate) value: Bytes,
    pub(crate) timestamp: i64,
}

#[derive(Default)]
struct MockProducerInner {
    next_offsets: HashMap<(String, u32), i64>,
    sent: Vec<SentRecord>,
    flush_count: usize,
}

/// Producer double acknowledging every send immediately with sequentially
/// assigned per-partition offsets.
#[derive(Default)]
pub(crate) struct MockProducer {
    inner: Mutex<MockProducerInner>,
    events: Option<EventLog>,
}

impl MockProducer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_events(events: EventLog) -> Self {
        Self {
            inner: Mutex::default(),
            events: Some(events),
        }
    }

    pub(crate) fn sent(&self) -> Vec<SentRecord> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub(crate) fn flush_count(&self) -> usize {
        self.inner.lock().unwrap().flush_count
    }
}

#[async_trait]
impl Producer for MockProducer {
    fn send(&self, record: ProducerRecord) -> Result<oneshot::Receiver<SendAck>> {
        let mut inner = self.inner.lock().unwrap();
        let partition = record.partition.unwrap_or(0);
        let next = inner
            .next_offsets
            .entry((record.topic.clone(), partition))
            .or_insert(0);
        let offset = *next;
        *next += 1;
        inner.sent.push(SentRecord {
            topic: record.topic,
            partition,
            offset,
            key: record.key,
            value: record.value,
            timestamp: record.timestamp,
        });
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(SendAck { partition, offset });
        Ok(rx)
    }

    async fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.flush_count += 1;
        if let Some(events) = &self.events {
            events.lock().unwrap().push("producer.flush".to_string());
        }
        Ok(())
    }
}

/// State store double that logs its flushes into the shared event log.
pub(crate) struct EventLogStore {
    name: String,
    events: EventLog,
}

impl EventLogStore {
    pub(crate) fn new(name: impl Into<String>, events: EventLog) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }
}

impl StateStore for EventLogStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn flush(&mut self) -> Result<()> {
        self.events.lock().unwrap().push("state.flush".to_string());
        Ok(())
    }

    fn close(&mut self) {}

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Processor probe recording every record it sees before forwarding it.
pub(crate) struct CaptureProcessor {
    pub(crate) seen: Arc<Mutex<Vec<(TopicPartition, i64, String, String)>>>,
}

impl CaptureProcessor {
    pub(crate) fn new() -> (Self, Arc<Mutex<Vec<(TopicPartition, i64, String, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Self { seen: seen.clone() }, seen)
    }
}

impl Processor<String, String> for CaptureProcessor {
    fn process(
        &mut self,
        ctx: &mut ProcessorContext<'_, '_, String, String>,
        key: &String,
        value: &String,
    ) -> Result<()> {
        let meta = ctx.record().cloned().expect("record metadata in process");
        self.seen.lock().unwrap().push((
            TopicPartition::new(meta.topic, meta.partition),
            meta.offset,
            key.clone(),
            value.clone(),
        ));
        ctx.forward(key, value)
    }
}

/// Processor probe that schedules one punctuation at init and records the
/// stream times it fires at.
pub(crate) struct PunctuateProbe {
    interval: i64,
    pub(crate) fired: Arc<Mutex<Vec<i64>>>,
}

impl PunctuateProbe {
    pub(crate) fn new(interval: i64) -> (Self, Arc<Mutex<Vec<i64>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                interval,
                fired: fired.clone(),
            },
            fired,
        )
    }
}

impl Processor<String, String> for PunctuateProbe {
    fn init(&mut self, ctx: &mut ProcessorContext<'_, '_, String, String>) -> Result<()> {
        ctx.schedule(self.interval)
    }

    fn process(
        &mut self,
        ctx: &mut ProcessorContext<'_, '_, String, String>,
        key: &String,
        value: &String,
    ) -> Result<()> {
        ctx.forward(key, value)
    }

    fn punctuate(
        &mut self,
        _ctx: &mut ProcessorContext<'_, '_, String, String>,
        stream_time: i64,
    ) -> Result<()> {
        self.fired.lock().unwrap().push(stream_time);
        Ok(())
    }
}
