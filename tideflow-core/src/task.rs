//! StreamTask drives one partition set through one topology. Records arrive
//! from the fetcher via [StreamTask::add_records] and are buffered per
//! partition; [StreamTask::process] pops one record at a time from the queue
//! with the lowest head timestamp, runs it through the topology, maintains
//! the consumed-offset map, honors pending commit requests, signals
//! pause/resume watermarks back to the consumer, and fires due punctuations.
//!
//! The task has no lock: exclusive access is expressed through `&mut self`,
//! and the owning worker serializes `add_records` with
//! `process`/`commit`/`close`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info};

use crate::collector::RecordCollector;
use crate::config::TaskConfig;
use crate::consumer::Consumer;
use crate::context::TaskEnv;
use crate::error::Error;
use crate::group::PartitionGroup;
use crate::message::{RawRecord, RecordMetadata, TopicPartition};
use crate::producer::Producer;
use crate::punctuation::PunctuationQueue;
use crate::queue::RecordQueue;
use crate::state::StateManager;
use crate::timestamp::TimestampExtractor;
use crate::topology::{NodeId, ProcessorTopology};
use crate::Result;

pub struct StreamTask<K, V> {
    id: u32,
    max_buffered_size: usize,
    consumer: Arc<dyn Consumer>,
    group: PartitionGroup<K, V>,
    punctuations: PunctuationQueue,
    topology: ProcessorTopology<K, V>,
    collector: RecordCollector,
    state: StateManager,
    consumed_offsets: HashMap<TopicPartition, i64>,
    commit_requested: bool,
    commit_offset_needed: bool,
    // Set only while a record is being processed; left in place when
    // processing unwinds with an error, for diagnostics.
    current: Option<(RecordMetadata, NodeId)>,
}

impl<K, V> StreamTask<K, V> {
    /// Create a task over its assigned partitions. Each partition's queue is
    /// wired to the source node of its topic, and every processor node is
    /// initialized before the task accepts records.
    pub fn new(
        id: u32,
        partitions: Vec<TopicPartition>,
        mut topology: ProcessorTopology<K, V>,
        consumer: Arc<dyn Consumer>,
        producer: Arc<dyn Producer>,
        extractor: Arc<dyn TimestampExtractor<K, V>>,
        config: &TaskConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut queues = BTreeMap::new();
        for partition in partitions {
            let source = topology.source(&partition.topic).ok_or_else(|| {
                Error::Topology(format!("no source node for topic {}", partition.topic))
            })?;
            let serde = topology.source_serde(source).ok_or_else(|| {
                Error::Topology(format!("source node for topic {} is malformed", partition.topic))
            })?;
            let queue = RecordQueue::new(partition.clone(), source, serde);
            if queues.insert(partition.clone(), queue).is_some() {
                return Err(Error::Task(format!("partition {partition} assigned twice")));
            }
        }

        let group = PartitionGroup::new(queues, extractor, config.deserialization_policy);
        let mut collector = RecordCollector::new(producer);
        let mut state = StateManager::new();
        let mut punctuations = PunctuationQueue::new();
        let mut commit_requested = false;

        {
            let mut env = TaskEnv {
                task_id: id,
                record: None,
                stream_time: group.stream_time(),
                collector: &mut collector,
                punctuations: &mut punctuations,
                state: &mut state,
                commit_requested: &mut commit_requested,
            };
            topology.init(&mut env)?;
        }

        info!(task = id, "task initialized");

        Ok(Self {
            id,
            max_buffered_size: config.buffered_records_per_partition,
            consumer,
            group,
            punctuations,
            topology,
            collector,
            state,
            consumed_offsets: HashMap::new(),
            commit_requested,
            commit_offset_needed: false,
            current: None,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn partitions(&self) -> Vec<TopicPartition> {
        self.group.partitions().cloned().collect()
    }

    /// Buffer a batch of raw records for one assigned partition. Ingestion
    /// is immediate; if the partition's queue has grown past the buffering
    /// watermark the consumer is paused for it. This is the only place a
    /// pause is issued.
    pub fn add_records<I>(&mut self, partition: &TopicPartition, records: I) -> Result<()>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let added = self.group.add_raw_records(partition, records)?;

        for offset in added.skipped_offsets {
            // a skipped poison record still moves the consumed offset so it
            // is not refetched after a restart
            self.consumed_offsets.insert(partition.clone(), offset);
            self.commit_offset_needed = true;
        }

        if added.queue_size > self.max_buffered_size {
            debug!(task = self.id, partition = %partition, size = added.queue_size, "pausing partition");
            self.consumer.pause(partition);
        }
        Ok(())
    }

    /// Process one buffered record.
    ///
    /// Returns the number of records left buffered across all partitions, or
    /// 0 when there was nothing to process.
    pub async fn process(&mut self) -> Result<usize> {
        let Some(partition) = self.group.next_queue() else {
            return Ok(0);
        };
        let Some(record) = self.group.poll_record(&partition) else {
            return Ok(0);
        };
        let source = self
            .group
            .source_node(&partition)
            .ok_or_else(|| Error::Task(format!("no queue for partition {partition}")))?;

        let metadata = record.metadata();
        self.current = Some((metadata.clone(), source));
        debug!(task = self.id, record = %metadata, "start processing record");

        let stream_time = self.group.stream_time();
        {
            let mut env = TaskEnv {
                task_id: self.id,
                record: Some(metadata.clone()),
                stream_time,
                collector: &mut self.collector,
                punctuations: &mut self.punctuations,
                state: &mut self.state,
                commit_requested: &mut self.commit_requested,
            };
            self.topology
                .run_node(source, &record.key, &record.value, &mut env)?;
        }
        debug!(task = self.id, record = %metadata, "completed processing record");

        self.consumed_offsets
            .insert(partition.clone(), record.offset);
        self.commit_offset_needed = true;

        if self.commit_requested {
            self.commit().await?;
            self.commit_requested = false;
        }

        // exactly one resume per pause: the pause fired on growing strictly
        // past the watermark, the resume fires on draining back to it
        if self.group.num_buffered(&partition) == self.max_buffered_size {
            debug!(task = self.id, partition = %partition, "resuming partition");
            self.consumer.resume(&partition);
        }

        self.punctuate(self.group.stream_time())?;

        self.current = None;
        Ok(self.group.num_buffered_total())
    }

    /// Commit the task state: local stores first, then consumed offsets,
    /// then the produced-record flush. Replay after a crash between the
    /// steps redoes work — at-least-once, by design.
    pub async fn commit(&mut self) -> Result<()> {
        debug!(task = self.id, "committing task state");

        // 1) flush local state
        self.state.flush()?;

        // 2) commit consumed offsets if any record was processed since the
        //    last commit
        if self.commit_offset_needed {
            self.consumer
                .commit(&self.consumed_offsets)
                .await
                .map_err(|e| Error::Commit(format!("offset commit failed: {e}")))?;
            self.commit_offset_needed = false;
        }

        // 3) flush produced records in the downstream
        self.collector.flush().await?;

        Ok(())
    }

    /// Request a commit; honored at the next record boundary inside
    /// [Self::process].
    pub fn needs_commit(&mut self) {
        self.commit_requested = true;
    }

    /// The record being processed right now, if any. Remains set when
    /// `process` unwinds with an error.
    pub fn current_record(&self) -> Option<&RecordMetadata> {
        self.current.as_ref().map(|(meta, _)| meta)
    }

    pub fn consumed_offsets(&self) -> &HashMap<TopicPartition, i64> {
        &self.consumed_offsets
    }

    /// Highest acknowledged produced offset per output partition, as of the
    /// last commit.
    pub fn produced_offsets(&self) -> &HashMap<TopicPartition, i64> {
        self.collector.offsets()
    }

    /// Drain the task. Legal only between `process` calls; the owning worker
    /// commits beforehand if it wants the final offsets recorded.
    pub fn close(&mut self) {
        info!(task = self.id, "closing task");
        self.group.close();
        self.consumed_offsets.clear();
        self.topology.close();
        self.state.close();
    }

    fn punctuate(&mut self, stream_time: i64) -> Result<()> {
        while let Some(schedule) = self.punctuations.pop_due(stream_time) {
            let record = self.current.as_ref().map(|(meta, _)| meta.clone());
            let result = {
                let mut env = TaskEnv {
                    task_id: self.id,
                    record,
                    stream_time,
                    collector: &mut self.collector,
                    punctuations: &mut self.punctuations,
                    state: &mut self.state,
                    commit_requested: &mut self.commit_requested,
                };
                self.topology
                    .run_punctuate(schedule.node, stream_time, &mut env)
            };
            // reinsert before surfacing an error so a failed fire does not
            // lose the schedule
            self.punctuations.reschedule(schedule);
            result?;
        }
        Ok(())
    }
}
