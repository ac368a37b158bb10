//! TaskWorker owns one or more tasks and runs them serially on a single
//! loop: batches from the fetcher are ingested the moment they arrive, the
//! tasks are drained one record at a time, a ticker requests commits at the
//! configured cadence, and cancellation triggers a final commit before the
//! tasks are closed. Errors from any task stop the worker; the tasks are
//! closed and the error surfaces to the caller.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Error;
use crate::message::{RawRecord, TopicPartition};
use crate::task::StreamTask;
use crate::Result;

/// One fetched batch for one partition, as handed over by the fetcher.
#[derive(Debug)]
pub struct FetchedBatch {
    pub partition: TopicPartition,
    pub records: Vec<RawRecord>,
}

pub struct TaskWorker<K, V> {
    tasks: Vec<StreamTask<K, V>>,
    assignments: HashMap<TopicPartition, usize>,
    batches: mpsc::Receiver<FetchedBatch>,
    commit_interval: Duration,
    shutdown: CancellationToken,
}

impl<K, V> std::fmt::Debug for TaskWorker<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskWorker")
            .field("task_count", &self.tasks.len())
            .field("assignments", &self.assignments)
            .field("commit_interval", &self.commit_interval)
            .finish()
    }
}

impl<K, V> TaskWorker<K, V> {
    pub fn new(
        tasks: Vec<StreamTask<K, V>>,
        batches: mpsc::Receiver<FetchedBatch>,
        commit_interval: Duration,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let mut assignments = HashMap::new();
        for (index, task) in tasks.iter().enumerate() {
            for partition in task.partitions() {
                if assignments.insert(partition.clone(), index).is_some() {
                    return Err(Error::Config(format!(
                        "partition {partition} is assigned to more than one task"
                    )));
                }
            }
        }
        Ok(Self {
            tasks,
            assignments,
            batches,
            commit_interval,
            shutdown,
        })
    }

    /// Run until cancellation or until the fetcher hangs up, then commit and
    /// close every task.
    pub async fn run(mut self) -> Result<()> {
        info!(tasks = self.tasks.len(), "worker started");
        let result = self.run_loop().await;
        if let Err(e) = &result {
            error!(error = %e, "worker stopping on task failure");
        }
        for task in &mut self.tasks {
            task.close();
        }
        info!("worker stopped");
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.commit_interval);
        // the first tick fires immediately; skip it
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    for task in &mut self.tasks {
                        task.needs_commit();
                    }
                }
                batch = self.batches.recv() => {
                    match batch {
                        Some(batch) => self.ingest(batch)?,
                        // fetcher hung up: finish what is buffered and stop
                        None => break,
                    }
                }
            }
            self.drain().await?;
        }

        self.drain().await?;
        for task in &mut self.tasks {
            task.commit().await?;
        }
        Ok(())
    }

    fn ingest(&mut self, batch: FetchedBatch) -> Result<()> {
        let index = *self
            .assignments
            .get(&batch.partition)
            .ok_or_else(|| Error::UnknownPartition(batch.partition.to_string()))?;
        self.tasks[index].add_records(&batch.partition, batch.records)
    }

    /// Process until every task reports an empty partition group.
    async fn drain(&mut self) -> Result<()> {
        loop {
            let mut buffered = 0;
            for task in &mut self.tasks {
                buffered += task.process().await?;
            }
            if buffered == 0 {
                return Ok(());
            }
        }
    }
}
