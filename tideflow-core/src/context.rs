//! ProcessorContext is the face the engine shows user code. One context
//! exists per node invocation, stacked on the call stack: forwarding to a
//! child builds a fresh context over the same task environment, so the
//! "current node" is saved and restored for free when the nested call
//! returns.

use crate::collector::RecordCollector;
use crate::error::Error;
use crate::message::RecordMetadata;
use crate::punctuation::PunctuationQueue;
use crate::state::StateManager;
use crate::topology::{NodeId, ProcessorTopology};
use crate::Result;

/// The task-owned resources a node invocation can reach, borrowed for the
/// duration of one dispatch into the topology.
pub(crate) struct TaskEnv<'t> {
    pub(crate) task_id: u32,
    /// Metadata of the record being processed; `None` during `init`.
    pub(crate) record: Option<RecordMetadata>,
    /// Stream time as of this dispatch; scheduling anchors to it.
    pub(crate) stream_time: i64,
    pub(crate) collector: &'t mut RecordCollector,
    pub(crate) punctuations: &'t mut PunctuationQueue,
    pub(crate) state: &'t mut StateManager,
    pub(crate) commit_requested: &'t mut bool,
}

pub struct ProcessorContext<'a, 't, K, V> {
    topology: &'a mut ProcessorTopology<K, V>,
    env: &'a mut TaskEnv<'t>,
    node: NodeId,
}

impl<'a, 't, K, V> ProcessorContext<'a, 't, K, V> {
    pub(crate) fn new(
        topology: &'a mut ProcessorTopology<K, V>,
        env: &'a mut TaskEnv<'t>,
        node: NodeId,
    ) -> Self {
        Self {
            topology,
            env,
            node,
        }
    }

    pub fn task_id(&self) -> u32 {
        self.env.task_id
    }

    /// Coordinates of the record currently being processed. Only meaningful
    /// inside `process` and `punctuate`; `None` during `init`.
    pub fn record(&self) -> Option<&RecordMetadata> {
        self.env.record.as_ref()
    }

    /// Stream time as of this dispatch.
    pub fn stream_time(&self) -> i64 {
        self.env.stream_time
    }

    /// Dispatch a record to every child of the current node, in registration
    /// order.
    pub fn forward(&mut self, key: &K, value: &V) -> Result<()> {
        let children = self.topology.children(self.node).to_vec();
        for child in children {
            self.topology.run_node(child, key, value, self.env)?;
        }
        Ok(())
    }

    /// Dispatch a record to one named child of the current node.
    pub fn forward_to(&mut self, child_name: &str, key: &K, value: &V) -> Result<()> {
        let child = self
            .topology
            .children(self.node)
            .iter()
            .copied()
            .find(|&c| self.topology.node_name(c) == child_name);
        match child {
            Some(child) => self.topology.run_node(child, key, value, self.env),
            None => Err(Error::Topology(format!(
                "{child_name} is not a child of {}",
                self.topology.node_name(self.node)
            ))),
        }
    }

    /// Register a periodic punctuation for the current node, anchored to the
    /// current stream time.
    pub fn schedule(&mut self, interval_ms: i64) -> Result<()> {
        self.env
            .punctuations
            .schedule(self.node, interval_ms, self.env.stream_time)
    }

    /// Ask the task to commit at the next record boundary.
    pub fn request_commit(&mut self) {
        *self.env.commit_requested = true;
    }

    pub fn state_manager(&mut self) -> &mut StateManager {
        self.env.state
    }
}
