//! The processor topology: a wired graph of source, intermediate, and sink
//! nodes that one task drives record by record. Sources receive the
//! deserialized records of their topic, intermediate nodes run user code and
//! forward to their children, sinks serialize and hand records to the record
//! collector.
//!
//! While a processor executes, its box is taken out of the node slot and the
//! context borrows the rest of the graph. That is the save/restore
//! discipline for the "current node": each nested `forward` call carries its
//! own node id on the call stack, and the slot is restored when the call
//! returns.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::context::{ProcessorContext, TaskEnv};
use crate::error::Error;
use crate::queue::SourceSerde;
use crate::serialization::{Deserializer, Serializer};
use crate::Result;

pub type NodeId = usize;

/// Chooses the output partition for a record leaving through a sink.
pub trait StreamPartitioner<K, V>: Send + Sync {
    fn partition(&self, topic: &str, key: &K, value: &V) -> u32;
}

/// A node of the topology running user code.
///
/// `process` is invoked once per record reaching the node; `punctuate` fires
/// when a schedule registered through
/// [ProcessorContext::schedule](crate::context::ProcessorContext::schedule)
/// comes due. Errors escaping either are fatal to the task.
pub trait Processor<K, V>: Send {
    fn init(&mut self, _ctx: &mut ProcessorContext<'_, '_, K, V>) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessorContext<'_, '_, K, V>, key: &K, value: &V)
        -> Result<()>;

    fn punctuate(
        &mut self,
        _ctx: &mut ProcessorContext<'_, '_, K, V>,
        _stream_time: i64,
    ) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

pub(crate) enum NodeKind<K, V> {
    Source {
        key_deserializer: Arc<dyn Deserializer<K>>,
        value_deserializer: Arc<dyn Deserializer<V>>,
    },
    Processor {
        // Empty only while the node is executing.
        processor: Option<Box<dyn Processor<K, V>>>,
    },
    Sink {
        topic: String,
        key_serializer: Arc<dyn Serializer<K>>,
        value_serializer: Arc<dyn Serializer<V>>,
        partitioner: Option<Arc<dyn StreamPartitioner<K, V>>>,
    },
}

pub(crate) struct Node<K, V> {
    name: String,
    kind: NodeKind<K, V>,
    children: Vec<NodeId>,
}

pub struct ProcessorTopology<K, V> {
    nodes: Vec<Node<K, V>>,
    sources: BTreeMap<String, NodeId>,
}

impl<K, V> std::fmt::Debug for ProcessorTopology<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorTopology")
            .field("node_count", &self.nodes.len())
            .field("sources", &self.sources)
            .finish()
    }
}

impl<K, V> ProcessorTopology<K, V> {
    /// The source node a topic's records are dispatched to.
    pub(crate) fn source(&self, topic: &str) -> Option<NodeId> {
        self.sources.get(topic).copied()
    }

    pub(crate) fn source_serde(&self, id: NodeId) -> Option<SourceSerde<K, V>> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Source {
                key_deserializer,
                value_deserializer,
            } => Some(SourceSerde {
                key: Arc::clone(key_deserializer),
                value: Arc::clone(value_deserializer),
            }),
            _ => None,
        }
    }

    pub(crate) fn node_name(&self, id: NodeId) -> &str {
        &self.nodes[id].name
    }

    pub(crate) fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Initialize every processor node, in topological (insertion) order.
    pub(crate) fn init(&mut self, env: &mut TaskEnv<'_>) -> Result<()> {
        for id in 0..self.nodes.len() {
            if matches!(self.nodes[id].kind, NodeKind::Processor { .. }) {
                let mut processor = self.take_processor(id)?;
                let result = {
                    let mut ctx = ProcessorContext::new(self, env, id);
                    processor.init(&mut ctx)
                };
                self.put_back(id, processor);
                result?;
            }
        }
        Ok(())
    }

    /// Drive one record through the node `id` and, transitively, everything
    /// it forwards to.
    pub(crate) fn run_node(
        &mut self,
        id: NodeId,
        key: &K,
        value: &V,
        env: &mut TaskEnv<'_>,
    ) -> Result<()> {
        if matches!(self.nodes[id].kind, NodeKind::Source { .. }) {
            let children = self.nodes[id].children.clone();
            for child in children {
                self.run_node(child, key, value, env)?;
            }
            return Ok(());
        }

        if matches!(self.nodes[id].kind, NodeKind::Processor { .. }) {
            let mut processor = self.take_processor(id)?;
            let result = {
                let mut ctx = ProcessorContext::new(self, env, id);
                processor.process(&mut ctx, key, value)
            };
            self.put_back(id, processor);
            return result;
        }

        let NodeKind::Sink {
            topic,
            key_serializer,
            value_serializer,
            partitioner,
        } = &self.nodes[id].kind
        else {
            return Err(Error::Topology(format!("node {id} has no kind")));
        };
        let timestamp = env
            .record
            .as_ref()
            .map_or(env.stream_time, |r| r.timestamp);
        env.collector.send(
            topic,
            key,
            value,
            timestamp,
            key_serializer.as_ref(),
            value_serializer.as_ref(),
            partitioner.as_deref(),
        )
    }

    /// Fire a due punctuation on node `id`.
    pub(crate) fn run_punctuate(
        &mut self,
        id: NodeId,
        stream_time: i64,
        env: &mut TaskEnv<'_>,
    ) -> Result<()> {
        if !matches!(self.nodes[id].kind, NodeKind::Processor { .. }) {
            return Ok(());
        }
        let mut processor = self.take_processor(id)?;
        let result = {
            let mut ctx = ProcessorContext::new(self, env, id);
            processor.punctuate(&mut ctx, stream_time)
        };
        self.put_back(id, processor);
        result
    }

    /// Close user nodes in reverse topological order.
    pub(crate) fn close(&mut self) {
        for node in self.nodes.iter_mut().rev() {
            if let NodeKind::Processor {
                processor: Some(processor),
            } = &mut node.kind
            {
                processor.close();
            }
        }
    }

    fn take_processor(&mut self, id: NodeId) -> Result<Box<dyn Processor<K, V>>> {
        let taken = match &mut self.nodes[id].kind {
            NodeKind::Processor { processor } => processor.take(),
            _ => None,
        };
        taken.ok_or_else(|| {
            Error::Topology(format!(
                "node {} is already executing",
                self.nodes[id].name
            ))
        })
    }

    fn put_back(&mut self, id: NodeId, processor: Box<dyn Processor<K, V>>) {
        if let NodeKind::Processor { processor: slot } = &mut self.nodes[id].kind {
            *slot = Some(processor);
        }
    }
}

/// Assembles a [ProcessorTopology]. Parents must exist before their
/// children, which keeps the node vector in topological order.
pub struct TopologyBuilder<K, V> {
    nodes: Vec<Node<K, V>>,
    names: HashMap<String, NodeId>,
    sources: BTreeMap<String, NodeId>,
}

impl<K, V> TopologyBuilder<K, V> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            names: HashMap::new(),
            sources: BTreeMap::new(),
        }
    }

    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        topic: impl Into<String>,
        key_deserializer: Arc<dyn Deserializer<K>>,
        value_deserializer: Arc<dyn Deserializer<V>>,
    ) -> Result<&mut Self> {
        let name = name.into();
        let topic = topic.into();
        let id = self.reserve(&name)?;
        if self.sources.contains_key(&topic) {
            return Err(Error::Topology(format!(
                "topic {topic} already has a source node"
            )));
        }
        self.sources.insert(topic, id);
        self.nodes.push(Node {
            name,
            kind: NodeKind::Source {
                key_deserializer,
                value_deserializer,
            },
            children: Vec::new(),
        });
        Ok(self)
    }

    pub fn add_processor(
        &mut self,
        name: impl Into<String>,
        processor: Box<dyn Processor<K, V>>,
        parents: &[&str],
    ) -> Result<&mut Self> {
        let name = name.into();
        let id = self.reserve(&name)?;
        self.connect(id, &name, parents)?;
        self.nodes.push(Node {
            name,
            kind: NodeKind::Processor {
                processor: Some(processor),
            },
            children: Vec::new(),
        });
        Ok(self)
    }

    pub fn add_sink(
        &mut self,
        name: impl Into<String>,
        topic: impl Into<String>,
        key_serializer: Arc<dyn Serializer<K>>,
        value_serializer: Arc<dyn Serializer<V>>,
        partitioner: Option<Arc<dyn StreamPartitioner<K, V>>>,
        parents: &[&str],
    ) -> Result<&mut Self> {
        let name = name.into();
        let id = self.reserve(&name)?;
        self.connect(id, &name, parents)?;
        self.nodes.push(Node {
            name,
            kind: NodeKind::Sink {
                topic: topic.into(),
                key_serializer,
                value_serializer,
                partitioner,
            },
            children: Vec::new(),
        });
        Ok(self)
    }

    pub fn build(self) -> Result<ProcessorTopology<K, V>> {
        if self.sources.is_empty() {
            return Err(Error::Topology(
                "a topology needs at least one source".to_string(),
            ));
        }
        Ok(ProcessorTopology {
            nodes: self.nodes,
            sources: self.sources,
        })
    }

    fn reserve(&mut self, name: &str) -> Result<NodeId> {
        if self.names.contains_key(name) {
            return Err(Error::Topology(format!("duplicate node name {name}")));
        }
        let id = self.nodes.len();
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    fn connect(&mut self, id: NodeId, name: &str, parents: &[&str]) -> Result<()> {
        if parents.is_empty() {
            return Err(Error::Topology(format!(
                "node {name} needs at least one parent"
            )));
        }
        for parent in parents {
            let parent_id = *self.names.get(*parent).ok_or_else(|| {
                Error::Topology(format!("unknown parent {parent} for node {name}"))
            })?;
            if matches!(self.nodes[parent_id].kind, NodeKind::Sink { .. }) {
                return Err(Error::Topology(format!(
                    "sink {parent} cannot be a parent of {name}"
                )));
            }
            self.nodes[parent_id].children.push(id);
        }
        Ok(())
    }
}

impl<K, V> Default for TopologyBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless processor applying `f` to each record and forwarding the result.
pub struct MapProcessor<F> {
    f: F,
}

pub fn map<F>(f: F) -> MapProcessor<F> {
    MapProcessor { f }
}

impl<K, V, F> Processor<K, V> for MapProcessor<F>
where
    F: FnMut(&K, &V) -> (K, V) + Send,
{
    fn process(
        &mut self,
        ctx: &mut ProcessorContext<'_, '_, K, V>,
        key: &K,
        value: &V,
    ) -> Result<()> {
        let (key, value) = (self.f)(key, value);
        ctx.forward(&key, &value)
    }
}

/// Stateless processor forwarding only records the predicate accepts.
pub struct FilterProcessor<F> {
    predicate: F,
}

pub fn filter<F>(predicate: F) -> FilterProcessor<F> {
    FilterProcessor { predicate }
}

impl<K, V, F> Processor<K, V> for FilterProcessor<F>
where
    F: FnMut(&K, &V) -> bool + Send,
{
    fn process(
        &mut self,
        ctx: &mut ProcessorContext<'_, '_, K, V>,
        key: &K,
        value: &V,
    ) -> Result<()> {
        if (self.predicate)(key, value) {
            ctx.forward(key, value)?;
        }
        Ok(())
    }
}

/// Stateless processor expanding each record into zero or more records.
pub struct FlatMapProcessor<F> {
    f: F,
}

pub fn flat_map<F>(f: F) -> FlatMapProcessor<F> {
    FlatMapProcessor { f }
}

impl<K, V, F> Processor<K, V> for FlatMapProcessor<F>
where
    F: FnMut(&K, &V) -> Vec<(K, V)> + Send,
{
    fn process(
        &mut self,
        ctx: &mut ProcessorContext<'_, '_, K, V>,
        key: &K,
        value: &V,
    ) -> Result<()> {
        for (key, value) in (self.f)(key, value) {
            ctx.forward(&key, &value)?;
        }
        Ok(())
    }
}

/// Stateless processor rewriting the value and keeping the key.
pub struct MapValuesProcessor<F> {
    f: F,
}

pub fn map_values<F>(f: F) -> MapValuesProcessor<F> {
    MapValuesProcessor { f }
}

impl<K, V, F> Processor<K, V> for MapValuesProcessor<F>
where
    F: FnMut(&V) -> V + Send,
{
    fn process(
        &mut self,
        ctx: &mut ProcessorContext<'_, '_, K, V>,
        key: &K,
        value: &V,
    ) -> Result<()> {
        let value = (self.f)(value);
        ctx.forward(key, &value)
    }
}
