//! tideflow-core is the core of a partition-scoped stream-processing task
//! engine: it ingests batches of raw key/value records from multiple input
//! partitions, merges them into a single time-ordered logical stream, drives
//! them through a user-defined processor topology, enforces bounded
//! per-partition buffering via pause/resume flow control, schedules
//! punctuations against stream time, and coordinates the commit of consumed
//! offsets, produced offsets, and local state.
//!
//! The upstream fetcher, the downstream producer, and durable state are
//! collaborators behind traits ([consumer::Consumer], [producer::Producer],
//! [state::StateStore]); the engine owns everything in between. A
//! [task::StreamTask] is single-owner: the [worker::TaskWorker] serializes
//! ingestion and processing on one loop.

pub use self::error::{Error, Result};

pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod message;
pub mod producer;
pub mod serialization;
pub mod state;
pub mod task;
pub mod timestamp;
pub mod topology;
pub mod worker;

mod collector;
mod group;
mod punctuation;
mod queue;
mod tracker;

#[cfg(test)]
pub(crate) mod test_utils;
