use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Topology Error - {0}")]
    Topology(String),

    #[error("Deserialization Error - topic={topic}, {reason}")]
    Deserialization { topic: String, reason: String },

    #[error("Serialization Error - topic={topic}, {reason}")]
    Serialization { topic: String, reason: String },

    #[error("Unknown Partition - {0}")]
    UnknownPartition(String),

    #[error("Processor Error - node={node}, {reason}")]
    Processor { node: String, reason: String },

    #[error("State Error - {0}")]
    State(String),

    #[error("Commit Error - {0}")]
    Commit(String),

    #[error("Producer Error - {0}")]
    Producer(String),

    #[error("Task Error - {0}")]
    Task(String),
}
