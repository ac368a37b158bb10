//! Pluggable key/value serde. Source nodes own a pair of [Deserializer]s
//! applied while raw records are admitted into the partition group; sink
//! nodes own a pair of [Serializer]s applied before handing records to the
//! producer.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;
use crate::Result;

pub trait Deserializer<T>: Send + Sync {
    fn deserialize(&self, topic: &str, data: &Bytes) -> Result<T>;
}

pub trait Serializer<T>: Send + Sync {
    fn serialize(&self, topic: &str, item: &T) -> Result<Bytes>;
}

/// Identity serde for payloads that stay raw bytes end to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerde;

impl Deserializer<Bytes> for BytesSerde {
    fn deserialize(&self, _topic: &str, data: &Bytes) -> Result<Bytes> {
        Ok(data.clone())
    }
}

impl Serializer<Bytes> for BytesSerde {
    fn serialize(&self, _topic: &str, item: &Bytes) -> Result<Bytes> {
        Ok(item.clone())
    }
}

/// UTF-8 string serde. Invalid UTF-8 on the wire is a deserialization error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerde;

impl Deserializer<String> for StringSerde {
    fn deserialize(&self, topic: &str, data: &Bytes) -> Result<String> {
        std::str::from_utf8(data)
            .map(|s| s.to_string())
            .map_err(|e| Error::Deserialization {
                topic: topic.to_string(),
                reason: format!("invalid utf-8: {e}"),
            })
    }
}

impl Serializer<String> for StringSerde {
    fn serialize(&self, _topic: &str, item: &String) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(item.as_bytes()))
    }
}

/// JSON serde over any serde-capable type.
pub struct JsonSerde<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerde<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerde<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Deserializer<T> for JsonSerde<T> {
    fn deserialize(&self, topic: &str, data: &Bytes) -> Result<T> {
        serde_json::from_slice(data).map_err(|e| Error::Deserialization {
            topic: topic.to_string(),
            reason: format!("invalid json: {e}"),
        })
    }
}

impl<T: Serialize> Serializer<T> for JsonSerde<T> {
    fn serialize(&self, topic: &str, item: &T) -> Result<Bytes> {
        serde_json::to_vec(item)
            .map(Bytes::from)
            .map_err(|e| Error::Serialization {
                topic: topic.to_string(),
                reason: format!("json encode failed: {e}"),
            })
    }
}
