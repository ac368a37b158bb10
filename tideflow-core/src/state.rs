//! Task-local state. Processor nodes register named stores during `init`
//! and look them up by name and type afterwards; the task flushes every
//! registered store as the first leg of the commit protocol, before offsets
//! are committed, so that replay from the committed offsets reproduces the
//! same store contents.

use std::any::Any;
use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Error;
use crate::Result;

/// A named local store. Implementations decide what durability `flush`
/// provides; the engine only sequences it before the offset commit.
pub trait StateStore: Any + Send {
    fn name(&self) -> &str;

    /// Make everything written so far durable.
    fn flush(&mut self) -> Result<()>;

    fn close(&mut self);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Registry of the stores owned by one task.
#[derive(Default)]
pub struct StateManager {
    stores: Vec<Box<dyn StateStore>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, store: Box<dyn StateStore>) -> Result<()> {
        if self.stores.iter().any(|s| s.name() == store.name()) {
            return Err(Error::State(format!(
                "store {} is already registered",
                store.name()
            )));
        }
        debug!(store = store.name(), "registering state store");
        self.stores.push(store);
        Ok(())
    }

    /// Typed access to a registered store.
    pub fn get_mut<S: StateStore>(&mut self, name: &str) -> Option<&mut S> {
        self.stores
            .iter_mut()
            .find(|s| s.name() == name)
            .and_then(|s| s.as_any_mut().downcast_mut::<S>())
    }

    /// Flush all stores in registration order.
    pub fn flush(&mut self) -> Result<()> {
        for store in &mut self.stores {
            store
                .flush()
                .map_err(|e| Error::State(format!("flush of store {} failed: {e}", store.name())))?;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        for store in &mut self.stores {
            store.close();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

/// An in-memory key-value store backed by a BTreeMap. Nothing outlives the
/// process, so `flush` has nothing to do.
pub struct InMemoryKeyValueStore<K, V> {
    name: String,
    map: BTreeMap<K, V>,
}

impl<K: Ord + Send + 'static, V: Send + 'static> InMemoryKeyValueStore<K, V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    pub fn put(&mut self, key: K, value: V) {
        self.map.insert(key, value);
    }

    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.map.remove(key)
    }

    pub fn all(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: Ord + Send + 'static, V: Send + 'static> StateStore for InMemoryKeyValueStore<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_store_basics() {
        let mut store: InMemoryKeyValueStore<String, i64> = InMemoryKeyValueStore::new("counts");
        store.put("a".to_string(), 1);
        store.put("b".to_string(), 2);
        store.put("a".to_string(), 3);

        assert_eq!(store.get(&"a".to_string()), Some(&3));
        assert_eq!(store.len(), 2);
        assert_eq!(store.delete(&"a".to_string()), Some(3));
        assert_eq!(store.get(&"a".to_string()), None);
    }

    #[test]
    fn test_manager_register_and_typed_lookup() {
        let mut manager = StateManager::new();
        manager
            .register(Box::new(InMemoryKeyValueStore::<String, i64>::new("counts")))
            .unwrap();

        let err = manager
            .register(Box::new(InMemoryKeyValueStore::<String, i64>::new("counts")))
            .unwrap_err();
        assert!(matches!(err, Error::State(_)));

        let store = manager
            .get_mut::<InMemoryKeyValueStore<String, i64>>("counts")
            .unwrap();
        store.put("x".to_string(), 9);
        assert_eq!(store.get(&"x".to_string()), Some(&9));

        // wrong type downcast yields nothing
        assert!(manager
            .get_mut::<InMemoryKeyValueStore<i64, i64>>("counts")
            .is_none());

        manager.flush().unwrap();
    }
}
