use std::collections::HashMap;

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value;

/// A request that can be cached. The key must capture every parameter that
/// affects the response; two contexts with equal keys are interchangeable.
pub trait CacheContext {
    fn key(&self) -> String;
}

/// Where a fetched payload came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Source {
    Cache,
    Network,
}

#[derive(Clone, Debug)]
pub struct Fetched {
    pub value: Value,
    pub source: Source,
}

/// 64-bit FNV-1a. Stable across processes and platforms, so cached entries
/// survive restarts (unlike the randomized std hasher).
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    const BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

/// Keyed payload storage. Implementations must tolerate concurrent access;
/// on key collision the last writer wins.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: u64) -> Result<Option<Value>>;
    fn put(&self, key: u64, value: &Value) -> Result<()>;
}

impl<S: CacheStore + ?Sized> CacheStore for std::sync::Arc<S> {
    fn get(&self, key: u64) -> Result<Option<Value>> {
        (**self).get(key)
    }

    fn put(&self, key: u64, value: &Value) -> Result<()> {
        (**self).put(key, value)
    }
}

/// In-process store, primarily for tests and single-run sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<u64, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: u64) -> Result<Option<Value>> {
        Ok(self.entries.lock().get(&key).cloned())
    }

    fn put(&self, key: u64, value: &Value) -> Result<()> {
        self.entries.lock().insert(key, value.clone());
        Ok(())
    }
}
