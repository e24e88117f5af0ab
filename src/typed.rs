//! A typed store layered on any byte-level storage engine. Values are
//! serialized through a pluggable codec: JSON by default, bincode where
//! compactness matters more than readability. The layer consumes only
//! the [`Engine`] contract and adds nothing to the storage core.

use crate::error::Result;
use crate::storage::Engine;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Serializes typed values to bytes and back.
pub trait Codec {
    fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>>;
    fn decode<V: DeserializeOwned>(data: &[u8]) -> Result<V>;
}

/// The default codec, encoding values as JSON.
pub struct Json;

impl Codec for Json {
    fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<V: DeserializeOwned>(data: &[u8]) -> Result<V> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// A compact binary codec using bincode.
pub struct Bincode;

impl Codec for Bincode {
    fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn decode<V: DeserializeOwned>(data: &[u8]) -> Result<V> {
        Ok(bincode::deserialize(data)?)
    }
}

/// A typed key-value store wrapping a byte-level engine.
pub struct Store<E: Engine, C: Codec = Json> {
    engine: E,
    _codec: PhantomData<C>,
}

impl<E: Engine, C: Codec> Store<E, C> {
    /// Wraps an engine.
    pub fn new(engine: E) -> Self {
        Self { engine, _codec: PhantomData }
    }

    /// Returns a reference to the underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns true if the key exists.
    pub fn has(&self, key: &str) -> Result<bool> {
        self.engine.has(key)
    }

    /// Gets the decoded value stored for a key.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        match self.engine.get(key)? {
            Some(data) => Ok(Some(C::decode(&data)?)),
            None => Ok(None),
        }
    }

    /// Encodes and stores a value for a key.
    pub fn set<V: Serialize>(&self, key: &str, value: &V) -> Result<()> {
        self.engine.set(key, &C::encode(value)?)
    }

    /// Deletes a key, returning true if it existed.
    pub fn del(&self, key: &str) -> Result<bool> {
        self.engine.del(key)
    }

    /// Visits every key with its decoded value until the closure
    /// returns false. A value that fails to decode aborts the walk.
    pub fn for_each<V: DeserializeOwned>(&self, mut f: impl FnMut(&str, V) -> bool) -> Result<()> {
        let mut result = Ok(());
        self.engine.for_each(|key, data| match C::decode(data) {
            Ok(value) => f(key, value),
            Err(err) => {
                result = Err(err);
                false
            }
        })?;
        result
    }
}
