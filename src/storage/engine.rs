use crate::error::Result;

/// A key-value storage engine: the byte-level contract shared by the
/// on-disk store and any substitutable backend. Keys are UTF-8 strings
/// (an engine may restrict which bytes they can contain), values are
/// arbitrary bytes. Engines are internally synchronized; all operations
/// take a shared reference and may be called from multiple threads.
pub trait Engine: Send + Sync {
    /// Returns true if the key exists.
    fn has(&self, key: &str) -> Result<bool>;

    /// Gets the value stored for a key, or None if it does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sets a value for a key, replacing the existing value if any.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Deletes a key, returning true if it existed.
    fn del(&self, key: &str) -> Result<bool>;

    /// Visits every key-value pair until the closure returns false.
    /// Iteration order is unspecified.
    fn for_each(&self, f: impl FnMut(&str, &[u8]) -> bool) -> Result<()>;

    /// Flushes buffered writes to durable storage.
    fn flush(&self) -> Result<()>;

    /// Returns engine status.
    fn status(&self) -> Result<Status>;
}

/// Engine status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    /// The name of the storage engine.
    pub name: String,
    /// The number of live keys.
    pub keys: u64,
    /// The logical size of the live keys and values, in bytes.
    pub size: u64,
    /// The on-disk size of all stored data, in bytes.
    pub total_disk_size: u64,
    /// The on-disk size of live data, in bytes.
    pub live_disk_size: u64,
    /// The on-disk size of garbage (replaced records and tombstones).
    pub garbage_disk_size: u64,
}
