mod index;
mod log;

use self::index::{Index, Meta};
use self::log::{Log, Op};
use super::engine::{Engine, Status};
use crate::errinput;
use crate::error::Result;

use ::log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Index file name within the store directory.
const INDEX_FILE: &str = "diskv.idx";
/// Value log file name within the store directory.
const LOG_FILE: &str = "diskv.db";
/// Suffix of the temporary files a migration builds before the swap.
const TMP_SUFFIX: &str = ".tmp";
/// Suffix of the backup files a migration leaves behind.
const BAK_SUFFIX: &str = "._bak";

/// Bytes that must not appear in keys: they would corrupt the
/// comma-separated slot records or the bracketed log framing.
const RESERVED_KEY_BYTES: &[char] = &[',', '[', ']', '\n', '\0'];

/// Framing overhead of a log record around its key and value: the
/// 4-byte operation, two brackets, and the trailing newline.
const RECORD_OVERHEAD: u64 = 7;

/// Create-time configuration for a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the two store files; created if absent.
    pub dir: PathBuf,
    /// Maximum byte length of one slot record.
    pub max_length: u32,
    /// Number of preallocated hash slots.
    pub keys_len: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self { dir: PathBuf::from("."), max_length: 32, keys_len: 10000 }
    }
}

/// A persistent key-value store backed by two files in a directory:
///
/// - `diskv.idx`: a fixed-size open-addressed hash table. A 64-byte
///   header records the geometry, followed by keys_len slots of
///   max_length bytes each. A populated slot holds
///   `<key>,<length>,<offset>`, the pointer to the key's current record
///   in the value log. Collisions probe linearly without wrapping.
/// - `diskv.db`: an append-only log of `<op>[<key>]<value>\n` records.
///   Sets append a record and point the key's slot at it; deletes
///   append a tombstone and zero the slot. Replaced records and
///   tombstones stay in the file as garbage until migrate_value
///   rewrites it.
///
/// The slot table is the authority: readers resolve a key through its
/// slot and never scan the log. Record offsets are stable during live
/// operation; only migrations produce fresh files, replacing the live
/// ones via an atomic rename and keeping the previous generation as
/// `._bak` files.
///
/// A reader-writer lock coordinates data operations with migrations.
/// Data operations hold the shared side even when they mutate, since
/// the per-file mutexes already serialize the actual I/O; the exclusive
/// side only serves to keep migrations out. Every operation takes a
/// shared reference, so a store can be used from multiple threads.
pub struct Diskv {
    dir: PathBuf,
    inner: RwLock<Inner>,
}

/// The open file pair. Replaced wholesale when a migration re-opens.
struct Inner {
    index: Index,
    log: Log,
}

impl Inner {
    fn open(dir: &Path) -> Result<Self> {
        let index = Index::open(&dir.join(INDEX_FILE))?;
        let log = Log::open(&dir.join(LOG_FILE))?;
        Ok(Self { index, log })
    }
}

impl Diskv {
    /// Creates a new store in the configured directory, creating the
    /// directory if needed, and opens it. An existing index file is
    /// replaced; an existing value log is kept and appended to.
    pub fn create(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        let meta = Meta { max_length: config.max_length, keys_len: config.keys_len };
        let index = Index::create(&config.dir.join(INDEX_FILE), meta)?;
        let log = Log::open(&config.dir.join(LOG_FILE))?;
        info!(
            "Created store in {} with {} slots of {} bytes",
            config.dir.display(),
            config.keys_len,
            config.max_length
        );
        Ok(Self { dir: config.dir, inner: RwLock::new(Inner { index, log }) })
    }

    /// Opens an existing store directory, erroring with NotInitialized
    /// if the index file is missing.
    pub fn open(dir: PathBuf) -> Result<Self> {
        let inner = Inner::open(&dir)?;
        info!("Opened store in {}", dir.display());
        Ok(Self { dir, inner: RwLock::new(inner) })
    }

    /// Rebuilds the index file with a new geometry, rehashing every
    /// live value pointer into it, then atomically replaces the live
    /// index and re-opens the store. The value log is untouched. The
    /// previous index is kept as `diskv.idx._bak`.
    ///
    /// Fails without touching the live files if a slot record does not
    /// fit the new slot width.
    pub fn migrate_idx(&self, max_length: u32, keys_len: u32) -> Result<()> {
        let mut inner = self.inner.write()?;

        let index_path = self.dir.join(INDEX_FILE);
        let tmp_path = self.dir.join(format!("{INDEX_FILE}{TMP_SUFFIX}"));
        let new_index = Index::create(&tmp_path, Meta { max_length, keys_len })?;
        for entry in inner.index.iter() {
            let entry = entry?;
            // A slot chain can hold several records for one key after
            // deletions; the first is the one lookups resolve, so it
            // wins and the rest are dropped.
            if new_index.lookup(&entry.key)?.is_some() {
                continue;
            }
            new_index.insert(&entry)?;
        }
        new_index.sync()?;
        drop(new_index);

        migrate_file(&tmp_path, &index_path)?;
        *inner = Inner::open(&self.dir)?;
        info!(
            "Migrated index in {} to {} slots of {} bytes",
            self.dir.display(),
            keys_len,
            max_length
        );
        Ok(())
    }

    /// Rewrites the value log with only the live records, dropping
    /// tombstones and replaced records, and rebuilds the index (same
    /// geometry) to point into the new log. Atomically replaces both
    /// files and re-opens the store, keeping the previous generation as
    /// `._bak` files.
    pub fn migrate_value(&self) -> Result<()> {
        let mut inner = self.inner.write()?;

        let index_path = self.dir.join(INDEX_FILE);
        let log_path = self.dir.join(LOG_FILE);
        let tmp_index_path = self.dir.join(format!("{INDEX_FILE}{TMP_SUFFIX}"));
        let tmp_log_path = self.dir.join(format!("{LOG_FILE}{TMP_SUFFIX}"));

        let new_index = Index::create(&tmp_index_path, inner.index.meta())?;
        let new_log = Log::open(&tmp_log_path)?;
        new_log.truncate()?; // discard any leftover from an interrupted migration
        for entry in inner.index.iter() {
            let entry = entry?;
            if new_index.lookup(&entry.key)?.is_some() {
                continue; // first record for a key wins, as in lookups
            }
            let record = inner.log.read(&entry)?;
            let new_entry = new_log.append(Op::Set, &record.key, &record.value)?;
            new_index.insert(&new_entry)?;
        }
        new_log.sync()?;
        new_index.sync()?;
        drop(new_log);
        drop(new_index);

        migrate_file(&tmp_log_path, &log_path)?;
        migrate_file(&tmp_index_path, &index_path)?;
        *inner = Inner::open(&self.dir)?;
        info!("Migrated value log in {}", self.dir.display());
        Ok(())
    }
}

impl Engine for Diskv {
    fn has(&self, key: &str) -> Result<bool> {
        let inner = self.inner.read()?;
        Ok(inner.index.lookup(key)?.is_some())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read()?;
        match inner.index.lookup(key)? {
            Some(entry) => Ok(Some(inner.log.read(&entry)?.value)),
            None => Ok(None),
        }
    }

    /// Sets a value for a key. The record is appended to the value log
    /// first and the slot is pointed at it second; if the slot write
    /// fails (e.g. the slot record exceeds the slot width) the appended
    /// record is left dead in the log for the next migrate_value to
    /// reclaim, and is never visible to readers.
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        let inner = self.inner.read()?;
        let entry = inner.log.append(Op::Set, key, value)?;
        inner.index.insert(&entry)
    }

    /// Deletes a key, returning true if it existed. The tombstone is
    /// appended before the slot is cleared, so a reader observes either
    /// the old pointer or an empty slot, never a half-deleted key.
    fn del(&self, key: &str) -> Result<bool> {
        let inner = self.inner.read()?;
        inner.log.append(Op::Del, key, &[])?;
        inner.index.remove(key)
    }

    fn for_each(&self, mut f: impl FnMut(&str, &[u8]) -> bool) -> Result<()> {
        let inner = self.inner.read()?;
        for entry in inner.index.iter() {
            let entry = entry?;
            let record = inner.log.read(&entry)?;
            if !f(&record.key, &record.value) {
                break;
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // Don't fsync in tests, to speed them up.
        #[cfg(not(test))]
        {
            let inner = self.inner.read()?;
            inner.log.sync()?;
            inner.index.sync()?;
        }
        Ok(())
    }

    /// Returns store status. Garbage accounting covers the value log;
    /// the index file is fixed-size and excluded.
    fn status(&self) -> Result<Status> {
        let inner = self.inner.read()?;
        let mut keys = 0;
        let mut live_disk_size = 0;
        for entry in inner.index.iter() {
            let entry = entry?;
            keys += 1;
            live_disk_size += entry.length as u64;
        }
        let total_disk_size = inner.log.len()?;
        Ok(Status {
            name: "diskv".to_string(),
            keys,
            size: live_disk_size.saturating_sub(keys * RECORD_OVERHEAD),
            total_disk_size,
            live_disk_size,
            garbage_disk_size: total_disk_size.saturating_sub(live_disk_size),
        })
    }
}

/// Attempt to flush the files when the store is closed.
impl Drop for Diskv {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            error!("failed to flush store files: {err}")
        }
    }
}

/// Rejects keys containing bytes that would corrupt the slot or record
/// framing.
fn validate_key(key: &str) -> Result<()> {
    if key.contains(RESERVED_KEY_BYTES) {
        return errinput!("key contains a reserved byte: {key:?}");
    }
    Ok(())
}

/// Atomically replaces `to` with `from`: any stale backup is removed,
/// the live file is renamed to its backup name, and the fresh file is
/// renamed into place. The backup is retained as a one-generation
/// rollback. Relies on POSIX rename semantics.
fn migrate_file(from: &Path, to: &Path) -> Result<()> {
    let bak = bak_path(to);
    match fs::remove_file(&bak) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    fs::rename(to, &bak)?;
    fs::rename(from, to)?;
    Ok(())
}

/// Returns the backup name of a store file, e.g. `diskv.idx._bak`.
fn bak_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(BAK_SUFFIX);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::super::engine::test::test_engine;
    use super::*;
    use crate::error::Error;

    use std::collections::BTreeMap;

    use tempfile::TempDir;
    use test_case::test_case;

    fn setup() -> Result<(TempDir, Diskv)> {
        let dir = TempDir::with_prefix("diskv")?;
        let store = Diskv::create(Config { dir: dir.path().join("db"), ..Config::default() })?;
        Ok((dir, store))
    }

    test_engine!({
        let dir = TempDir::with_prefix("diskv")?;
        let store = Diskv::create(Config { dir: dir.path().join("db"), ..Config::default() })?;
        (dir, store)
    });

    #[test_case("plain-key" => true; "plain key")]
    #[test_case("" => true; "empty key")]
    #[test_case("with,comma" => false; "comma")]
    #[test_case("with[bracket" => false; "open bracket")]
    #[test_case("with]bracket" => false; "close bracket")]
    #[test_case("with\nnewline" => false; "newline")]
    #[test_case("with\0nul" => false; "nul byte")]
    fn validate_keys(key: &str) -> bool {
        validate_key(key).is_ok()
    }

    #[test]
    fn set_rejects_reserved_bytes() -> Result<()> {
        let (_dir, store) = setup()?;
        assert!(matches!(store.set("a,b", b"value"), Err(Error::InvalidInput(_))));
        // Lookups of such keys are plain misses.
        assert!(!store.has("a,b")?);
        assert_eq!(store.get("a,b")?, None);
        Ok(())
    }

    /// Tests that create presizes the index file and that data
    /// operations never change its size.
    #[test]
    fn create_sizes_index() -> Result<()> {
        let dir = TempDir::with_prefix("diskv")?;
        let path = dir.path().join("db");
        let store = Diskv::create(Config { dir: path.clone(), max_length: 32, keys_len: 16 })?;

        let idx_path = path.join(INDEX_FILE);
        assert_eq!(fs::metadata(&idx_path)?.len(), 64 + 16 * 32);

        store.set("key", b"value")?;
        assert_eq!(store.get("key")?, Some(b"value".to_vec()));
        store.set("key", b"value2")?;
        assert_eq!(store.get("key")?, Some(b"value2".to_vec()));

        assert_eq!(fs::metadata(&idx_path)?.len(), 64 + 16 * 32);
        Ok(())
    }

    /// Tests that a store can be closed and reopened, retaining its
    /// contents.
    #[test]
    fn reopen() -> Result<()> {
        let dir = TempDir::with_prefix("diskv")?;
        let path = dir.path().join("db");
        let store = Diskv::create(Config { dir: path.clone(), ..Config::default() })?;
        store.set("key", b"value")?;
        store.set("key2", b"value2")?;
        store.del("key2")?;
        drop(store);

        let store = Diskv::open(path)?;
        assert_eq!(store.get("key")?, Some(b"value".to_vec()));
        assert!(!store.has("key2")?);
        Ok(())
    }

    #[test]
    fn open_missing() -> Result<()> {
        let dir = TempDir::with_prefix("diskv")?;
        assert_eq!(Diskv::open(dir.path().to_path_buf()).err(), Some(Error::NotInitialized));
        Ok(())
    }

    /// Tests that a second open of the same store fails while the first
    /// holds the file lock, and works after it is closed.
    #[test]
    fn lock() -> Result<()> {
        let dir = TempDir::with_prefix("diskv")?;
        let path = dir.path().join("db");
        let store = Diskv::create(Config { dir: path.clone(), ..Config::default() })?;

        assert!(Diskv::open(path.clone()).is_err());
        drop(store);
        assert!(Diskv::open(path).is_ok());
        Ok(())
    }

    /// Tests slot-width enforcement and recovery by migration: a key
    /// whose slot record exceeds max_length is rejected until the slots
    /// are widened.
    #[test]
    fn slot_overflow_and_migrate() -> Result<()> {
        let dir = TempDir::with_prefix("diskv")?;
        let store =
            Diskv::create(Config { dir: dir.path().join("db"), max_length: 32, keys_len: 16 })?;

        // A 20-byte key still fits the 32-byte slot record.
        store.set("12345678901234567890", b"")?;
        assert!(store.has("12345678901234567890")?);

        // A 30-byte key does not. The set fails, leaving a dead log
        // record for the next value migration to drop, and the key is
        // never visible.
        assert!(matches!(
            store.set("123456789012345678901234567890", b""),
            Err(Error::InvalidInput(_))
        ));
        assert!(!store.has("123456789012345678901234567890")?);

        // After widening the slots, the longer key fits.
        store.migrate_value()?;
        store.migrate_idx(64, 20)?;
        store.set("123456789012345678901234567890", b"xxxxxxx")?;
        assert_eq!(
            store.get("123456789012345678901234567890")?,
            Some(b"xxxxxxx".to_vec())
        );
        assert_eq!(store.get("12345678901234567890")?, Some(b"".to_vec()));
        Ok(())
    }

    /// Tests that migrate_value rewrites the log with only live
    /// records and keeps the previous generation as ._bak files.
    #[test]
    fn migrate_value_drops_garbage() -> Result<()> {
        let dir = TempDir::with_prefix("diskv")?;
        let path = dir.path().join("db");
        let store = Diskv::create(Config { dir: path.clone(), ..Config::default() })?;

        store.set("a", b"old")?;
        store.set("a", b"new")?;
        store.set("b", b"keep")?;
        store.set("gone", b"dead")?;
        store.del("gone")?;

        let log_path = path.join(LOG_FILE);
        let idx_path = path.join(INDEX_FILE);
        let old_log = fs::read(&log_path)?;
        let old_idx = fs::read(&idx_path)?;
        assert!(store.status()?.garbage_disk_size > 0);

        store.migrate_value()?;

        // The live data is intact and the garbage is gone.
        assert_eq!(store.get("a")?, Some(b"new".to_vec()));
        assert_eq!(store.get("b")?, Some(b"keep".to_vec()));
        assert!(!store.has("gone")?);
        let status = store.status()?;
        assert_eq!(status.keys, 2);
        assert_eq!(status.garbage_disk_size, 0);

        // The new log contains no replaced records or tombstones.
        let new_log = String::from_utf8(fs::read(&log_path)?).expect("log is not UTF-8");
        assert!(!new_log.contains("_del"));
        assert!(!new_log.contains("old"));
        assert!(!new_log.contains("dead"));

        // The previous generation is kept verbatim as ._bak files.
        assert_eq!(fs::read(path.join("diskv.db._bak"))?, old_log);
        assert_eq!(fs::read(path.join("diskv.idx._bak"))?, old_idx);
        Ok(())
    }

    /// Tests that migrate_idx rehashes all live keys into the new
    /// geometry, including keys that overflowed the old table.
    #[test]
    fn migrate_idx_rehashes() -> Result<()> {
        let dir = TempDir::with_prefix("diskv")?;
        let path = dir.path().join("db");
        let store = Diskv::create(Config { dir: path.clone(), max_length: 32, keys_len: 4 })?;

        // Overfill the nominal table so probe chains spill past its end.
        for i in 0..10 {
            store.set(&format!("key-{i}"), format!("value-{i}").as_bytes())?;
        }
        let old_idx = fs::read(path.join(INDEX_FILE))?;

        store.migrate_idx(64, 256)?;

        for i in 0..10 {
            assert_eq!(store.get(&format!("key-{i}"))?, Some(format!("value-{i}").into_bytes()));
        }
        assert_eq!(store.status()?.keys, 10);
        assert_eq!(fs::read(path.join("diskv.idx._bak"))?, old_idx);

        // Data operations keep working against the migrated index.
        store.set("after", b"migration")?;
        assert_eq!(store.get("after")?, Some(b"migration".to_vec()));
        Ok(())
    }

    /// Tests that a migration to slots too narrow for an existing
    /// record fails and leaves the store untouched.
    #[test]
    fn migrate_idx_too_small_fails() -> Result<()> {
        let (_dir, store) = setup()?;
        store.set("some-longer-key", b"value")?;

        assert!(matches!(store.migrate_idx(8, 16), Err(Error::InvalidInput(_))));

        assert_eq!(store.get("some-longer-key")?, Some(b"value".to_vec()));
        store.set("another", b"works")?;
        assert_eq!(store.get("another")?, Some(b"works".to_vec()));
        Ok(())
    }

    /// Tests the accepted deletion anomaly: clearing a slot mid-chain
    /// orphans colliding keys behind it until a migration rehashes
    /// their slots back into reach.
    #[test]
    fn del_orphans_colliding_key_until_migrate() -> Result<()> {
        let dir = TempDir::with_prefix("diskv")?;
        let store =
            Diskv::create(Config { dir: dir.path().join("db"), max_length: 32, keys_len: 1 })?;

        store.set("a", b"1")?; // slot 0
        store.set("b", b"2")?; // probes over "a" into slot 1
        assert_eq!(store.get("b")?, Some(b"2".to_vec()));

        assert!(store.del("a")?);
        // "b" now sits behind an empty slot and probes miss it.
        assert_eq!(store.get("b")?, None);
        assert!(!store.has("b")?);

        // Migration walks all populated slots and reinstates it.
        store.migrate_idx(32, 1)?;
        assert_eq!(store.get("b")?, Some(b"2".to_vec()));
        Ok(())
    }

    /// Tests that when a key occupies several slots (after a mid-chain
    /// deletion and re-set), migration keeps the record lookups
    /// resolve, not the stale duplicate.
    #[test]
    fn migrate_value_keeps_reachable_duplicate() -> Result<()> {
        let dir = TempDir::with_prefix("diskv")?;
        let store =
            Diskv::create(Config { dir: dir.path().join("db"), max_length: 32, keys_len: 1 })?;

        store.set("a", b"1")?; // slot 0
        store.set("b", b"stale")?; // slot 1
        assert!(store.del("a")?); // clears slot 0, orphaning "b"
        store.set("b", b"fresh")?; // lands in slot 0; slot 1 still holds the old pointer
        assert_eq!(store.get("b")?, Some(b"fresh".to_vec()));

        store.migrate_value()?;
        assert_eq!(store.get("b")?, Some(b"fresh".to_vec()));
        let status = store.status()?;
        assert_eq!(status.keys, 1);
        assert_eq!(status.garbage_disk_size, 0);
        Ok(())
    }

    /// Tests the status accounting byte for byte.
    #[test]
    fn status_accounts_garbage() -> Result<()> {
        let (_dir, store) = setup()?;
        store.set("a", b"12345")?; // 13 bytes, replaced below
        store.set("a", b"67890")?; // 13 bytes, live
        store.set("b", b"xy")?; // 10 bytes, live
        store.del("c")?; // 8-byte tombstone

        let status = store.status()?;
        assert_eq!(status.keys, 2);
        assert_eq!(status.size, 9); // "a" + 5 + "b" + 2
        assert_eq!(status.live_disk_size, 23);
        assert_eq!(status.total_disk_size, 44);
        assert_eq!(status.garbage_disk_size, 21);

        store.migrate_value()?;
        let status = store.status()?;
        assert_eq!(status.keys, 2);
        assert_eq!(status.live_disk_size, 23);
        assert_eq!(status.total_disk_size, 23);
        assert_eq!(status.garbage_disk_size, 0);
        Ok(())
    }

    /// Tests concurrent readers and writers over a shared store. The
    /// writers overwrite disjoint, already-slotted keys so the final
    /// values are deterministic.
    #[test]
    fn concurrent_ops() -> Result<()> {
        let (_dir, store) = setup()?;
        for i in 0..20 {
            store.set(&format!("reader-{i}"), b"stable")?;
            store.set(&format!("writer-{i}"), b"seed")?;
        }

        std::thread::scope(|scope| {
            for t in 0..2 {
                let store = &store;
                scope.spawn(move || {
                    for round in 0..10 {
                        for i in (t..20).step_by(2) {
                            store
                                .set(&format!("writer-{i}"), format!("round-{round}").as_bytes())
                                .expect("set failed");
                        }
                    }
                });
            }
            for _ in 0..2 {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..100 {
                        for i in 0..20 {
                            let value = store.get(&format!("reader-{i}")).expect("get failed");
                            assert_eq!(value, Some(b"stable".to_vec()));
                        }
                    }
                });
            }
        });

        for i in 0..20 {
            assert_eq!(store.get(&format!("writer-{i}"))?, Some(b"round-9".to_vec()));
        }
        Ok(())
    }

    /// Tests that migrations block concurrent readers rather than
    /// racing them, and that reads resume correctly against the
    /// migrated files.
    #[test]
    fn migrate_during_reads() -> Result<()> {
        let (_dir, store) = setup()?;
        for i in 0..10 {
            store.set(&format!("key-{i}"), format!("value-{i}").as_bytes())?;
        }
        store.set("old", b"x")?;
        store.del("old")?;

        std::thread::scope(|scope| -> Result<()> {
            for _ in 0..2 {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..50 {
                        for i in 0..10 {
                            let value = store.get(&format!("key-{i}")).expect("get failed");
                            assert_eq!(value, Some(format!("value-{i}").into_bytes()));
                        }
                    }
                });
            }
            store.migrate_value()?;
            store.migrate_idx(64, 100)?;
            Ok(())
        })?;

        for i in 0..10 {
            assert_eq!(store.get(&format!("key-{i}"))?, Some(format!("value-{i}").into_bytes()));
        }
        assert_eq!(store.status()?.garbage_disk_size, 0);
        Ok(())
    }

    /// Round-trips a batch of random keys and values, across both
    /// migrations.
    #[test]
    fn random_round_trip() -> Result<()> {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        let dir = TempDir::with_prefix("diskv")?;
        let store =
            Diskv::create(Config { dir: dir.path().join("db"), max_length: 64, keys_len: 1000 })?;

        let mut rng = rand::thread_rng();
        let mut expect = BTreeMap::new();
        for _ in 0..200 {
            let len: usize = rng.gen_range(1..=20);
            let key: String =
                (&mut rng).sample_iter(Alphanumeric).take(len).map(char::from).collect();
            let value: Vec<u8> = (0..rng.gen_range(0..100)).map(|_| rng.gen()).collect();
            store.set(&key, &value)?;
            expect.insert(key, value);
        }

        let verify = |store: &Diskv| -> Result<()> {
            for (key, value) in &expect {
                assert_eq!(store.get(key)?.as_ref(), Some(value));
            }
            let mut actual = BTreeMap::new();
            store.for_each(|key, value| {
                actual.insert(key.to_string(), value.to_vec());
                true
            })?;
            assert_eq!(&actual, &expect);
            Ok(())
        };

        verify(&store)?;
        store.migrate_value()?;
        verify(&store)?;
        store.migrate_idx(64, 2000)?;
        verify(&store)?;
        Ok(())
    }
}
