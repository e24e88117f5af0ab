use crate::error::{Error, Result};
use crate::{errdata, errinput};

use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Byte length of the index file header.
pub const HEADER_LEN: usize = 64;

/// The parsed index file header, describing the table geometry. The
/// on-disk form is exactly HEADER_LEN ASCII bytes:
///
/// `[maxlength:NNNNNN,keyslen:NNNNNN,x:<28 zeros>]`
///
/// The trailing `x` field is padding that reserves room for future
/// header fields; unknown fields are ignored when parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Meta {
    /// Maximum byte length of one slot record.
    pub max_length: u32,
    /// Number of preallocated slots.
    pub keys_len: u32,
}

impl Meta {
    /// Formats the header as exactly HEADER_LEN bytes. Fails if a field
    /// is too large for its fixed-width template.
    fn encode(&self) -> Result<Vec<u8>> {
        let header =
            format!("[maxlength:{:06},keyslen:{:06},x:{:028}]", self.max_length, self.keys_len, 0);
        if header.len() != HEADER_LEN {
            return errinput!("header is {} bytes, expected {HEADER_LEN}", header.len());
        }
        Ok(header.into_bytes())
    }

    /// Parses a header: comma-separated name:value fields between
    /// brackets, with decimal integer values.
    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != HEADER_LEN {
            return errdata!("header is {} bytes, expected {HEADER_LEN}", data.len());
        }
        let Ok(header) = std::str::from_utf8(data) else {
            return errdata!("header is not valid UTF-8");
        };
        let Some(fields) = header.strip_prefix('[').and_then(|h| h.strip_suffix(']')) else {
            return errdata!("header is not bracketed: {header}");
        };
        let mut meta = Meta { max_length: 0, keys_len: 0 };
        for field in fields.split(',') {
            let Some((name, value)) = field.split_once(':') else {
                return errdata!("malformed header field {field}");
            };
            match name {
                "maxlength" => meta.max_length = parse_header_int(value)?,
                "keyslen" => meta.keys_len = parse_header_int(value)?,
                _ => {} // ignore unknown fields
            }
        }
        if meta.max_length == 0 || meta.keys_len == 0 {
            return errdata!(
                "header has zero geometry: maxlength={} keyslen={}",
                meta.max_length,
                meta.keys_len
            );
        }
        Ok(meta)
    }

    /// Returns the byte offset of a slot.
    fn slot_offset(&self, slot: u64) -> u64 {
        HEADER_LEN as u64 + slot * self.max_length as u64
    }

    /// Returns the nominal byte length of the index file: the header
    /// followed by keys_len slots.
    fn file_len(&self) -> u64 {
        self.slot_offset(self.keys_len as u64)
    }
}

/// Parses a fixed-width decimal header value, e.g. `000032`.
fn parse_header_int(value: &str) -> Result<u32> {
    match value.parse() {
        Ok(n) => Ok(n),
        Err(err) => errdata!("malformed header value {value}: {err}"),
    }
}

/// A value pointer stored in a slot: a key and the offset and total
/// byte length of its current record in the value log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub offset: u64,
    pub length: u32,
}

impl Entry {
    /// Formats the slot payload `<key>,<length>,<offset>`.
    fn encode(&self) -> Vec<u8> {
        format!("{},{},{}", self.key, self.length, self.offset).into_bytes()
    }

    /// Parses a slot. A slot whose first byte is zero is empty; a
    /// populated slot holds the encoded payload padded with zero bytes
    /// up to the slot width.
    fn decode(data: &[u8]) -> Result<Option<Self>> {
        if data.first().map_or(true, |&b| b == 0) {
            return Ok(None);
        }
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        let Ok(record) = std::str::from_utf8(&data[..end]) else {
            return errdata!("slot record is not valid UTF-8");
        };
        let fields = record.split(',').collect::<Vec<_>>();
        let [key, length, offset] = fields[..] else {
            return errdata!("malformed slot record {record}");
        };
        let Ok(length) = length.parse() else {
            return errdata!("malformed slot record length in {record}");
        };
        let Ok(offset) = offset.parse() else {
            return errdata!("malformed slot record offset in {record}");
        };
        Ok(Some(Entry { key: key.to_owned(), offset, length }))
    }
}

/// The index file: a fixed header followed by keys_len slots of
/// max_length bytes each, mapping keys to value pointers by
/// open-addressed linear probing. A key hashes to an initial slot and
/// probing advances one slot at a time without wrapping; reads past the
/// allocated table observe end-of-file and count as empty, so probes
/// always terminate. Writes past the table extend the file, letting the
/// table degrade gracefully when it overflows instead of failing.
///
/// A single file handle serves all access, with a mutex serializing
/// each positioned read or write. The parsed header is cached for the
/// life of the struct; migrations re-open the file into a fresh struct.
/// The handle holds an exclusive advisory lock: the index is the
/// store's authority, so locking it alone is enough to keep a second
/// process out.
pub struct Index {
    file: Mutex<File>,
    meta: Meta,
}

impl Index {
    /// Creates a new index file with the given geometry, replacing any
    /// existing file, and presizes it to its nominal length so every
    /// slot reads as empty. Takes out an exclusive lock on the file,
    /// erroring if it is already held.
    pub fn create(path: &Path, meta: Meta) -> Result<Self> {
        if meta.max_length == 0 || meta.keys_len == 0 {
            return errinput!(
                "index geometry must be nonzero: maxlength={} keyslen={}",
                meta.max_length,
                meta.keys_len
            );
        }
        let header = meta.encode()?;
        let mut file =
            OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        file.try_lock_exclusive()?;
        file.write_all(&header)?;
        file.set_len(meta.file_len())?;
        Ok(Self { file: Mutex::new(file), meta })
    }

    /// Opens an existing index file and parses its header, erroring
    /// with NotInitialized if the file does not exist. Takes out an
    /// exclusive lock on the file, erroring if it is already held.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotInitialized)
            }
            Err(err) => return Err(err.into()),
        };
        file.try_lock_exclusive()?;
        let mut header = [0u8; HEADER_LEN];
        file.seek(SeekFrom::Start(0))?;
        if let Err(err) = file.read_exact(&mut header) {
            return match err.kind() {
                std::io::ErrorKind::UnexpectedEof => errdata!("header is truncated"),
                _ => Err(err.into()),
            };
        }
        let meta = Meta::decode(&header)?;
        Ok(Self { file: Mutex::new(file), meta })
    }

    /// Returns the table geometry.
    pub fn meta(&self) -> Meta {
        self.meta
    }

    /// Hashes a key to its initial probe slot: FNV-1a 32-bit reduced
    /// modulo the slot count.
    fn hash_key(&self, key: &str) -> u64 {
        (fnv1a(key.as_bytes()) % self.meta.keys_len) as u64
    }

    /// Reads and parses a slot. A short read past the end of the file
    /// leaves the zeroed buffer tail in place, so slots beyond the
    /// allocated table parse as empty.
    fn read_slot(&self, slot: u64) -> Result<Option<Entry>> {
        let mut data = vec![0u8; self.meta.max_length as usize];
        let mut file = self.file.lock()?;
        file.seek(SeekFrom::Start(self.meta.slot_offset(slot)))?;
        let mut n = 0;
        while n < data.len() {
            let read = file.read(&mut data[n..])?;
            if read == 0 {
                break;
            }
            n += read;
        }
        drop(file);
        Entry::decode(&data)
    }

    /// Writes a slot's full contents. Always covers the whole slot
    /// width so a shorter record never leaves stale bytes behind.
    fn write_slot(&self, slot: u64, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.meta.max_length as usize);
        let mut file = self.file.lock()?;
        file.seek(SeekFrom::Start(self.meta.slot_offset(slot)))?;
        file.write_all(data)?;
        Ok(())
    }

    /// Looks up the value pointer for a key. A populated slot with a
    /// different key sends the probe to the next slot; an empty slot is
    /// a miss.
    pub fn lookup(&self, key: &str) -> Result<Option<Entry>> {
        let mut slot = self.hash_key(key);
        loop {
            match self.read_slot(slot)? {
                Some(entry) if entry.key == key => return Ok(Some(entry)),
                Some(_) => slot += 1,
                None => return Ok(None),
            }
        }
    }

    /// Inserts a value pointer, replacing the previous pointer if the
    /// key is already present. Fails if the formatted record exceeds
    /// the slot width.
    pub fn insert(&self, entry: &Entry) -> Result<()> {
        let mut slot = self.hash_key(&entry.key);
        loop {
            match self.read_slot(slot)? {
                Some(occupant) if occupant.key != entry.key => slot += 1,
                _ => break,
            }
        }
        let record = entry.encode();
        if record.len() > self.meta.max_length as usize {
            return errinput!(
                "slot record for key {} is {} bytes, exceeding the slot width {}",
                entry.key,
                record.len(),
                self.meta.max_length
            );
        }
        let mut data = vec![0u8; self.meta.max_length as usize];
        data[..record.len()].copy_from_slice(&record);
        self.write_slot(slot, &data)
    }

    /// Removes a key by zero-filling its slot, returning whether it was
    /// present. Clearing a slot in the middle of a probe chain orphans
    /// colliding keys that probed over it: lookups miss them until they
    /// are set again or the index is migrated.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut slot = self.hash_key(key);
        loop {
            match self.read_slot(slot)? {
                Some(entry) if entry.key == key => break,
                Some(_) => slot += 1,
                None => return Ok(false),
            }
        }
        self.write_slot(slot, &vec![0u8; self.meta.max_length as usize])?;
        Ok(true)
    }

    /// Iterates over populated slots in slot order. The walk continues
    /// past the nominal table end while slots remain populated (probe
    /// overflow), exiting at the first empty slot at or past it.
    pub fn iter(&self) -> SlotIterator<'_> {
        SlotIterator { index: self, slot: 0 }
    }

    /// Flushes the index file to disk.
    pub fn sync(&self) -> Result<()> {
        Ok(self.file.lock()?.sync_all()?)
    }
}

/// Iterates over the populated slots of an index.
pub struct SlotIterator<'a> {
    index: &'a Index,
    slot: u64,
}

impl Iterator for SlotIterator<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.index.read_slot(self.slot) {
                Ok(Some(entry)) => {
                    self.slot += 1;
                    return Some(Ok(entry));
                }
                Ok(None) => {
                    if self.slot >= self.index.meta.keys_len as u64 {
                        return None;
                    }
                    self.slot += 1;
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Hashes bytes with FNV-1a 32-bit.
fn fnv1a(data: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x01000193;
    data.iter().fold(OFFSET_BASIS, |hash, &b| (hash ^ b as u32).wrapping_mul(PRIME))
}
