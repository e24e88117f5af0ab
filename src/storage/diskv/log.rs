use super::index::Entry;
use crate::errdata;
use crate::error::Result;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// A log record operation marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Set,
    Del,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::Set => "_set",
            Op::Del => "_del",
        }
    }

    fn parse(data: &[u8]) -> Result<Self> {
        match std::str::from_utf8(data) {
            Ok("_set") => Ok(Op::Set),
            Ok("_del") => Ok(Op::Del),
            _ => errdata!("unknown log operation {}", String::from_utf8_lossy(data)),
        }
    }
}

/// A decoded log record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub op: Op,
    pub key: String,
    pub value: Vec<u8>,
}

/// Minimum plausible encoded record length; anything shorter cannot
/// hold an operation and a bracket.
const MIN_RECORD_LEN: usize = 5;

/// The append-only value log, a concatenation of records encoded as
/// `<op>[<key>]<value>\n` with no length prefix. Records are addressed
/// by the absolute offset and total length held in the index, so their
/// positions never shift during live operation; only a migration
/// produces a fresh file. Tombstones (`_del` records with an empty
/// value) stay in the file as dead weight until then.
pub struct Log {
    file: Mutex<File>,
}

impl Log {
    /// Opens the log file in append mode, creating it if missing.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).append(true).create(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Truncates the log to zero length. Used when a migration reuses a
    /// temporary file left over from an interrupted run.
    pub fn truncate(&self) -> Result<()> {
        Ok(self.file.lock()?.set_len(0)?)
    }

    /// Appends a record and returns its value pointer. The offset is
    /// the file size at write time; append mode guarantees the bytes
    /// land there while the log mutex is held.
    pub fn append(&self, op: Op, key: &str, value: &[u8]) -> Result<Entry> {
        let record = encode(op, key, value);
        let mut file = self.file.lock()?;
        let offset = file.metadata()?.len();
        file.write_all(&record)?;
        Ok(Entry { key: key.to_owned(), offset, length: record.len() as u32 })
    }

    /// Reads and decodes the record a value pointer refers to. Only
    /// `_set` records are ever pointed at by a slot; anything else
    /// means the index and log disagree.
    pub fn read(&self, entry: &Entry) -> Result<Record> {
        let mut data = vec![0u8; entry.length as usize];
        let mut file = self.file.lock()?;
        file.seek(SeekFrom::Start(entry.offset))?;
        file.read_exact(&mut data)?;
        drop(file);
        let record = decode(&data, &entry.key)?;
        if record.op != Op::Set {
            return errdata!("slot for key {} points at a {} record", entry.key, record.op.as_str());
        }
        Ok(record)
    }

    /// Returns the current log file size in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.lock()?.metadata()?.len())
    }

    /// Flushes the log file to disk.
    pub fn sync(&self) -> Result<()> {
        Ok(self.file.lock()?.sync_all()?)
    }
}

/// Encodes a record as `<op>[<key>]<value>\n`. No escaping is
/// performed: keys must not contain brackets or newlines, while values
/// may contain anything since records are read back by exact length.
fn encode(op: Op, key: &str, value: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(op.as_str().len() + key.len() + value.len() + 3);
    record.extend_from_slice(op.as_str().as_bytes());
    record.push(b'[');
    record.extend_from_slice(key.as_bytes());
    record.push(b']');
    record.extend_from_slice(value);
    record.push(b'\n');
    record
}

/// Decodes a record, checking its key against the key the index slot
/// promised. The final byte is the record terminator and is dropped
/// without inspection; a record with no closing bracket decodes with an
/// empty value.
fn decode(data: &[u8], expect_key: &str) -> Result<Record> {
    if data.len() < MIN_RECORD_LEN {
        return errdata!("log record is {} bytes, expected at least {MIN_RECORD_LEN}", data.len());
    }
    let Some(open) = data.iter().position(|&b| b == b'[') else {
        return errdata!("log record has no opening bracket");
    };
    let op = Op::parse(&data[..open])?;
    let rest = &data[open + 1..data.len() - 1];
    let (key, value): (&[u8], &[u8]) = match rest.iter().position(|&b| b == b']') {
        Some(close) => (&rest[..close], &rest[close + 1..]),
        None => (rest, &[]),
    };
    let Ok(key) = std::str::from_utf8(key) else {
        return errdata!("log record key is not valid UTF-8");
    };
    if key != expect_key {
        return errdata!("log record key {key} does not match expected key {expect_key}");
    }
    Ok(Record { op, key: key.to_owned(), value: value.to_vec() })
}
