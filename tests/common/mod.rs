//! Shared helpers: a snapshot byte builder and a collecting filter.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use bytes::Bytes;
use rdbmem::{
    Database, Filter, HashRecord, KeyRef, ListRecord, Member, SetRecord, SortedSetRecord,
    StringRecord, Type,
};

// ---------------------------------------------------------------- builder

pub struct Snapshot {
    buf: Vec<u8>,
}

#[allow(dead_code)]
impl Snapshot {
    pub fn new(version: &str) -> Self {
        let mut buf = b"REDIS".to_vec();
        buf.extend(version.as_bytes());
        Self { buf }
    }

    pub fn select_db(mut self, db: u64) -> Self {
        self.buf.push(0xfe);
        self.buf.extend(len_bytes(db));
        self
    }

    pub fn aux(mut self, key: &[u8], value: &[u8]) -> Self {
        self.buf.push(0xfa);
        self.buf.extend(string_bytes(key));
        self.buf.extend(string_bytes(value));
        self
    }

    pub fn resize(mut self, db_size: u64, expires_size: u64) -> Self {
        self.buf.push(0xfb);
        self.buf.extend(len_bytes(db_size));
        self.buf.extend(len_bytes(expires_size));
        self
    }

    pub fn expire_ms(mut self, at: i64) -> Self {
        self.buf.push(0xfc);
        self.buf.extend(at.to_le_bytes());
        self
    }

    pub fn expire_s(mut self, at: i32) -> Self {
        self.buf.push(0xfd);
        self.buf.extend(at.to_le_bytes());
        self
    }

    /// One key/value record: the encoding byte, an encoded key, and an
    /// already-encoded value payload.
    pub fn record(mut self, encoding: u8, key: &[u8], payload: &[u8]) -> Self {
        self.buf.push(encoding);
        self.buf.extend(key);
        self.buf.extend(payload);
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend(bytes);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(0xff);
        self.buf.extend([0u8; 8]); // checksum, ignored by the parser
        self.buf
    }
}

/// Length prefix in the shortest form that fits.
pub fn len_bytes(n: u64) -> Vec<u8> {
    if n < 64 {
        vec![n as u8]
    } else if n < 16384 {
        vec![0x40 | (n >> 8) as u8, (n & 0xff) as u8]
    } else if n <= u32::MAX as u64 {
        let mut v = vec![0x80];
        v.extend((n as u32).to_be_bytes());
        v
    } else {
        let mut v = vec![0x81];
        v.extend(n.to_be_bytes());
        v
    }
}

/// Length-prefixed plain string.
pub fn string_bytes(data: &[u8]) -> Vec<u8> {
    let mut v = len_bytes(data.len() as u64);
    v.extend(data);
    v
}

#[allow(dead_code)]
pub fn int8_string(value: i8) -> Vec<u8> {
    vec![0xc0, value as u8]
}

#[allow(dead_code)]
pub fn int16_string(value: i16) -> Vec<u8> {
    let mut v = vec![0xc1];
    v.extend(value.to_le_bytes());
    v
}

#[allow(dead_code)]
pub fn int32_string(value: i32) -> Vec<u8> {
    let mut v = vec![0xc2];
    v.extend(value.to_le_bytes());
    v
}

/// LZF-compressed string: `<0xc3><clen><ulen><compressed>`.
#[allow(dead_code)]
pub fn lzf_string(compressed: &[u8], uncompressed_len: u64) -> Vec<u8> {
    let mut v = vec![0xc3];
    v.extend(len_bytes(compressed.len() as u64));
    v.extend(len_bytes(uncompressed_len));
    v.extend(compressed);
    v
}

/// Hand-built LZF stream expanding to `count` copies of `byte`.
#[allow(dead_code)]
pub fn lzf_run(byte: u8, count: usize) -> Vec<u8> {
    assert!((10..=264).contains(&count));
    // one literal, then one extended back-reference at offset 1
    vec![0x00, byte, 0xe0, (count - 10) as u8, 0x00]
}

// ziplist / zipmap / intset frames

#[allow(dead_code)]
pub enum Zl<'a> {
    Str(&'a [u8]),
    I8(i8),
    I16(i16),
    I24(i32),
    I32(i32),
    I64(i64),
    Small(u8),
}

/// A ziplist frame holding the given entries.
#[allow(dead_code)]
pub fn ziplist(entries: &[Zl<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for entry in entries {
        body.push(0); // prev-entry length
        match entry {
            Zl::Str(data) => {
                if data.len() < 64 {
                    body.push(data.len() as u8);
                } else if data.len() < 16384 {
                    body.push(0x40 | (data.len() >> 8) as u8);
                    body.push((data.len() & 0xff) as u8);
                } else {
                    body.push(0x80);
                    body.extend((data.len() as u32).to_be_bytes());
                }
                body.extend(*data);
            }
            Zl::I8(v) => {
                body.push(0xfe);
                body.push(*v as u8);
            }
            Zl::I16(v) => {
                body.push(0xc0);
                body.extend(v.to_le_bytes());
            }
            Zl::I24(v) => {
                body.push(0xf0);
                body.extend(&v.to_le_bytes()[..3]);
            }
            Zl::I32(v) => {
                body.push(0xd0);
                body.extend(v.to_le_bytes());
            }
            Zl::I64(v) => {
                body.push(0xe0);
                body.extend(v.to_le_bytes());
            }
            Zl::Small(v) => {
                assert!(*v <= 12);
                body.push(0xf1 + v);
            }
        }
    }

    let mut blob = Vec::new();
    blob.extend((11 + body.len() as u32).to_le_bytes()); // zlbytes
    blob.extend(0u32.to_le_bytes()); // zltail, unused
    blob.extend((entries.len() as u16).to_le_bytes());
    blob.extend(body);
    blob.push(0xff);
    blob
}

/// A zipmap frame; `free` junk bytes are appended after each value.
#[allow(dead_code)]
pub fn zipmap(pairs: &[(&[u8], &[u8], u8)]) -> Vec<u8> {
    let mut blob = vec![pairs.len().min(254) as u8];
    for (key, value, free) in pairs {
        push_zipmap_len(&mut blob, key.len());
        blob.extend(*key);
        push_zipmap_len(&mut blob, value.len());
        blob.push(*free);
        blob.extend(*value);
        blob.extend(vec![0u8; *free as usize]);
    }
    blob.push(0xff);
    blob
}

fn push_zipmap_len(blob: &mut Vec<u8>, len: usize) {
    if len < 254 {
        blob.push(len as u8);
    } else {
        blob.push(254);
        blob.extend((len as u32).to_le_bytes());
    }
}

#[allow(dead_code)]
pub fn intset(width: u32, values: &[i64]) -> Vec<u8> {
    let mut blob = Vec::new();
    blob.extend(width.to_le_bytes());
    blob.extend((values.len() as u32).to_le_bytes());
    for v in values {
        match width {
            2 => blob.extend((*v as i16).to_le_bytes()),
            4 => blob.extend((*v as i32).to_le_bytes()),
            8 => blob.extend(v.to_le_bytes()),
            _ => unreachable!("unsupported intset width"),
        }
    }
    blob
}

// ---------------------------------------------------------------- filter

/// Everything the collector saw, keyed by key name where possible.
#[derive(Debug, Default, PartialEq)]
pub struct Seen {
    pub databases: Vec<u64>,
    pub types: Vec<&'static str>,
    pub keys: Vec<(Bytes, u64, i64, u64)>, // name, db, expiry, key memory
    pub strings: HashMap<Bytes, Bytes>,
    pub lists: HashMap<Bytes, Vec<Bytes>>,
    pub sets: HashMap<Bytes, HashSet<Member>>,
    pub hashes: HashMap<Bytes, HashMap<Bytes, Bytes>>,
    pub sorted_sets: HashMap<Bytes, HashMap<Bytes, f64>>,
    /// key -> reported encoding name
    pub encodings: HashMap<Bytes, &'static str>,
    /// key -> whole-record memory estimate
    pub memories: HashMap<Bytes, u64>,
}

/// Filter that records every callback; all state behind one mutex so the
/// same filter works in parallel mode.
#[derive(Debug, Default)]
pub struct Collector {
    pub seen: Mutex<Seen>,
}

impl Collector {
    pub fn take(&self) -> Seen {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }
}

impl Filter for Collector {
    fn database(&self, db: &Database<'_>) -> bool {
        self.seen.lock().unwrap().databases.push(db.num);
        false
    }

    fn typ(&self, typ: &Type<'_>) -> bool {
        self.seen.lock().unwrap().types.push(typ.encoding.as_str());
        false
    }

    fn key(&self, key: &KeyRef<'_>) -> bool {
        self.seen.lock().unwrap().keys.push((
            key.name.clone(),
            key.db,
            key.expiry,
            key.memory(),
        ));
        false
    }

    fn string(&self, record: &StringRecord) {
        let mut seen = self.seen.lock().unwrap();
        let name = record.key.name.clone();
        seen.encodings.insert(name.clone(), record.key.encoding.as_str());
        seen.memories.insert(name.clone(), record.memory());
        seen.strings.insert(name, record.value.clone());
    }

    fn list(&self, record: &ListRecord) {
        let mut seen = self.seen.lock().unwrap();
        let name = record.key.name.clone();
        seen.encodings.insert(name.clone(), record.key.encoding.as_str());
        seen.memories.insert(name.clone(), record.memory());
        seen.lists.insert(name, record.values.clone());
    }

    fn set(&self, record: &SetRecord) {
        let mut seen = self.seen.lock().unwrap();
        let name = record.key.name.clone();
        seen.encodings.insert(name.clone(), record.key.encoding.as_str());
        seen.memories.insert(name.clone(), record.memory());
        seen.sets.insert(name, record.members.clone());
    }

    fn hash(&self, record: &HashRecord) {
        let mut seen = self.seen.lock().unwrap();
        let name = record.key.name.clone();
        seen.encodings.insert(name.clone(), record.key.encoding.as_str());
        seen.memories.insert(name.clone(), record.memory());
        seen.hashes.insert(name, record.fields.clone());
    }

    fn sorted_set(&self, record: &SortedSetRecord) {
        let mut seen = self.seen.lock().unwrap();
        let name = record.key.name.clone();
        seen.encodings.insert(name.clone(), record.key.encoding.as_str());
        seen.memories.insert(name.clone(), record.memory());
        seen.sorted_sets.insert(name, record.members.clone());
    }
}
