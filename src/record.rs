//! Decoded records handed to the filter.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::parser::Encoding;

/// Identifier for one record within the snapshot.
///
/// Constructed by the stream driver once the key bytes are read and
/// handed to the filter before the value body; `memory` covers the key
/// string plus the top-level dictionary-entry and expiry-entry costs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Database the key was found in.
    pub db: u64,
    /// On-disk value encoding.
    pub encoding: Encoding,
    /// Expiry timestamp as stored in the file (seconds or milliseconds
    /// depending on the frame token); `-1` when the key never expires.
    pub expiry: i64,
    /// Key bytes; integer-encoded keys materialize as decimal strings.
    pub name: Bytes,
    pub(crate) memory: u64,
}

impl Key {
    /// Estimated bytes this key contributes on its own: the key string
    /// allocation plus dictionary and expiry entries.
    pub fn memory(&self) -> u64 {
        self.memory
    }
}

impl Default for Key {
    fn default() -> Self {
        Self {
            db: 0,
            encoding: Encoding::String,
            expiry: -1,
            name: Bytes::new(),
            memory: 0,
        }
    }
}

/// A set member: a string, or an integer when the set was stored as an
/// intset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Member {
    Str(Bytes),
    Int(i64),
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Str(s) => write!(f, "{}", s.escape_ascii()),
            Member::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Redis string record.
#[derive(Debug, Clone, Default)]
pub struct StringRecord {
    pub key: Key,
    pub value: Bytes,
    pub(crate) memory: u64,
}

impl StringRecord {
    /// Estimated resident bytes for the whole record.
    pub fn memory(&self) -> u64 {
        self.key.memory + self.memory
    }

    pub(crate) fn clear(&mut self) {
        self.key = Key::default();
        self.value = Bytes::new();
        self.memory = 0;
    }
}

/// Redis list record; values keep their insertion order.
#[derive(Debug, Clone, Default)]
pub struct ListRecord {
    pub key: Key,
    pub values: Vec<Bytes>,
    pub(crate) memory: u64,
}

impl ListRecord {
    pub fn memory(&self) -> u64 {
        self.key.memory + self.memory
    }

    pub(crate) fn clear(&mut self) {
        self.key = Key::default();
        self.values.clear();
        self.memory = 0;
    }
}

/// Redis set record.
#[derive(Debug, Clone, Default)]
pub struct SetRecord {
    pub key: Key,
    pub members: HashSet<Member>,
    pub(crate) memory: u64,
}

impl SetRecord {
    pub fn memory(&self) -> u64 {
        self.key.memory + self.memory
    }

    pub(crate) fn clear(&mut self) {
        self.key = Key::default();
        self.members.clear();
        self.memory = 0;
    }
}

/// Redis hash record.
#[derive(Debug, Clone, Default)]
pub struct HashRecord {
    pub key: Key,
    pub fields: HashMap<Bytes, Bytes>,
    pub(crate) memory: u64,
}

impl HashRecord {
    pub fn memory(&self) -> u64 {
        self.key.memory + self.memory
    }

    pub(crate) fn clear(&mut self) {
        self.key = Key::default();
        self.fields.clear();
        self.memory = 0;
    }
}

/// Redis sorted-set record: member to score.
#[derive(Debug, Clone, Default)]
pub struct SortedSetRecord {
    pub key: Key,
    pub members: HashMap<Bytes, f64>,
    pub(crate) memory: u64,
}

impl SortedSetRecord {
    pub fn memory(&self) -> u64 {
        self.key.memory + self.memory
    }

    pub(crate) fn clear(&mut self) {
        self.key = Key::default();
        self.members.clear();
        self.memory = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_memory_includes_key() {
        let mut record = StringRecord::default();
        record.key.memory = 48;
        record.memory = 16;
        assert_eq!(record.memory(), 64);
    }

    #[test]
    fn clear_empties_containers() {
        let mut record = SetRecord::default();
        record.members.insert(Member::Int(42));
        record.memory = 100;
        record.clear();
        assert!(record.members.is_empty());
        assert_eq!(record.memory(), 0);
    }

    #[test]
    fn member_display() {
        assert_eq!(Member::Str(Bytes::from("abc")).to_string(), "abc");
        assert_eq!(Member::Int(-7).to_string(), "-7");
    }
}
