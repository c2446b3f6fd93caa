use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Frame tokens at the top level of a snapshot file, ref:
/// https://github.com/redis/redis/blob/2ba81b70957691a6a010e785225672e6657e53e8/src/rdb.h#L93
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Aux = 250,          // RDB_OPCODE_AUX
    ResizeDb = 251,     // RDB_OPCODE_RESIZEDB
    ExpireTimeMs = 252, // RDB_OPCODE_EXPIRETIME_MS
    ExpireTime = 253,   // RDB_OPCODE_EXPIRETIME
    SelectDb = 254,     // RDB_OPCODE_SELECTDB
    Eof = 255,          // RDB_OPCODE_EOF
}

/// On-disk value encodings, ref:
/// https://github.com/redis/redis/blob/2ba81b70957691a6a010e785225672e6657e53e8/src/rdb.h#L100
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    String = 0,            // RDB_TYPE_STRING
    List = 1,              // RDB_TYPE_LIST
    Set = 2,               // RDB_TYPE_SET
    SortedSet = 3,         // RDB_TYPE_ZSET
    Hash = 4,              // RDB_TYPE_HASH
    SortedSet2 = 5,        // RDB_TYPE_ZSET_2
    ZipMap = 9,            // RDB_TYPE_HASH_ZIPMAP
    ZipList = 10,          // RDB_TYPE_LIST_ZIPLIST
    IntSet = 11,           // RDB_TYPE_SET_INTSET
    SortedSetZipList = 12, // RDB_TYPE_ZSET_ZIPLIST
    HashZipList = 13,      // RDB_TYPE_HASH_ZIPLIST
    QuickList = 14,        // RDB_TYPE_LIST_QUICKLIST
}

/// Logical Redis type behind an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    String,
    List,
    Set,
    SortedSet,
    Hash,
}

impl Encoding {
    pub fn kind(self) -> RecordKind {
        match self {
            Encoding::String => RecordKind::String,
            Encoding::List | Encoding::ZipList | Encoding::QuickList => RecordKind::List,
            Encoding::Set | Encoding::IntSet => RecordKind::Set,
            Encoding::SortedSet | Encoding::SortedSet2 | Encoding::SortedSetZipList => {
                RecordKind::SortedSet
            }
            Encoding::Hash | Encoding::ZipMap | Encoding::HashZipList => RecordKind::Hash,
        }
    }

    /// Encoding name as the server reports it via OBJECT ENCODING.
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::String => "string",
            Encoding::List => "linkedlist",
            Encoding::ZipList => "ziplist",
            Encoding::QuickList => "quicklist",
            Encoding::Set => "hashtable",
            Encoding::IntSet => "intset",
            Encoding::SortedSet | Encoding::SortedSet2 => "skiplist",
            Encoding::SortedSetZipList => "ziplist",
            Encoding::Hash => "hashtable",
            Encoding::ZipMap => "zipmap",
            Encoding::HashZipList => "ziplist",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::String => "string",
            RecordKind::List => "list",
            RecordKind::Set => "set",
            RecordKind::SortedSet => "sortedset",
            RecordKind::Hash => "hash",
        };
        f.write_str(name)
    }
}
