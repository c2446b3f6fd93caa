//! Parser for Redis RDB snapshot files with per-key memory estimation.
//!
//! The parser walks a snapshot on the calling thread, hands raw per-key
//! payloads to a pool of decode workers, and invokes a user-supplied
//! [`Filter`] with fully-decoded records. Each record carries an estimate
//! of the server-side memory the key would occupy if loaded.

pub mod error;
pub mod filter;
pub mod helper;
pub mod parser;
pub mod record;
pub mod source;

mod memory;

pub use error::ParseError;
pub use filter::{Database, Filter, KeyRef, Strategy, Type};
pub use parser::{Encoding, Opcode, Parser, RecordKind};
pub use record::{HashRecord, Key, ListRecord, Member, SetRecord, SortedSetRecord, StringRecord};
pub use source::{BufferedSource, MemSource, Source};
