//! Top-level stream driver: validates the header, walks frame tokens and
//! per-key payloads on the calling thread, and feeds the decode
//! pipeline.

use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};

use crate::{
    error::ParseError,
    filter::{Database, Filter, KeyRef, Strategy, StrategyStack, Type},
    helper::{is_plain_int, wrapping_to_usize, AnyResult},
    memory,
    parser::{
        lzf,
        model::{Encoding, Opcode},
        pipeline::{Pipeline, Slot, WorkItem},
    },
    record::Key,
    source::Source,
};

/// Per-record transient read state, reset between records.
#[derive(Debug, Default)]
struct State {
    /// Is the next field to be read skippable?
    skip: bool,
    /// Was the last string LZF-compressed?
    compressed: bool,
    /// Cost accumulated for the field currently being read.
    memory: u64,
}

/// Streaming snapshot parser.
///
/// ```no_run
/// use std::sync::Arc;
/// use rdbmem::{MemSource, Parser, Strategy};
///
/// # struct Probe;
/// # impl rdbmem::Filter for Probe {}
/// let source = MemSource::open("dump.rdb")?;
/// Parser::new(source)
///     .with_filter(Arc::new(Probe))
///     .with_strategy(Strategy::SKIP_META)
///     .parse()?;
/// # anyhow::Ok(())
/// ```
pub struct Parser<S> {
    source: S,
    filter: Option<Arc<dyn Filter>>,
    strategy: StrategyStack,
    state: State,
    /// Byte cost of one interned integer; the reference narrows it to 4
    /// while reading linked-list members.
    int_size: u64,
    current_db: u64,
    ordered: bool,
}

impl<S: Source> Parser<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            filter: None,
            strategy: StrategyStack::default(),
            state: State::default(),
            int_size: 8,
            current_db: 0,
            ordered: false,
        }
    }

    /// Installs the filter. Without one the parser still walks the whole
    /// file but materializes nothing.
    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the initial global skip strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy.set_default(strategy);
        self
    }

    /// Forces ordered dispatch: a single decode worker, so value
    /// callbacks arrive in snapshot order.
    pub fn enable_sync(mut self) -> Self {
        self.ordered = true;
        self
    }

    /// Parses the snapshot to EOF, an abort, or the first error.
    pub fn parse(mut self) -> AnyResult<()> {
        self.read_header().context("read snapshot header")?;

        let pipeline = match &self.filter {
            Some(filter) => Some(Pipeline::start(Arc::clone(filter), self.ordered)?),
            None => None,
        };
        let result = self.run(pipeline.as_ref());
        match pipeline {
            Some(pipeline) => pipeline.finish(result),
            None => result,
        }
    }

    fn read_header(&mut self) -> AnyResult<()> {
        if self.source.read_exact(5)? != b"REDIS" {
            return Err(ParseError::InvalidSnapshot.into());
        }
        let version = self.source.read_exact(4)?;
        let version: u64 = std::str::from_utf8(version)
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or(ParseError::UnsupportedVersion)?;
        if !(1..=8).contains(&version) {
            return Err(ParseError::UnsupportedVersion.into());
        }
        Ok(())
    }

    fn run(&mut self, pipeline: Option<&Pipeline>) -> AnyResult<()> {
        let mut expiry: i64 = -1;

        loop {
            if let Some(pipeline) = pipeline {
                if let Some(err) = pipeline.take_fault() {
                    return Err(err);
                }
            }

            let token = self.source.read_u8().context("read frame token")?;
            match Opcode::try_from(token) {
                Ok(Opcode::SelectDb) => {
                    self.strategy.select_db();
                    let (db, _) = self.read_length(false).context("read database number")?;
                    self.current_db = db;
                    if self.notify_database(db) {
                        return Ok(());
                    }
                }
                Ok(Opcode::Aux) => {
                    self.skip_stage(Strategy::SKIP_META | Strategy::SKIP_ALL);
                    let key = self.read_raw_string(false).context("read aux key")?;
                    let value = self.read_raw_string(false).context("read aux value")?;
                    if !self.skip_stage(Strategy::SKIP_META | Strategy::SKIP_ALL) {
                        info!(key = %key.escape_ascii(), value = %value.escape_ascii(), "aux field");
                    }
                }
                Ok(Opcode::ResizeDb) => {
                    let (db_size, _) = self.read_length(false).context("read db size")?;
                    let (expires_size, _) =
                        self.read_length(false).context("read expires size")?;
                    if !self.skip_stage(Strategy::SKIP_META | Strategy::SKIP_ALL) {
                        info!(db_size, expires_size, "resize hint");
                    }
                }
                Ok(Opcode::ExpireTimeMs) => {
                    if self.skip_stage(Strategy::SKIP_EXPIRY | Strategy::SKIP_ALL) {
                        self.source.skip(8)?;
                    } else {
                        expiry = self.source.read_le_i64().context("read ms expiry")?;
                    }
                }
                Ok(Opcode::ExpireTime) => {
                    if self.skip_stage(Strategy::SKIP_EXPIRY | Strategy::SKIP_ALL) {
                        self.source.skip(4)?;
                    } else {
                        expiry = self.source.read_le_i32().context("read expiry")?;
                    }
                }
                // trailing checksum bytes are not validated
                Ok(Opcode::Eof) => return Ok(()),
                Err(_) => {
                    if !self.read_record(pipeline, token, &mut expiry)? {
                        return Ok(());
                    }
                }
            }
            self.clear_state();
        }
    }

    /// Reads one key/value record. Returns `false` when the parse should
    /// stop: a callback aborted, or the encoding byte is unknown.
    fn read_record(
        &mut self,
        pipeline: Option<&Pipeline>,
        token: u8,
        expiry: &mut i64,
    ) -> AnyResult<bool> {
        let Ok(encoding) = Encoding::try_from(token) else {
            warn!(encoding = token, "unsupported value encoding, stopping");
            return Ok(false);
        };

        self.skip_stage(Strategy::SKIP_ALL);
        if self.notify_type(encoding) {
            return Ok(false);
        }

        self.skip_stage(Strategy::SKIP_ALL);
        let name = self.read_raw_string(true).context("read key")?;
        let key = Key {
            db: self.current_db,
            encoding,
            expiry: *expiry,
            name,
            memory: self.take_memory() + memory::top_level(*expiry),
        };
        if self.notify_key(&key) {
            return Ok(false);
        }
        *expiry = -1;

        self.skip_stage(Strategy::SKIP_VALUE | Strategy::SKIP_ALL);
        let slots = self
            .read_value_slots(encoding)
            .with_context(|| format!("read {} value", encoding))?;
        self.dispatch(pipeline, key, slots)?;
        Ok(true)
    }

    fn read_value_slots(&mut self, encoding: Encoding) -> AnyResult<Vec<Slot>> {
        match encoding {
            Encoding::String => Ok(vec![self.read_value_slot(true)?]),
            Encoding::List | Encoding::Set => {
                let (count, _) = self.read_length(false)?;
                if encoding == Encoding::List {
                    self.int_size = 4;
                }
                let mut slots = Vec::with_capacity(wrapping_to_usize(count));
                for _ in 0..count {
                    slots.push(self.read_value_slot(true)?);
                }
                Ok(slots)
            }
            Encoding::Hash => {
                let (count, _) = self.read_length(false)?;
                let mut slots = Vec::with_capacity(wrapping_to_usize(count.saturating_mul(2)));
                for _ in 0..count {
                    slots.push(self.read_value_slot(true)?);
                    slots.push(self.read_value_slot(true)?);
                }
                Ok(slots)
            }
            Encoding::SortedSet | Encoding::SortedSet2 => {
                let (count, _) = self.read_length(false)?;
                let mut slots = Vec::with_capacity(wrapping_to_usize(count.saturating_mul(2)));
                for _ in 0..count {
                    slots.push(self.read_value_slot(true)?);
                    slots.push(Slot::Double(self.read_double(encoding)?));
                }
                Ok(slots)
            }
            Encoding::ZipMap
            | Encoding::ZipList
            | Encoding::IntSet
            | Encoding::SortedSetZipList
            | Encoding::HashZipList => Ok(vec![self.read_value_slot(false)?]),
            Encoding::QuickList => {
                let (count, _) = self.read_length(false)?;
                let mut slots = Vec::with_capacity(wrapping_to_usize(count));
                for _ in 0..count {
                    slots.push(self.read_value_slot(false)?);
                }
                Ok(slots)
            }
        }
    }

    fn read_value_slot(&mut self, memory: bool) -> AnyResult<Slot> {
        let (data, length) = self.read_raw_bytes(memory)?;
        let compressed = std::mem::take(&mut self.state.compressed);
        Ok(Slot::Bytes {
            data,
            compressed,
            length,
            memory: self.take_memory(),
        })
    }

    fn read_double(&mut self, encoding: Encoding) -> AnyResult<f64> {
        if encoding == Encoding::SortedSet2 {
            if self.state.skip {
                self.source.skip(8)?;
                return Ok(0.0);
            }
            let raw = self.source.read_exact(8)?;
            return Ok(f64::from_le_bytes(raw.try_into()?));
        }

        let first = self.source.read_u8()?;
        match first {
            253 => Ok(f64::NAN),
            254 => Ok(f64::INFINITY),
            255 => Ok(f64::NEG_INFINITY),
            len => {
                if self.state.skip {
                    self.source.skip(len as usize)?;
                    return Ok(0.0);
                }
                let raw = self.source.read_exact(len as usize)?;
                let text = std::str::from_utf8(raw).context("score should be ascii")?;
                text.parse().with_context(|| format!("parse score {text:?}"))
            }
        }
    }

    /// Reads one length-prefixed string payload, returning the bytes
    /// (`None` when skipping) and the payload length. When `memory` is
    /// set, the allocator cost lands in the transient state.
    fn read_raw_bytes(&mut self, memory: bool) -> AnyResult<(Option<Bytes>, u64)> {
        let (length, encoded) = self.read_length(true)?;

        if !encoded {
            let data = self.source.read_exact(wrapping_to_usize(length))?;
            if memory {
                if length <= 32 && is_plain_int(data) {
                    self.state.memory = self.int_size;
                } else {
                    self.state.memory = memory::alloc(length);
                }
            }
            if self.state.skip {
                return Ok((None, length));
            }
            return Ok((Some(Bytes::copy_from_slice(data)), length));
        }

        match length {
            3 => self.read_compressed(memory),
            2 => {
                // 32-bit integer
                let value = self.source.read_le_i32()?;
                self.state.memory += 8;
                Ok(self.int_payload(value))
            }
            1 => {
                // 16-bit integer; [0, 9999] hits the server's shared table
                let value = self.source.read_le_i16()?;
                if !(0..10_000).contains(&value) {
                    self.state.memory += 8;
                }
                Ok(self.int_payload(value))
            }
            0 => {
                // 8-bit integer
                let value = self.source.read_u8()? as i8 as i64;
                if value < 0 {
                    self.state.memory += 8;
                }
                Ok(self.int_payload(value))
            }
            _ => Err(ParseError::InvalidLengthEncoding.into()),
        }
    }

    fn int_payload(&self, value: i64) -> (Option<Bytes>, u64) {
        let text = value.to_string();
        let length = text.len() as u64;
        if self.state.skip {
            return (None, length);
        }
        (Some(Bytes::from(text)), length)
    }

    /// `<compressed-len><uncompressed-len><compressed-content>`
    fn read_compressed(&mut self, memory: bool) -> AnyResult<(Option<Bytes>, u64)> {
        let (compressed_len, _) = self.read_length(false)?;
        let (uncompressed_len, _) = self.read_length(false)?;

        if memory {
            self.state.memory += memory::alloc(uncompressed_len);
        }
        if self.state.skip {
            self.source.skip(wrapping_to_usize(compressed_len))?;
            return Ok((None, uncompressed_len));
        }

        let data = self.source.read_exact(wrapping_to_usize(compressed_len))?;
        self.state.compressed = true;
        Ok((Some(Bytes::copy_from_slice(data)), uncompressed_len))
    }

    /// Reads a length prefix; the `bool` is set when the prefix is a
    /// special encoding tag rather than a plain length.
    fn read_length(&mut self, allow_encoded: bool) -> AnyResult<(u64, bool)> {
        let first = self.source.read_u8()?;
        match first {
            0x80 => Ok((self.source.read_be_i32()? as u32 as u64, false)),
            0x81 => Ok((self.source.read_be_i64()? as u64, false)),
            _ => match first >> 6 {
                0 => Ok(((first & 0x3f) as u64, false)),
                1 => {
                    let second = self.source.read_u8()?;
                    Ok((((first & 0x3f) as u64) << 8 | second as u64, false))
                }
                3 if allow_encoded => Ok(((first & 0x3f) as u64, true)),
                _ => Err(ParseError::InvalidLengthEncoding.into()),
            },
        }
    }

    /// Reads a string payload and finishes decompression inline; used
    /// for keys and AUX fields which never reach the worker pool.
    fn read_raw_string(&mut self, memory: bool) -> AnyResult<Bytes> {
        let (data, length) = self.read_raw_bytes(memory)?;
        let Some(data) = data else {
            return Ok(Bytes::new());
        };
        if std::mem::take(&mut self.state.compressed) {
            let out = lzf::decompress(&data, wrapping_to_usize(length))?;
            return Ok(Bytes::from(out));
        }
        Ok(data)
    }

    /// Consults the running strategy for the next stage; any overlap
    /// with `mask` marks the stage skippable.
    fn skip_stage(&mut self, mask: Strategy) -> bool {
        self.state.skip = mask.intersects(self.strategy.running());
        self.state.skip
    }

    fn take_memory(&mut self) -> u64 {
        std::mem::take(&mut self.state.memory)
    }

    fn clear_state(&mut self) {
        self.state = State::default();
        self.int_size = 8;
        self.strategy.end_record();
    }

    fn notify_database(&self, num: u64) -> bool {
        match &self.filter {
            Some(filter) if !self.state.skip => filter.database(&Database {
                num,
                strategy: &self.strategy,
            }),
            _ => false,
        }
    }

    fn notify_type(&self, encoding: Encoding) -> bool {
        match &self.filter {
            Some(filter) if !self.state.skip => filter.typ(&Type {
                encoding,
                strategy: &self.strategy,
            }),
            _ => false,
        }
    }

    fn notify_key(&self, key: &Key) -> bool {
        match &self.filter {
            Some(filter) if !self.state.skip => filter.key(&KeyRef {
                key,
                strategy: &self.strategy,
            }),
            _ => false,
        }
    }

    fn dispatch(
        &mut self,
        pipeline: Option<&Pipeline>,
        key: Key,
        slots: Vec<Slot>,
    ) -> AnyResult<()> {
        self.skip_stage(Strategy::SKIP_ALL);
        if self.state.skip {
            return Ok(());
        }
        let Some(pipeline) = pipeline else {
            return Ok(());
        };
        pipeline.send(WorkItem { key, slots })
    }
}
