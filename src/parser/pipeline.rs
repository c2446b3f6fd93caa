//! Decode pipeline: the stream driver enqueues opaque per-key work
//! items, a pool of workers finishes decoding (LZF, container
//! reconstruction, memory accounting) and dispatches to the filter.

use std::{
    sync::{
        mpsc::{self, Receiver, SyncSender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context};
use bytes::Bytes;
use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    filter::Filter,
    helper::{wrapping_to_usize, AnyResult},
    memory,
    parser::{
        lzf,
        model::{Encoding, RecordKind},
        packed,
    },
    record::{HashRecord, Key, ListRecord, Member, SetRecord, SortedSetRecord, StringRecord},
};

/// Queue depth between the stream driver and the workers; the driver
/// blocks when the queue is full.
const QUEUE_DEPTH: usize = 512;

/// One raw field captured while streaming, finished by a worker.
#[derive(Debug)]
pub(crate) enum Slot {
    Bytes {
        /// Payload bytes; `None` when the value stage was skipped.
        data: Option<Bytes>,
        /// Whether `data` still carries LZF-compressed bytes.
        compressed: bool,
        /// Uncompressed payload length.
        length: u64,
        /// Memory cost accounted while reading.
        memory: u64,
    },
    Double(f64),
}

/// The unit of work handed from the stream driver to the workers.
#[derive(Debug)]
pub(crate) struct WorkItem {
    pub(crate) key: Key,
    pub(crate) slots: Vec<Slot>,
}

pub(crate) struct Pipeline {
    queue: SyncSender<WorkItem>,
    workers: Vec<JoinHandle<()>>,
    fault: Arc<Mutex<Option<anyhow::Error>>>,
}

impl Pipeline {
    /// Spawns the worker pool: one worker in ordered mode, otherwise
    /// `max(2, cpu_count)`.
    pub(crate) fn start(filter: Arc<dyn Filter>, ordered: bool) -> AnyResult<Self> {
        let (queue, rx) = mpsc::sync_channel(QUEUE_DEPTH);
        let rx = Arc::new(Mutex::new(rx));
        let fault = Arc::new(Mutex::new(None));

        let count = if ordered { 1 } else { worker_count() };
        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let rx = Arc::clone(&rx);
            let filter = Arc::clone(&filter);
            let fault = Arc::clone(&fault);
            let handle = thread::Builder::new()
                .name(format!("rdbmem-decode-{i}"))
                .spawn(move || worker_loop(rx, filter, fault))
                .context("spawn decode worker")?;
            workers.push(handle);
        }

        Ok(Self {
            queue,
            workers,
            fault,
        })
    }

    /// Blocks while the queue is full; fails only when the workers have
    /// already exited on a fault.
    pub(crate) fn send(&self, item: WorkItem) -> AnyResult<()> {
        if self.queue.send(item).is_err() {
            return Err(self
                .take_fault()
                .unwrap_or_else(|| anyhow!("decode workers exited unexpectedly")));
        }
        Ok(())
    }

    pub(crate) fn take_fault(&self) -> Option<anyhow::Error> {
        self.fault.lock().ok()?.take()
    }

    /// Closes the queue, joins the workers, and surfaces the first fault
    /// when the parse itself succeeded.
    pub(crate) fn finish(self, result: AnyResult<()>) -> AnyResult<()> {
        let Pipeline {
            queue,
            workers,
            fault,
        } = self;
        drop(queue);
        for worker in workers {
            let _ = worker.join();
        }
        match result {
            Ok(()) => match fault.lock().ok().and_then(|mut slot| slot.take()) {
                Some(err) => Err(err),
                None => Ok(()),
            },
            err => err,
        }
    }
}

fn worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(2)
}

fn worker_loop(
    queue: Arc<Mutex<Receiver<WorkItem>>>,
    filter: Arc<dyn Filter>,
    fault: Arc<Mutex<Option<anyhow::Error>>>,
) {
    let mut scratch = Scratch::new();
    loop {
        let item = {
            let Ok(guard) = queue.lock() else { return };
            guard.recv()
        };
        let Ok(item) = item else {
            return; // queue closed, drain complete
        };
        if let Err(err) = scratch.decode(filter.as_ref(), item) {
            if let Ok(mut slot) = fault.lock() {
                slot.get_or_insert(err);
            }
            return;
        }
    }
}

/// Per-worker reusable records; cleared before every refill so no state
/// leaks between callbacks.
struct Scratch {
    string: StringRecord,
    list: ListRecord,
    set: SetRecord,
    hash: HashRecord,
    sorted_set: SortedSetRecord,
    rng: SmallRng,
}

impl Scratch {
    fn new() -> Self {
        Self {
            string: StringRecord::default(),
            list: ListRecord::default(),
            set: SetRecord::default(),
            hash: HashRecord::default(),
            sorted_set: SortedSetRecord::default(),
            rng: SmallRng::from_os_rng(),
        }
    }

    fn decode(&mut self, filter: &dyn Filter, item: WorkItem) -> AnyResult<()> {
        let WorkItem { key, slots } = item;
        let slots = decompress_slots(slots)?;
        match key.encoding.kind() {
            RecordKind::String => {
                self.build_string(key, slots);
                filter.string(&self.string);
            }
            RecordKind::List => {
                self.build_list(key, slots)?;
                filter.list(&self.list);
            }
            RecordKind::Set => {
                self.build_set(key, slots)?;
                filter.set(&self.set);
            }
            RecordKind::Hash => {
                self.build_hash(key, slots)?;
                filter.hash(&self.hash);
            }
            RecordKind::SortedSet => {
                self.build_sorted_set(key, slots)?;
                filter.sorted_set(&self.sorted_set);
            }
        }
        Ok(())
    }

    fn build_string(&mut self, key: Key, slots: Vec<Slot>) {
        let record = &mut self.string;
        record.clear();
        if let Some(Slot::Bytes { data, memory, .. }) = slots.into_iter().next() {
            record.memory = memory;
            if let Some(data) = data {
                record.value = data;
            }
        }
        record.key = key;
    }

    fn build_list(&mut self, key: Key, slots: Vec<Slot>) -> AnyResult<()> {
        let record = &mut self.list;
        record.clear();
        match key.encoding {
            Encoding::List => {
                record.memory += memory::linked_list();
                for slot in slots {
                    let Slot::Bytes { data, memory, .. } = slot else {
                        continue;
                    };
                    record.memory += memory + memory::linked_list_entry() + memory::root();
                    if let Some(data) = data {
                        record.values.push(data);
                    }
                }
            }
            Encoding::ZipList => {
                if let Some(Slot::Bytes { data, length, .. }) = slots.into_iter().next() {
                    record.memory += length;
                    if let Some(data) = data {
                        record.values = packed::ziplist_entries(&data).context("decode ziplist")?;
                    }
                }
            }
            Encoding::QuickList => {
                record.memory += memory::quicklist(slots.len() as u64);
                for slot in slots {
                    let Slot::Bytes { data, length, .. } = slot else {
                        continue;
                    };
                    record.memory += length;
                    if let Some(data) = data {
                        record.values.extend(
                            packed::ziplist_entries(&data).context("decode quicklist chunk")?,
                        );
                    }
                }
            }
            _ => {}
        }
        record.key = key;
        Ok(())
    }

    fn build_set(&mut self, key: Key, slots: Vec<Slot>) -> AnyResult<()> {
        let record = &mut self.set;
        record.clear();
        match key.encoding {
            Encoding::Set => {
                record.memory += memory::hash_table(slots.len() as u64);
                for slot in slots {
                    let Slot::Bytes { data, memory, .. } = slot else {
                        continue;
                    };
                    record.memory += memory + memory::hash_entry() + memory::root();
                    if let Some(data) = data {
                        record.members.insert(Member::Str(data));
                    }
                }
            }
            Encoding::IntSet => {
                if let Some(Slot::Bytes { data, length, .. }) = slots.into_iter().next() {
                    record.memory += length;
                    if let Some(data) = data {
                        for value in packed::intset_entries(&data).context("decode intset")? {
                            record.members.insert(Member::Int(value));
                        }
                    }
                }
            }
            _ => {}
        }
        record.key = key;
        Ok(())
    }

    fn build_hash(&mut self, key: Key, slots: Vec<Slot>) -> AnyResult<()> {
        let record = &mut self.hash;
        record.clear();
        match key.encoding {
            Encoding::Hash => {
                record.memory += memory::hash_table(slots.len() as u64 / 2);
                let mut slots = slots.into_iter();
                while let (Some(field), Some(value)) = (slots.next(), slots.next()) {
                    let Slot::Bytes {
                        data: field_data,
                        memory: field_memory,
                        ..
                    } = field
                    else {
                        continue;
                    };
                    let Slot::Bytes {
                        data: value_data,
                        memory: value_memory,
                        ..
                    } = value
                    else {
                        continue;
                    };
                    record.memory +=
                        field_memory + value_memory + memory::hash_entry() + 2 * memory::root();
                    if let (Some(field_data), Some(value_data)) = (field_data, value_data) {
                        record.fields.insert(field_data, value_data);
                    }
                }
            }
            Encoding::HashZipList => {
                if let Some(Slot::Bytes { data, length, .. }) = slots.into_iter().next() {
                    record.memory += length;
                    if let Some(data) = data {
                        let entries =
                            packed::ziplist_entries(&data).context("decode hash ziplist")?;
                        let mut entries = entries.into_iter();
                        while let (Some(field), Some(value)) = (entries.next(), entries.next()) {
                            record.fields.insert(field, value);
                        }
                    }
                }
            }
            Encoding::ZipMap => {
                if let Some(Slot::Bytes { data, length, .. }) = slots.into_iter().next() {
                    record.memory += length;
                    if let Some(data) = data {
                        for (field, value) in
                            packed::zipmap_entries(&data).context("decode zipmap")?
                        {
                            record.fields.insert(field, value);
                        }
                    }
                }
            }
            _ => {}
        }
        record.key = key;
        Ok(())
    }

    fn build_sorted_set(&mut self, key: Key, slots: Vec<Slot>) -> AnyResult<()> {
        let Scratch {
            sorted_set: record,
            rng,
            ..
        } = self;
        record.clear();
        match key.encoding {
            Encoding::SortedSet | Encoding::SortedSet2 => {
                record.memory += memory::skiplist(slots.len() as u64 / 2);
                let mut slots = slots.into_iter();
                while let (Some(member), Some(score)) = (slots.next(), slots.next()) {
                    let Slot::Bytes { data, memory, .. } = member else {
                        continue;
                    };
                    let Slot::Double(score) = score else {
                        continue;
                    };
                    let level = memory::random_level(rng);
                    record.memory +=
                        memory + 8 + memory::root() + memory::skiplist_entry(level);
                    if let Some(data) = data {
                        record.members.insert(data, score);
                    }
                }
            }
            Encoding::SortedSetZipList => {
                if let Some(Slot::Bytes { data, length, .. }) = slots.into_iter().next() {
                    record.memory += length;
                    if let Some(data) = data {
                        let entries =
                            packed::ziplist_entries(&data).context("decode sorted-set ziplist")?;
                        let mut entries = entries.into_iter();
                        while let (Some(member), Some(score)) = (entries.next(), entries.next()) {
                            let score = std::str::from_utf8(&score)
                                .ok()
                                .and_then(|s| s.parse::<f64>().ok())
                                .with_context(|| {
                                    format!("invalid ziplist score: {}", score.escape_ascii())
                                })?;
                            record.members.insert(member, score);
                        }
                    }
                }
            }
            _ => {}
        }
        record.key = key;
        Ok(())
    }
}

fn decompress_slots(mut slots: Vec<Slot>) -> AnyResult<Vec<Slot>> {
    for slot in &mut slots {
        if let Slot::Bytes {
            data: Some(data),
            compressed,
            length,
            ..
        } = slot
        {
            if *compressed {
                let out = lzf::decompress(data, wrapping_to_usize(*length))?;
                *data = Bytes::from(out);
                *compressed = false;
            }
        }
    }
    Ok(slots)
}
