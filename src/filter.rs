//! Filter contract and the skip-strategy state machine.

use std::{
    cell::Cell,
    ops::{BitOr, BitOrAssign, Deref},
};

use crate::{
    parser::Encoding,
    record::{HashRecord, Key, ListRecord, SetRecord, SortedSetRecord, StringRecord},
};

/// Bitmask deciding which logical stages of a record are materialized
/// versus merely stream-walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Strategy(u32);

impl Strategy {
    pub const NONE: Strategy = Strategy(0);
    /// Drop AUX/RESIZE metadata surfacing.
    pub const SKIP_META: Strategy = Strategy(1);
    /// Do not materialize expiry timestamps.
    pub const SKIP_EXPIRY: Strategy = Strategy(1 << 1);
    /// Do not materialize value payloads; their bytes are still walked.
    pub const SKIP_VALUE: Strategy = Strategy(1 << 2);
    /// Skip entire records while still walking the frame.
    pub const SKIP_ALL: Strategy = Strategy(1 << 3);

    pub fn intersects(self, other: Strategy) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Strategy {
    type Output = Strategy;

    fn bitor(self, rhs: Strategy) -> Strategy {
        Strategy(self.0 | rhs.0)
    }
}

impl BitOrAssign for Strategy {
    fn bitor_assign(&mut self, rhs: Strategy) {
        self.0 |= rhs.0;
    }
}

/// Three-layer strategy stack: the parse-start default, the per-database
/// layer, and the per-record `running` layer consulted on every skip
/// decision.
#[derive(Debug, Default)]
pub(crate) struct StrategyStack {
    default: Strategy,
    global: Cell<Strategy>,
    running: Cell<Strategy>,
}

impl StrategyStack {
    /// Installs the parse-start strategy on all layers.
    pub(crate) fn set_default(&mut self, strategy: Strategy) {
        self.default = strategy;
        self.global.set(strategy);
        self.running.set(strategy);
    }

    pub(crate) fn running(&self) -> Strategy {
        self.running.get()
    }

    /// A new database begins: the per-database layer reverts to the
    /// parse-start default.
    pub(crate) fn select_db(&self) {
        self.global.set(self.default);
        self.running.set(self.default);
    }

    /// Replaces the per-database layer for the remainder of the database.
    pub(crate) fn set_database(&self, strategy: Strategy) {
        self.global.set(strategy);
        self.running.set(strategy);
    }

    /// Overrides the running layer for the current record only.
    pub(crate) fn set_record(&self, strategy: Strategy) {
        self.running.set(strategy);
    }

    /// The record completed; running falls back to the database layer.
    pub(crate) fn end_record(&self) {
        self.running.set(self.global.get());
    }
}

/// New-database notification, handed to [`Filter::database`] right after
/// a database-select token.
pub struct Database<'a> {
    pub num: u64,
    pub(crate) strategy: &'a StrategyStack,
}

impl Database<'_> {
    /// Replaces the skip strategy for the remainder of this database.
    pub fn skip(&self, strategy: Strategy) {
        self.strategy.set_database(strategy);
    }
}

/// The upcoming record's on-disk encoding, handed to [`Filter::typ`]
/// before the key is read so whole encodings can be skipped cheaply.
pub struct Type<'a> {
    pub encoding: Encoding,
    pub(crate) strategy: &'a StrategyStack,
}

impl Type<'_> {
    /// Overrides the skip strategy for the current record.
    pub fn skip(&self, strategy: Strategy) {
        self.strategy.set_record(strategy);
    }
}

/// The upcoming record's key, handed to [`Filter::key`] before the value
/// body is read. Dereferences to [`Key`].
pub struct KeyRef<'a> {
    pub(crate) key: &'a Key,
    pub(crate) strategy: &'a StrategyStack,
}

impl Deref for KeyRef<'_> {
    type Target = Key;

    fn deref(&self) -> &Key {
        self.key
    }
}

impl KeyRef<'_> {
    /// Overrides the skip strategy for the current record.
    pub fn skip(&self, strategy: Strategy) {
        self.strategy.set_record(strategy);
    }
}

/// Callback surface invoked by the parser.
///
/// The decision callbacks (`database`, `typ`, `key`) run on the parsing
/// thread, in snapshot order; returning `true` stops the parse without
/// error. The value callbacks run on decode workers and are not
/// synchronized by the parser: a filter used in parallel mode must
/// synchronize its own state, and callback order is only guaranteed in
/// ordered mode.
#[allow(unused_variables)]
pub trait Filter: Send + Sync {
    /// A new database was selected.
    fn database(&self, db: &Database<'_>) -> bool {
        false
    }

    /// The encoding of the upcoming record.
    fn typ(&self, typ: &Type<'_>) -> bool {
        false
    }

    /// The upcoming record's key, with its memory already accounted.
    fn key(&self, key: &KeyRef<'_>) -> bool {
        false
    }

    fn string(&self, record: &StringRecord) {}

    fn list(&self, record: &ListRecord) {}

    fn set(&self, record: &SetRecord) {}

    fn hash(&self, record: &HashRecord) {}

    fn sorted_set(&self, record: &SortedSetRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_bit_ops() {
        let mask = Strategy::SKIP_META | Strategy::SKIP_VALUE;
        assert!(mask.intersects(Strategy::SKIP_META));
        assert!(mask.intersects(Strategy::SKIP_VALUE));
        assert!(!mask.intersects(Strategy::SKIP_EXPIRY));
        assert!(Strategy::NONE.is_empty());
        assert!(!mask.is_empty());
    }

    #[test]
    fn stack_layering() {
        let mut stack = StrategyStack::default();
        stack.set_default(Strategy::SKIP_META);
        assert_eq!(stack.running(), Strategy::SKIP_META);

        // per-record override falls back at end_record
        stack.set_record(Strategy::SKIP_ALL);
        assert_eq!(stack.running(), Strategy::SKIP_ALL);
        stack.end_record();
        assert_eq!(stack.running(), Strategy::SKIP_META);

        // per-database override survives end_record, not select_db
        stack.set_database(Strategy::SKIP_VALUE);
        stack.end_record();
        assert_eq!(stack.running(), Strategy::SKIP_VALUE);
        stack.select_db();
        assert_eq!(stack.running(), Strategy::SKIP_META);
    }
}
