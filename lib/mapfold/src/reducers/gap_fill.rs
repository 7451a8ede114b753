//! Sequence reconciliation: rebuilds a contiguous `1..N` run of
//! `"index,label"` entries per key, forward-filling labels into the gaps.

use anyhow::Result;
use memchr::memchr;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::api::{Emit, Reducer};
use crate::constants::{DEFAULT_INITIAL_LABEL, DEFAULT_MAX_GAP};
use crate::errors::JobError;
use crate::sort::{parse_index, ValueOrder};

/// One observed position of a document sequence, text form `"index,label"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceEntry {
    pub index: u64,
    pub label: String,
}

impl SequenceEntry {
    pub fn new(index: u64, label: impl Into<String>) -> Self {
        Self { index, label: label.into() }
    }
}

impl FromStr for SequenceEntry {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| JobError::InvalidEntry { value: s.to_string(), reason: reason.to_string() };
        let idx = memchr(b',', s.as_bytes()).ok_or_else(|| invalid("missing ',' separator"))?;
        let index = parse_index(&s.as_bytes()[..idx]).ok_or_else(|| invalid("index is not an unsigned integer"))?;
        if index == 0 {
            return Err(invalid("index must be at least 1"));
        }
        Ok(Self { index, label: s[idx + 1..].to_string() })
    }
}

impl fmt::Display for SequenceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.index, self.label)
    }
}

/// What to do when an entry is not the immediate successor of the last one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GapPolicy {
    /// Emit one filler per missing index and advance past the entry, so every
    /// index `1..=max` appears exactly once. Entries at or below the last
    /// index (duplicates, or out of order under lexicographic sorting) are
    /// dropped.
    #[default]
    FillAll,
    /// Emit a single filler at `last + 1` followed by the entry, and do not
    /// advance. Repeated gaps in one group re-emit the same filler position.
    Legacy,
}

impl GapPolicy {
    /// Value order the policy is meant to run under. `FillAll` needs indices
    /// in numeric order, otherwise `"10,x"` arrives before `"2,y"` and the
    /// observed entries `2..9` are dropped as stale. `Legacy` keeps the plain
    /// text order it was written against.
    pub fn natural_order(self) -> ValueOrder {
        match self {
            GapPolicy::FillAll => ValueOrder::NumericIndex,
            GapPolicy::Legacy => ValueOrder::Lexicographic,
        }
    }
}

/// Per-key fold state. Lives for exactly one `do_reduce` call.
struct SequenceState {
    last_index: u64,
    last_label: String,
}

#[derive(Clone, Debug)]
pub struct GapFillReducer {
    policy: GapPolicy,
    order: ValueOrder,
    initial_label: String,
    max_gap: u64,
}

impl Default for GapFillReducer {
    fn default() -> Self {
        Self::with_policy(GapPolicy::default())
    }
}

impl GapFillReducer {
    pub fn new(policy: GapPolicy, order: ValueOrder) -> Self {
        Self { policy, order, initial_label: DEFAULT_INITIAL_LABEL.to_string(), max_gap: DEFAULT_MAX_GAP }
    }

    /// Reducer for `policy` under its [`GapPolicy::natural_order`].
    pub fn with_policy(policy: GapPolicy) -> Self {
        Self::new(policy, policy.natural_order())
    }

    pub fn with_initial_label(mut self, label: impl Into<String>) -> Self {
        self.initial_label = label.into();
        self
    }

    /// Largest number of fillers `FillAll` synthesizes for a single gap.
    /// A wider gap fails the group with [`JobError::GapTooLarge`].
    pub fn with_max_gap(mut self, max_gap: u64) -> Self {
        self.max_gap = max_gap;
        self
    }
}

impl Reducer for GapFillReducer {
    fn value_order(&self) -> ValueOrder {
        self.order
    }

    fn do_reduce<'a, I, E>(&self, key: &str, values: I, emit: &mut E) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
        E: Emit + ?Sized,
    {
        let mut state = SequenceState { last_index: 0, last_label: self.initial_label.clone() };
        let mut fillers: u64 = 0;
        let mut dropped: u64 = 0;

        for raw in values {
            let entry: SequenceEntry = raw.parse()?;
            match self.policy {
                GapPolicy::FillAll => {
                    if entry.index <= state.last_index {
                        dropped += 1;
                        continue;
                    }
                    let missing = entry.index - state.last_index - 1;
                    if missing > self.max_gap {
                        return Err(JobError::GapTooLarge {
                            key: key.to_string(),
                            from: state.last_index,
                            to: entry.index,
                            max: self.max_gap,
                        }
                        .into());
                    }
                    while state.last_index + 1 < entry.index {
                        state.last_index += 1;
                        emit.emit(key.to_string(), format!("{},{}", state.last_index, state.last_label));
                        fillers += 1;
                    }
                    emit.emit(key.to_string(), entry.to_string());
                    state.last_index = entry.index;
                    state.last_label = entry.label;
                }
                GapPolicy::Legacy => {
                    let next = state.last_index.saturating_add(1);
                    if entry.index == next {
                        emit.emit(key.to_string(), entry.to_string());
                        state.last_index = next;
                        state.last_label = entry.label;
                    } else {
                        emit.emit(key.to_string(), format!("{},{}", next, state.last_label));
                        emit.emit(key.to_string(), entry.to_string());
                        fillers += 1;
                    }
                }
            }
        }

        if fillers > 0 || dropped > 0 {
            debug!(key, fillers, dropped, last_index = state.last_index, "sequence reconciled");
        }
        Ok(())
    }
}
