use anyhow::Result;
use std::collections::VecDeque;

use crate::sort::ValueOrder;
use crate::stats::JobStats;

/// One input line, handed to a single mapper invocation.
pub type Record = String;

/// A key/value pair flowing between phases. Immutable once emitted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

// ========== Explicit execution context ==========

/// Output side of the context passed to mappers and reducers.
pub trait Emit {
    fn emit(&mut self, key: String, value: String);
}

impl Emit for Vec<Pair> {
    fn emit(&mut self, key: String, value: String) {
        self.push(Pair { key, value });
    }
}

impl<E: Emit + ?Sized> Emit for &mut E {
    fn emit(&mut self, key: String, value: String) {
        (**self).emit(key, value)
    }
}

/// Input side of the context: yields records until exhausted.
/// Errors from the underlying source are yielded, never swallowed.
pub trait RecordSource {
    fn next_record(&mut self) -> Option<Result<Record>>;
}

/// Record source over an owned list of lines.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    records: VecDeque<Record>,
}

impl MemorySource {
    pub fn new<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Record>,
    {
        Self { records: records.into_iter().map(Into::into).collect() }
    }
}

impl RecordSource for MemorySource {
    fn next_record(&mut self) -> Option<Result<Record>> {
        self.records.pop_front().map(Ok)
    }
}

// ========== Core MapReduce traits ==========

/// Stateless per-record transformation.
pub trait Mapper {
    fn do_map<E>(&self, record: &str, emit: &mut E) -> Result<()>
    where
        E: Emit + ?Sized;
}

/// Per-group aggregation. Receives every value of `key`, already ordered by
/// [`Reducer::value_order`], and may emit any number of output pairs.
///
/// Any state must live inside a single `do_reduce` call.
pub trait Reducer {
    fn value_order(&self) -> ValueOrder {
        ValueOrder::Lexicographic
    }

    fn do_reduce<'a, I, E>(&self, key: &str, values: I, emit: &mut E) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
        E: Emit + ?Sized;
}

// ========== Executable pipeline interface ==========

pub trait ExecutablePipeline {
    fn add_input(&mut self, input_path: impl Into<String>);
    fn add_output(&mut self, output_path: impl Into<String>);

    fn map_reduce<M, R>(&mut self, mapper: M, reducer: R) -> Result<JobStats>
    where
        M: Mapper + Send + Sync + 'static,
        R: Reducer + Send + Sync + 'static;
}
