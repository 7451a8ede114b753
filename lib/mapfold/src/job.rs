//! Job composition: which mapper feeds which reducer.
//!
//! Mapper and reducer strategies are closed enums picked by [`JobSpec`], and
//! a job is the only thing handed to a pipeline.

use anyhow::Result;
use tracing::info;

use crate::api::{Emit, ExecutablePipeline, Mapper, Pair, RecordSource, Reducer};
use crate::mappers::{PassThroughMapper, TokenizingMapper};
use crate::memory::run_in_memory;
use crate::reducers::{FrequencyReducer, GapFillReducer};
use crate::sort::ValueOrder;
use crate::stats::JobStats;

#[derive(Clone, Debug)]
pub enum MapperKind {
    PassThrough(PassThroughMapper),
    Tokenize(TokenizingMapper),
}

impl Mapper for MapperKind {
    fn do_map<E>(&self, record: &str, emit: &mut E) -> Result<()>
    where
        E: Emit + ?Sized,
    {
        match self {
            MapperKind::PassThrough(m) => m.do_map(record, emit),
            MapperKind::Tokenize(m) => m.do_map(record, emit),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ReducerKind {
    GapFill(GapFillReducer),
    FrequencyCount(FrequencyReducer),
}

impl Reducer for ReducerKind {
    fn value_order(&self) -> ValueOrder {
        match self {
            ReducerKind::GapFill(r) => r.value_order(),
            ReducerKind::FrequencyCount(r) => r.value_order(),
        }
    }

    fn do_reduce<'a, I, E>(&self, key: &str, values: I, emit: &mut E) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
        E: Emit + ?Sized,
    {
        match self {
            ReducerKind::GapFill(r) => r.do_reduce(key, values, emit),
            ReducerKind::FrequencyCount(r) => r.do_reduce(key, values, emit),
        }
    }
}

#[derive(Clone, Debug)]
pub struct JobSpec {
    name: String,
    mapper: MapperKind,
    reducer: ReducerKind,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, mapper: MapperKind, reducer: ReducerKind) -> Self {
        Self { name: name.into(), mapper, reducer }
    }

    /// Sequence reconciliation: every record funnelled under `key`, then gap filled.
    pub fn data_clean(key: impl Into<String>, reducer: GapFillReducer) -> Self {
        Self::new(
            "data clean",
            MapperKind::PassThrough(PassThroughMapper::new(key)),
            ReducerKind::GapFill(reducer),
        )
    }

    /// Per-document token frequency.
    pub fn term_freq(reducer: FrequencyReducer) -> Self {
        Self::new("term freq", MapperKind::Tokenize(TokenizingMapper), ReducerKind::FrequencyCount(reducer))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_in_memory<S: RecordSource + ?Sized>(&self, source: &mut S) -> Result<Vec<Pair>> {
        run_in_memory(&self.mapper, &self.reducer, source)
    }

    /// Submits the job to `pipeline`; inputs and output must already be set.
    pub fn run<P: ExecutablePipeline>(self, pipeline: &mut P) -> Result<JobStats> {
        info!(job = %self.name, order = ?self.reducer.value_order(), "submitting job");
        pipeline.map_reduce(self.mapper, self.reducer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemorySource;
    use crate::reducers::GapPolicy;

    #[test]
    fn data_clean_funnels_all_records_into_one_group() {
        let job = JobSpec::data_clean("temp", GapFillReducer::default());
        let out = job.run_in_memory(&mut MemorySource::new(["3,C", "1,A"])).unwrap();
        assert_eq!(out, vec![Pair::new("temp", "1,A"), Pair::new("temp", "2,A"), Pair::new("temp", "3,C")]);
    }

    #[test]
    fn reducer_kind_reports_its_value_order() {
        let numeric = ReducerKind::GapFill(GapFillReducer::new(GapPolicy::FillAll, ValueOrder::NumericIndex));
        assert_eq!(numeric.value_order(), ValueOrder::NumericIndex);
        let freq = ReducerKind::FrequencyCount(FrequencyReducer::default());
        assert_eq!(freq.value_order(), ValueOrder::Lexicographic);
    }

    #[test]
    fn term_freq_counts_per_document() {
        let job = JobSpec::term_freq(FrequencyReducer::default());
        let out = job
            .run_in_memory(&mut MemorySource::new(["7,the cat sat", "7,the dog", "no comma"]))
            .unwrap();
        let expected: Vec<Pair> = [("cat", "1"), ("dog", "1"), ("sat", "1"), ("the", "2")]
            .iter()
            .map(|(t, n)| Pair::new(FrequencyReducer::default().format_key(t, "7"), *n))
            .collect();
        assert_eq!(out, expected);
    }
}
