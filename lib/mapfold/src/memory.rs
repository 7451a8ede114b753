//! In-process driver: the same map / group-and-sort / reduce contract as the
//! engine, over an explicit record source and without touching the disk.

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::api::{Mapper, Pair, RecordSource, Reducer};
use crate::sort::{group_and_sort, GroupedKey};

/// Maps every record of `source`, groups and sorts the complete output, then
/// reduces each group. Output comes back group by group, ordered by the
/// mapped key each group was formed on, and within a group in the order the
/// reducer emitted it. Reducers that rewrite keys (term frequency) therefore
/// do not return pairs sorted by their output key.
pub fn run_in_memory<M, R, S>(mapper: &M, reducer: &R, source: &mut S) -> Result<Vec<Pair>>
where
    M: Mapper + Sync,
    R: Reducer + Sync,
    S: RecordSource + ?Sized,
{
    let mut records = Vec::new();
    while let Some(record) = source.next_record() {
        records.push(record?);
    }

    let mapped: Vec<Vec<Pair>> = records
        .par_iter()
        .enumerate()
        .map(|(i, record)| -> Result<Vec<Pair>> {
            let mut out: Vec<Pair> = Vec::new();
            mapper.do_map(record, &mut out).with_context(|| format!("map record {}", i + 1))?;
            Ok(out)
        })
        .collect::<Result<_>>()?;

    // Barrier: nothing is grouped until every record has been mapped.
    let groups = group_and_sort(mapped.into_iter().flatten().collect(), reducer.value_order());

    let reduced: Vec<Vec<Pair>> = groups
        .par_iter()
        .map(|group| reduce_group(reducer, group))
        .collect::<Result<_>>()?;
    Ok(reduced.into_iter().flatten().collect())
}

/// Runs `reducer` over one complete group.
pub fn reduce_group<R: Reducer>(reducer: &R, group: &GroupedKey) -> Result<Vec<Pair>> {
    let mut out: Vec<Pair> = Vec::new();
    reducer
        .do_reduce(&group.key, group.values.iter().map(String::as_str), &mut out)
        .with_context(|| format!("reduce key '{}'", group.key))?;
    Ok(out)
}
