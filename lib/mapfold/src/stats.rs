use serde::Serialize;

#[derive(Clone, Debug, Default)]
pub struct MapTaskStats {
    pub task_id: usize,
    pub num_files: u64,
    pub records_in: u64,
    pub total_emits: u64,
    pub total_bytes_out: u64,
    pub total_flushes: u64,
    pub wall_ms: u64,
}

#[derive(Clone, Debug, Default)]
pub struct SortStats {
    pub reducer: u64,
    pub input_files: u64,
    pub lines_in: u64,
    pub bytes_in: u64,
    pub sort_ms: u64,
    pub io_read_ms: u64,
    pub io_write_ms: u64,
    pub wall_ms: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ReduceStats {
    pub reducer: u64,
    pub lines_in: u64,
    pub groups: u64,
    pub records_out: u64,
    pub reduce_ms: u64,
    pub write_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct MapStats {
    pub tasks: usize,
    pub total_records: u64,
    pub total_emits: u64,
    pub total_bytes_out: u64,
    pub total_flushes: u64,
    pub min_task_ms: u64,
    pub max_task_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct SortStatsAgg {
    pub reducers: usize,
    pub total_lines: u64,
    pub total_bytes: u64,
    pub min_reducer_ms: u64,
    pub max_reducer_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ReduceStatsAgg {
    pub reducers: usize,
    pub total_lines: u64,
    pub total_groups: u64,
    pub total_records_out: u64,
    pub min_reducer_ms: u64,
    pub max_reducer_ms: u64,
    pub wall_ms: u64,
}

/// Summary of one engine run, serializable for `--stats` output.
#[derive(Default, Clone, Debug, Serialize)]
pub struct JobStats {
    pub job_id: String,
    pub map: MapStats,
    pub sort: SortStatsAgg,
    pub reduce: ReduceStatsAgg,
}

#[derive(Default)]
pub struct StatsCollector {
    stats: JobStats,
}

impl StatsCollector {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self { stats: JobStats { job_id: job_id.into(), ..JobStats::default() } }
    }

    pub fn record_map(&mut self, per_task: &[MapTaskStats], wall_ms: u64) -> &MapStats {
        self.stats.map = MapStats {
            tasks: per_task.len(),
            total_records: per_task.iter().map(|t| t.records_in).sum(),
            total_emits: per_task.iter().map(|t| t.total_emits).sum(),
            total_bytes_out: per_task.iter().map(|t| t.total_bytes_out).sum(),
            total_flushes: per_task.iter().map(|t| t.total_flushes).sum(),
            min_task_ms: per_task.iter().map(|t| t.wall_ms).min().unwrap_or(0),
            max_task_ms: per_task.iter().map(|t| t.wall_ms).max().unwrap_or(0),
            wall_ms,
        };
        &self.stats.map
    }

    pub fn record_sort(&mut self, per_reducer: &[SortStats], wall_ms: u64) -> &SortStatsAgg {
        self.stats.sort = SortStatsAgg {
            reducers: per_reducer.len(),
            total_lines: per_reducer.iter().map(|s| s.lines_in).sum(),
            total_bytes: per_reducer.iter().map(|s| s.bytes_in).sum(),
            min_reducer_ms: per_reducer.iter().map(|s| s.wall_ms).min().unwrap_or(0),
            max_reducer_ms: per_reducer.iter().map(|s| s.wall_ms).max().unwrap_or(0),
            wall_ms,
        };
        &self.stats.sort
    }

    pub fn record_reduce(&mut self, per_reducer: &[ReduceStats], wall_ms: u64) -> &ReduceStatsAgg {
        self.stats.reduce = ReduceStatsAgg {
            reducers: per_reducer.len(),
            total_lines: per_reducer.iter().map(|s| s.lines_in).sum(),
            total_groups: per_reducer.iter().map(|s| s.groups).sum(),
            total_records_out: per_reducer.iter().map(|s| s.records_out).sum(),
            min_reducer_ms: per_reducer.iter().map(|s| s.wall_ms).min().unwrap_or(0),
            max_reducer_ms: per_reducer.iter().map(|s| s.wall_ms).max().unwrap_or(0),
            wall_ms,
        };
        &self.stats.reduce
    }

    pub fn finish(self) -> JobStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_stats_aggregate_tasks() {
        let mut c = StatsCollector::new("job");
        let tasks = [
            MapTaskStats { task_id: 0, records_in: 2, total_emits: 5, wall_ms: 3, ..Default::default() },
            MapTaskStats { task_id: 1, records_in: 1, total_emits: 1, wall_ms: 9, ..Default::default() },
        ];
        let agg = c.record_map(&tasks, 12).clone();
        assert_eq!((agg.tasks, agg.total_records, agg.total_emits), (2, 3, 6));
        assert_eq!((agg.min_task_ms, agg.max_task_ms, agg.wall_ms), (3, 9, 12));

        let json = serde_json::to_value(c.finish()).unwrap();
        assert_eq!(json["job_id"], "job");
        assert_eq!(json["map"]["total_emits"], 6);
    }
}
