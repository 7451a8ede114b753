use crate::api::{Emit, ExecutablePipeline, Mapper, Pair, RecordSource, Reducer};
use crate::config::RuntimeConfig;
use crate::constants::SUCCESS_MARKER;
use crate::io::{ensure_dir, hash_to_partition, list_files_recursive, move_file, open_writer, read_lines, write_tsv};
use crate::sort::{external_sort_by_key, SortedGroups, ValueOrder};
use crate::stats::{JobStats, MapTaskStats, ReduceStats, SortStats, StatsCollector};
use crate::utils::local_job_id;
use crate::writer::{ThreadWriter, WriterPool};
use anyhow::{bail, Context, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Local execution engine: line files in, `part-NNNNN.tsv` files out.
///
/// Phases are separated by hard barriers. All map tasks and spill writers
/// finish before any partition is sorted, and every partition is reduced
/// before the output directory is touched. Part files are committed only when
/// the whole job succeeded.
pub struct RuntimePipeline {
    inputs: Vec<String>,
    output: Option<String>,
    config: RuntimeConfig,
}

impl RuntimePipeline {
    /// Pipeline configured from `MAPFOLD_*` environment variables.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::from_env())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self { inputs: vec![], output: None, config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl Default for RuntimePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutablePipeline for RuntimePipeline {
    fn add_input(&mut self, input_path: impl Into<String>) {
        self.inputs.push(input_path.into());
    }

    fn add_output(&mut self, output_path: impl Into<String>) {
        self.output = Some(output_path.into());
    }

    fn map_reduce<M, R>(&mut self, mapper: M, reducer: R) -> Result<JobStats>
    where
        M: Mapper + Send + Sync + 'static,
        R: Reducer + Send + Sync + 'static,
    {
        let output_dir = PathBuf::from(self.output.clone().context("output not set")?);
        if self.inputs.is_empty() {
            bail!("no inputs added");
        }

        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("mapfold-{}", i));
        if let Some(n) = self.config.rayon_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder.build().context("build rayon pool")?;

        let job_id = local_job_id();
        let launch_root = self.config.work_dir.join(&job_id);
        let result = pool.install(|| self.execute(&job_id, &launch_root, &output_dir, &mapper, &reducer));

        if self.config.keep_intermediates {
            info!(run_dir = %launch_root.display(), "keeping intermediates");
        } else if let Err(e) = fs::remove_dir_all(&launch_root) {
            warn!(run_dir = %launch_root.display(), error = %e, "failed to remove intermediates");
        }
        result
    }
}

impl RuntimePipeline {
    fn execute<M, R>(&self, job_id: &str, launch_root: &Path, output_dir: &Path, mapper: &M, reducer: &R) -> Result<JobStats>
    where
        M: Mapper + Sync,
        R: Reducer + Sync,
    {
        let job_start = Instant::now();
        let map_out_dir = launch_root.join("map_out");
        let sort_out_dir = launch_root.join("sort_out");
        let reduce_out_dir = launch_root.join("reduce_out");
        ensure_dir(&map_out_dir)?;
        ensure_dir(&sort_out_dir)?;
        ensure_dir(&reduce_out_dir)?;

        // inputs
        let mut all_files = Vec::new();
        for inp in &self.inputs {
            let mut files = list_files_recursive(inp)?;
            if files.is_empty() {
                warn!(input = %inp, "input has no files");
            }
            all_files.append(&mut files);
        }

        // partition files among map tasks
        let ntasks = self.config.effective_tasks(all_files.len());
        let num_reducers = self.config.effective_reducers(ntasks);
        let chunks: Vec<Vec<PathBuf>> = (0..ntasks)
            .map(|i| all_files.iter().enumerate().filter(|(idx, _)| idx % ntasks == i).map(|(_, p)| p.clone()).collect())
            .collect();

        let fd_limit = get_fd_soft_limit();
        info!(
            job_id, input_files = all_files.len(), ntasks, num_reducers,
            fd_soft_limit = fd_limit.unwrap_or(0),
            "mapfold starting map phase"
        );
        let mut stats = StatsCollector::new(job_id);

        // Map phase
        let (writer_pool, mut writer_joiner) = WriterPool::new(
            &map_out_dir,
            num_reducers,
            self.config.flush_bytes,
            self.config.flush_interval,
            self.config.writer_queue_cap,
        )?;
        let map_phase_start = Instant::now();
        let map_result: Result<Vec<MapTaskStats>> = (0..ntasks)
            .into_par_iter()
            .map(|task_id| run_map_task(task_id, &chunks[task_id], mapper, &writer_pool, self.config.local_batch_bytes))
            .collect();
        // Barrier: every writer drained and closed before sorting starts.
        writer_pool.close_all();
        writer_joiner.join_all().context("map phase spill")?;
        let map_stats = map_result?;
        for (part, m) in writer_pool.metrics_snapshot().iter().enumerate() {
            debug!(partition = part, bytes_written = m.bytes_written, write_calls = m.write_calls,
                   flush_by_size = m.flush_by_size, flush_by_timer = m.flush_by_timer,
                   max_queue_len = m.max_queue_len, "spill writer metrics");
        }
        let agg = stats.record_map(&map_stats, map_phase_start.elapsed().as_millis() as u64);
        info!(phase = "map",
              tasks = agg.tasks, records = agg.total_records,
              total_emits = agg.total_emits, total_bytes_out = agg.total_bytes_out, total_flushes = agg.total_flushes,
              min_task_ms = agg.min_task_ms, max_task_ms = agg.max_task_ms,
              wall_ms = agg.wall_ms,
              "Map phase complete");

        // Sort/shuffle
        let order = reducer.value_order();
        let sort_phase_start = Instant::now();
        let sort_stats: Vec<SortStats> = (0..num_reducers)
            .into_par_iter()
            .map(|r| run_sort_for(r, &map_out_dir, &sort_out_dir, order))
            .collect::<Result<_>>()?;
        let agg = stats.record_sort(&sort_stats, sort_phase_start.elapsed().as_millis() as u64);
        info!(phase = "sort",
              reducers = agg.reducers, total_lines = agg.total_lines, total_bytes = agg.total_bytes,
              min_reducer_ms = agg.min_reducer_ms, max_reducer_ms = agg.max_reducer_ms,
              wall_ms = agg.wall_ms, order = ?order,
              "Sort phase complete");

        // Reduce phase
        let reduce_phase_start = Instant::now();
        let reduce_stats: Vec<ReduceStats> = (0..num_reducers)
            .into_par_iter()
            .map(|r| run_reduce_for(r, &sort_out_dir, &reduce_out_dir, reducer))
            .collect::<Result<_>>()?;
        let agg = stats.record_reduce(&reduce_stats, reduce_phase_start.elapsed().as_millis() as u64);
        info!(phase = "reduce",
              reducers = agg.reducers, total_lines = agg.total_lines, total_groups = agg.total_groups,
              records_out = agg.total_records_out,
              min_reducer_ms = agg.min_reducer_ms, max_reducer_ms = agg.max_reducer_ms,
              wall_ms = agg.wall_ms,
              "Reduce phase complete");

        commit_output(&reduce_out_dir, output_dir, num_reducers)?;
        info!(job_id, output = %output_dir.display(), wall_ms = job_start.elapsed().as_millis() as u64, "Job complete");
        Ok(stats.finish())
    }
}

/// Routes emitted pairs to their partition's spill buffer.
struct PartitionEmitter<'a> {
    writer: ThreadWriter<'a>,
    num_partitions: usize,
    emits: u64,
}

impl Emit for PartitionEmitter<'_> {
    fn emit(&mut self, key: String, value: String) {
        let part = hash_to_partition(&key, self.num_partitions);
        self.writer.emit_record(part, key.as_bytes(), value.as_bytes());
        self.emits += 1;
    }
}

fn run_map_task<M: Mapper>(task_id: usize, files: &[PathBuf], mapper: &M, pool: &WriterPool, batch_bytes: usize) -> Result<MapTaskStats> {
    let task_start = Instant::now();
    debug!(task_id, num_files = files.len(), "map task starting");
    let mut emitter = PartitionEmitter {
        writer: pool.make_thread_writer(batch_bytes),
        num_partitions: pool.num_partitions(),
        emits: 0,
    };
    let mut records_in: u64 = 0;
    for file in files {
        let mut source = read_lines(file)?;
        while let Some(record) = source.next_record() {
            let record = record.with_context(|| format!("read {}", file.display()))?;
            mapper
                .do_map(&record, &mut emitter)
                .with_context(|| format!("map record {} of {}", records_in + 1, file.display()))?;
            records_in += 1;
        }
    }
    let total_emits = emitter.emits;
    let (total_flushes, total_bytes_out) = emitter.writer.finish()?;
    Ok(MapTaskStats {
        task_id,
        num_files: files.len() as u64,
        records_in,
        total_emits,
        total_bytes_out,
        total_flushes,
        wall_ms: task_start.elapsed().as_millis() as u64,
    })
}

fn run_sort_for(r: usize, map_out_dir: &Path, sort_out_dir: &Path, order: ValueOrder) -> Result<SortStats> {
    let start = Instant::now();
    let pattern = format!(
        "{}/task*_part{}.bin",
        glob::Pattern::escape(&map_out_dir.to_string_lossy()),
        r
    );
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("glob {}", pattern))?
        .collect::<std::result::Result<_, _>>()?;
    paths.sort();

    let out_path = sort_out_dir.join(format!("reduce_in_part{}.bin", r));
    let outcome = external_sort_by_key(paths.as_slice(), &out_path, order)?;
    debug!(reducer = r, input_files = outcome.input_files, lines_in = outcome.lines_in, sort_ms = outcome.sort_only_ms, "partition sorted");
    Ok(SortStats {
        reducer: r as u64,
        input_files: outcome.input_files,
        lines_in: outcome.lines_in,
        bytes_in: outcome.bytes_in,
        sort_ms: outcome.sort_only_ms,
        io_read_ms: outcome.io_read_ms,
        io_write_ms: outcome.io_write_ms,
        wall_ms: start.elapsed().as_millis() as u64,
    })
}

fn run_reduce_for<R: Reducer>(r: usize, sort_out_dir: &Path, reduce_out_dir: &Path, reducer: &R) -> Result<ReduceStats> {
    let reducer_start = Instant::now();
    let in_path = sort_out_dir.join(format!("reduce_in_part{}.bin", r));
    let file = fs::File::open(&in_path).with_context(|| format!("open {}", in_path.display()))?;
    let len = file.metadata().with_context(|| format!("stat {}", in_path.display()))?.len();
    // The sorted partition is private to this run and complete at this point.
    let map = if len > 0 { Some(unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", in_path.display()))?) } else { None };
    let bytes: &[u8] = map.as_deref().unwrap_or(&[]);

    let out_path = reduce_out_dir.join(part_file_name(r));
    let mut out_writer = open_writer(&out_path)?;

    let mut reduce_time = Duration::from_nanos(0);
    let mut write_time = Duration::from_nanos(0);
    let mut groups: u64 = 0;
    let mut lines_in: u64 = 0;
    let mut records_out: u64 = 0;
    let mut group_out: Vec<Pair> = Vec::new();

    let mut sorted = SortedGroups::new(bytes);
    while let Some((key, values)) = sorted.next_group().with_context(|| format!("read {}", in_path.display()))? {
        lines_in += values.len() as u64;
        group_out.clear();
        let reduce_start = Instant::now();
        // A failing group writes nothing.
        reducer
            .do_reduce(key, values.iter().copied(), &mut group_out)
            .with_context(|| format!("reduce key '{}' in partition {}", key, r))?;
        reduce_time += reduce_start.elapsed();
        groups += 1;

        let w_start = Instant::now();
        for pair in &group_out {
            write_tsv(&mut out_writer, &pair.key, &pair.value).with_context(|| format!("write {}", out_path.display()))?;
        }
        records_out += group_out.len() as u64;
        write_time += w_start.elapsed();
    }
    out_writer.flush().with_context(|| format!("flush {}", out_path.display()))?;

    Ok(ReduceStats {
        reducer: r as u64,
        lines_in,
        groups,
        records_out,
        reduce_ms: reduce_time.as_millis() as u64,
        write_ms: write_time.as_millis() as u64,
        wall_ms: reducer_start.elapsed().as_millis() as u64,
    })
}

pub fn part_file_name(r: usize) -> String {
    format!("part-{:05}.tsv", r)
}

/// Replaces `output_dir` with the reduced part files and a success marker.
fn commit_output(reduce_out_dir: &Path, output_dir: &Path, num_reducers: usize) -> Result<()> {
    if output_dir.exists() {
        fs::remove_dir_all(output_dir).with_context(|| format!("clear output {}", output_dir.display()))?;
    }
    ensure_dir(output_dir)?;
    for r in 0..num_reducers {
        let name = part_file_name(r);
        move_file(&reduce_out_dir.join(&name), &output_dir.join(&name))?;
    }
    fs::write(output_dir.join(SUCCESS_MARKER), b"").with_context(|| format!("write {} marker", SUCCESS_MARKER))?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn get_fd_soft_limit() -> Option<u64> {
    use libc::{getrlimit, rlimit, RLIMIT_NOFILE};
    let mut lim = rlimit { rlim_cur: 0, rlim_max: 0 };
    let rc = unsafe { getrlimit(RLIMIT_NOFILE, &mut lim as *mut rlimit) };
    if rc == 0 { Some(lim.rlim_cur as u64) } else { None }
}

#[cfg(not(target_os = "linux"))]
fn get_fd_soft_limit() -> Option<u64> { None }
