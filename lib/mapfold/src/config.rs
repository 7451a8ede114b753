use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;
use crate::utils::{env_parse, env_var_truthy};

/// Tuning knobs for [`crate::RuntimePipeline`].
///
/// `Default` uses built-in defaults only; [`RuntimeConfig::from_env`] layers
/// the `MAPFOLD_*` environment variables on top.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Number of parallel map tasks (input files are dealt round-robin).
    pub local_tasks: usize,
    /// Number of reduce partitions. `None` means one per map task.
    pub num_reducers: Option<usize>,
    /// Size of the rayon pool the job runs in. `None` uses rayon's default.
    pub rayon_threads: Option<usize>,
    pub keep_intermediates: bool,
    pub flush_bytes: usize,
    pub flush_interval: Duration,
    pub writer_queue_cap: usize,
    pub local_batch_bytes: usize,
    pub work_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            local_tasks: num_cpus::get().max(1),
            num_reducers: None,
            rayon_threads: None,
            keep_intermediates: false,
            flush_bytes: DEFAULT_FLUSH_BYTES,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            writer_queue_cap: DEFAULT_WRITER_QUEUE_CAP,
            local_batch_bytes: DEFAULT_LOCAL_BATCH_BYTES,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = env_parse::<usize>(ENV_LOCAL_TASKS) {
            cfg.local_tasks = n.max(1);
        }
        cfg.num_reducers = env_parse::<usize>(ENV_NUM_REDUCERS).filter(|&n| n > 0);
        cfg.rayon_threads = env_parse::<usize>(ENV_RAYON_THREADS).filter(|&n| n > 0);
        cfg.keep_intermediates = env_var_truthy(ENV_KEEP_INTERMEDIATES);
        if let Some(n) = env_parse::<usize>(ENV_FLUSH_BYTES) {
            cfg.flush_bytes = n;
        }
        if let Some(ms) = env_parse::<u64>(ENV_FLUSH_INTERVAL_MS) {
            cfg.flush_interval = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>(ENV_WRITER_QUEUE_CAP) {
            cfg.writer_queue_cap = n.max(1);
        }
        if let Some(n) = env_parse::<usize>(ENV_LOCAL_BATCH_BYTES) {
            cfg.local_batch_bytes = n;
        }
        if let Ok(dir) = std::env::var(ENV_WORK_DIR) {
            if !dir.is_empty() {
                cfg.work_dir = PathBuf::from(dir);
            }
        }
        cfg
    }

    pub fn with_local_tasks(mut self, n: usize) -> Self {
        self.local_tasks = n.max(1);
        self
    }

    pub fn with_num_reducers(mut self, n: usize) -> Self {
        self.num_reducers = Some(n.max(1));
        self
    }

    pub fn with_rayon_threads(mut self, n: usize) -> Self {
        self.rayon_threads = Some(n.max(1));
        self
    }

    pub fn with_keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_local_batch_bytes(mut self, n: usize) -> Self {
        self.local_batch_bytes = n;
        self
    }

    /// Map tasks actually used for `num_files` inputs.
    pub fn effective_tasks(&self, num_files: usize) -> usize {
        self.local_tasks.max(1).min(num_files.max(1))
    }

    pub fn effective_reducers(&self, tasks: usize) -> usize {
        self.num_reducers.unwrap_or(tasks).max(1)
    }
}
