//! Centralized environment variable names and default values for mapfold runtime tuning.

// Environment variable names
pub const ENV_KEEP_INTERMEDIATES: &str = "MAPFOLD_KEEP_INTERMEDIATES";
pub const ENV_RAYON_THREADS: &str = "MAPFOLD_RAYON_THREADS";
pub const ENV_NUM_REDUCERS: &str = "MAPFOLD_NUM_REDUCERS";
pub const ENV_FLUSH_BYTES: &str = "MAPFOLD_FLUSH_BYTES";
pub const ENV_FLUSH_INTERVAL_MS: &str = "MAPFOLD_FLUSH_INTERVAL_MS";
pub const ENV_WRITER_QUEUE_CAP: &str = "MAPFOLD_WRITER_QUEUE_CAP";
pub const ENV_LOCAL_BATCH_BYTES: &str = "MAPFOLD_LOCAL_BATCH_BYTES";
pub const ENV_LOCAL_TASKS: &str = "MAPFOLD_LOCAL_TASKS";
/// Root under which each job gets its private run directory
pub const ENV_WORK_DIR: &str = "MAPFOLD_WORK_DIR";

// Defaults
pub const DEFAULT_LOCAL_BATCH_BYTES: usize = 256 * 1024; // per partition, per map task
pub const DEFAULT_WRITER_QUEUE_CAP: usize = 1024;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 200;
pub const DEFAULT_FLUSH_BYTES: usize = 16 * 1024 * 1024; // 16 MiB
pub const DEFAULT_WORK_DIR: &str = ".mapfold_runs";

// Job defaults
/// Key every record is funnelled under by the pass-through mapper.
pub const DEFAULT_PASSTHROUGH_KEY: &str = "temp";
/// Label carried forward before any entry of a group has been seen.
pub const DEFAULT_INITIAL_LABEL: &str = "A";
pub const DEFAULT_TOKEN_WIDTH: usize = 10;
pub const DEFAULT_DOC_WIDTH: usize = 3;
/// Widest gap the fill-all reconciler closes before failing the group.
pub const DEFAULT_MAX_GAP: u64 = 1_000_000;

// Output layout
pub const SUCCESS_MARKER: &str = "_SUCCESS";
