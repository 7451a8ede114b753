pub mod api;
pub mod config;
pub mod constants;
pub mod errors;
pub mod io;
pub mod job;
pub mod mappers;
pub mod memory;
pub mod reducers;
pub mod runtime;
pub mod sort;
pub mod stats;
pub mod utils;
pub mod writer;

pub use api::{Emit, ExecutablePipeline, Mapper, MemorySource, Pair, Record, RecordSource, Reducer};
pub use config::RuntimeConfig;
pub use errors::JobError;
pub use job::{JobSpec, MapperKind, ReducerKind};
pub use mappers::{PassThroughMapper, TokenizingMapper};
pub use memory::run_in_memory;
pub use reducers::{FrequencyReducer, GapFillReducer, GapPolicy, SequenceEntry};
pub use runtime::RuntimePipeline;
pub use sort::{GroupedKey, ValueOrder};
pub use stats::JobStats;
