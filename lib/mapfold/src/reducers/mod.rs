pub mod frequency;
pub mod gap_fill;

pub use frequency::FrequencyReducer;
pub use gap_fill::{GapFillReducer, GapPolicy, SequenceEntry};
