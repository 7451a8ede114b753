use thiserror::Error;

/// Fatal conditions raised by mappers, reducers and the intermediate codec.
///
/// These travel inside `anyhow::Error`; callers that need to tell them apart
/// use `err.downcast_ref::<JobError>()`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("invalid sequence entry '{value}': {reason}")]
    InvalidEntry { value: String, reason: String },
    #[error("malformed key '{key}': expected '<document id> <token>'")]
    MalformedKey { key: String },
    #[error("invalid count '{value}' for key '{key}'")]
    InvalidCount { key: String, value: String },
    #[error("count overflow while summing key '{key}'")]
    CountOverflow { key: String },
    #[error("gap after index {from} up to {to} in key '{key}' exceeds {max} fillers")]
    GapTooLarge { key: String, from: u64, to: u64, max: u64 },
    #[error("truncated intermediate record at byte {offset} of {len}")]
    Truncated { offset: usize, len: usize },
    #[error("record field of {0} bytes does not fit the intermediate format")]
    OversizedField(usize),
}
