use anyhow::Result;

use crate::api::{Emit, Reducer};
use crate::constants::{DEFAULT_DOC_WIDTH, DEFAULT_TOKEN_WIDTH};
use crate::errors::JobError;

/// Sums the per-occurrence counts of a `"<doc id> <token>"` key and emits one
/// fixed-width record: token left-justified, document id right-justified,
/// followed by a comma.
#[derive(Clone, Copy, Debug)]
pub struct FrequencyReducer {
    token_width: usize,
    doc_width: usize,
}

impl Default for FrequencyReducer {
    fn default() -> Self {
        Self { token_width: DEFAULT_TOKEN_WIDTH, doc_width: DEFAULT_DOC_WIDTH }
    }
}

impl FrequencyReducer {
    pub fn new(token_width: usize, doc_width: usize) -> Self {
        Self { token_width, doc_width }
    }

    /// Output key for `token` in `doc_id`. Values wider than their field are
    /// kept whole.
    pub fn format_key(&self, token: &str, doc_id: &str) -> String {
        format!("{:<tw$}{:>dw$},", token, doc_id, tw = self.token_width, dw = self.doc_width)
    }
}

/// Splits a composite key back into `(doc_id, token)`.
pub fn split_token_key(key: &str) -> Result<(&str, &str), JobError> {
    match key.split_once(' ') {
        Some((doc_id, token)) if !token.is_empty() && !token.contains(' ') => Ok((doc_id, token)),
        _ => Err(JobError::MalformedKey { key: key.to_string() }),
    }
}

impl Reducer for FrequencyReducer {
    fn do_reduce<'a, I, E>(&self, key: &str, values: I, emit: &mut E) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
        E: Emit + ?Sized,
    {
        let (doc_id, token) = split_token_key(key)?;
        let mut sum: u64 = 0;
        for v in values {
            let n: u64 = v
                .trim()
                .parse()
                .map_err(|_| JobError::InvalidCount { key: key.to_string(), value: v.to_string() })?;
            sum = sum.checked_add(n).ok_or_else(|| JobError::CountOverflow { key: key.to_string() })?;
        }
        emit.emit(self.format_key(token, doc_id), sum.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Pair;

    #[test]
    fn sums_and_formats_fixed_width() {
        let mut out: Vec<Pair> = Vec::new();
        FrequencyReducer::default().do_reduce("7 the", ["1", "1"], &mut out).unwrap();
        assert_eq!(out, vec![Pair::new("the         7,", "2")]);
    }

    #[test]
    fn overflowing_sum_is_an_error() {
        let mut out: Vec<Pair> = Vec::new();
        let err = FrequencyReducer::default()
            .do_reduce("7 x", ["18446744073709551615", "1"], &mut out)
            .unwrap_err();
        assert_eq!(err.downcast_ref::<JobError>(), Some(&JobError::CountOverflow { key: "7 x".to_string() }));
        assert!(out.is_empty());
    }

    #[test]
    fn wide_fields_are_not_truncated() {
        let r = FrequencyReducer::default();
        assert_eq!(r.format_key("extraordinary", "1234"), "extraordinary1234,");
        assert_eq!(FrequencyReducer::new(4, 2).format_key("ab", "1"), "ab   1,");
    }

    #[test]
    fn key_splits_on_first_space() {
        assert_eq!(split_token_key("12 cat").unwrap(), ("12", "cat"));
        assert_eq!(split_token_key(" cat").unwrap(), ("", "cat"));
    }

    #[test]
    fn malformed_keys_are_fatal() {
        for bad in ["nospace", "7 ", "7 two words", ""] {
            let mut out: Vec<Pair> = Vec::new();
            let err = FrequencyReducer::default().do_reduce(bad, ["1"], &mut out).unwrap_err();
            assert!(matches!(err.downcast_ref::<JobError>(), Some(JobError::MalformedKey { .. })), "{bad}");
            assert!(out.is_empty());
        }
    }

    #[test]
    fn non_numeric_count_is_fatal() {
        let mut out: Vec<Pair> = Vec::new();
        let err = FrequencyReducer::default().do_reduce("7 cat", ["1", "one"], &mut out).unwrap_err();
        assert!(matches!(err.downcast_ref::<JobError>(), Some(JobError::InvalidCount { .. })));
        assert!(out.is_empty());
    }
}
