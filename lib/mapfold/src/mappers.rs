//! The two record mappers: a pass-through funnel and a document tokenizer.

use anyhow::Result;
use memchr::memchr;
use tracing::debug;

use crate::api::{Emit, Mapper};
use crate::constants::DEFAULT_PASSTHROUGH_KEY;

/// Emits every record unchanged under one constant key, so the whole input
/// lands in a single group.
#[derive(Clone, Debug)]
pub struct PassThroughMapper {
    key: String,
}

impl PassThroughMapper {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for PassThroughMapper {
    fn default() -> Self {
        Self::new(DEFAULT_PASSTHROUGH_KEY)
    }
}

impl Mapper for PassThroughMapper {
    fn do_map<E>(&self, record: &str, emit: &mut E) -> Result<()>
    where
        E: Emit + ?Sized,
    {
        emit.emit(self.key.clone(), record.to_string());
        Ok(())
    }
}

/// Splits `"<doc id>,<sentence>"` and emits `("<doc id> <token>", "1")` for
/// every whitespace-separated token. Records without a comma are dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenizingMapper;

impl Mapper for TokenizingMapper {
    fn do_map<E>(&self, record: &str, emit: &mut E) -> Result<()>
    where
        E: Emit + ?Sized,
    {
        let Some(idx) = memchr(b',', record.as_bytes()) else {
            debug!(record, "skipping record without document id separator");
            return Ok(());
        };
        let (doc_id, sentence) = (&record[..idx], &record[idx + 1..]);
        for token in sentence.split_ascii_whitespace() {
            emit.emit(format!("{} {}", doc_id, token), "1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Pair;

    fn map_one<M: Mapper>(mapper: &M, record: &str) -> Vec<Pair> {
        let mut out = Vec::new();
        mapper.do_map(record, &mut out).unwrap();
        out
    }

    #[test]
    fn pass_through_uses_constant_key() {
        let out = map_one(&PassThroughMapper::default(), "3,C");
        assert_eq!(out, vec![Pair::new("temp", "3,C")]);
        let out = map_one(&PassThroughMapper::new("doc"), "");
        assert_eq!(out, vec![Pair::new("doc", "")]);
    }

    #[test]
    fn tokenizer_emits_one_pair_per_token() {
        let out = map_one(&TokenizingMapper, "7,the cat  the\tsat");
        let keys: Vec<&str> = out.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["7 the", "7 cat", "7 the", "7 sat"]);
        assert!(out.iter().all(|p| p.value == "1"));
    }

    #[test]
    fn tokenizer_splits_on_first_comma_only() {
        let out = map_one(&TokenizingMapper, "12,a,b c");
        assert_eq!(out, vec![Pair::new("12 a,b", "1"), Pair::new("12 c", "1")]);
    }

    #[test]
    fn tokenizer_drops_records_without_separator() {
        assert!(map_one(&TokenizingMapper, "no separator here").is_empty());
        assert!(map_one(&TokenizingMapper, "").is_empty());
    }

    #[test]
    fn empty_sentence_emits_nothing() {
        assert!(map_one(&TokenizingMapper, "7,   ").is_empty());
    }
}
