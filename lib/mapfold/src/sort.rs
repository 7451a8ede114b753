use crate::api::Pair;
use crate::io::{read_bin_line, BIN_HEADER_LEN};
use anyhow::{Context, Result};
use memchr::memchr;
use memmap2::Mmap;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

/// How values are ordered inside a group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueOrder {
    /// Natural order of the raw value text. `"10,x"` sorts before `"2,y"`.
    #[default]
    Lexicographic,
    /// By the integer before the first comma; ties and unparsable values fall
    /// back to raw text, with unparsable values first.
    NumericIndex,
}

impl ValueOrder {
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            ValueOrder::Lexicographic => a.cmp(b),
            ValueOrder::NumericIndex => (leading_index(a), a).cmp(&(leading_index(b), b)),
        }
    }
}

fn leading_index(value: &[u8]) -> Option<u64> {
    let end = memchr(b',', value).unwrap_or(value.len());
    parse_index(&value[..end])
}

/// Parses a sequence index written as plain ASCII digits. Signs, blanks and
/// anything `u64::from_str` would otherwise tolerate are rejected.
pub fn parse_index(digits: &[u8]) -> Option<u64> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// A key with all of its values, in shuffle order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupedKey {
    pub key: String,
    pub values: Vec<String>,
}

/// Groups the complete pair multiset by key. Keys come out in natural string
/// order, values ordered by `order` within each key.
pub fn group_and_sort(mut pairs: Vec<Pair>, order: ValueOrder) -> Vec<GroupedKey> {
    pairs.par_sort_unstable_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then_with(|| order.compare(a.value.as_bytes(), b.value.as_bytes()))
    });

    let mut groups: Vec<GroupedKey> = Vec::new();
    for Pair { key, value } in pairs {
        match groups.last_mut() {
            Some(g) if g.key == key => g.values.push(value),
            _ => groups.push(GroupedKey { key, values: vec![value] }),
        }
    }
    groups
}

#[derive(Clone, Debug, Default)]
pub struct SortOutcome {
    pub input_files: u64,
    pub lines_in: u64,
    pub bytes_in: u64,
    pub sort_only_ms: u64,
    pub io_read_ms: u64,
    pub io_write_ms: u64,
}

// Given the spill files of one partition, produce a single file sorted by key,
// then by value under `order`. Intermediate format is binary records: [klen][vlen][k][v]
pub fn external_sort_by_key(input_paths: &[impl AsRef<Path>], out_path: &Path, order: ValueOrder) -> Result<SortOutcome> {
    // Mmap each input file and build record index: (file_idx, start, key_end, end)
    let mut file_maps: Vec<Mmap> = Vec::new();
    let mut all_lines: Vec<(usize, usize, usize, usize)> = Vec::new();
    let mut bytes_in: u64 = 0;
    let mut lines_in: u64 = 0;
    let mut io_read = Duration::from_nanos(0);

    for p in input_paths {
        let p = p.as_ref();
        let file = std::fs::File::open(p).with_context(|| format!("open {}", p.display()))?;
        let meta_len = file.metadata().with_context(|| format!("stat {}", p.display()))?.len();
        if meta_len == 0 {
            continue;
        }
        bytes_in += meta_len;
        let read_start = Instant::now();
        // Spill files belong to this run and are no longer written to.
        let map = unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", p.display()))?;
        let file_idx = file_maps.len();
        let mut off = 0usize;
        while let Some((k, _v, next)) = read_bin_line(&map, off).with_context(|| format!("read {}", p.display()))? {
            let key_end = off + BIN_HEADER_LEN + k.len();
            all_lines.push((file_idx, off, key_end, next));
            lines_in += 1;
            off = next;
        }
        file_maps.push(map);
        io_read += read_start.elapsed();
    }

    let sort_only_start = Instant::now();
    all_lines.par_sort_unstable_by(|a, b| {
        let (fia, sa, ka, ea) = *a;
        let (fib, sb, kb, eb) = *b;
        // Keys are at [s+8..k] because [s..s+8) holds the lengths; values follow the key
        file_maps[fia][(sa + BIN_HEADER_LEN)..ka]
            .cmp(&file_maps[fib][(sb + BIN_HEADER_LEN)..kb])
            .then_with(|| order.compare(&file_maps[fia][ka..ea], &file_maps[fib][kb..eb]))
    });
    let sort_only_ms = sort_only_start.elapsed().as_millis() as u64;

    let io_write_start = Instant::now();
    let file = std::fs::File::create(out_path).with_context(|| format!("create {}", out_path.display()))?;
    let mut w = std::io::BufWriter::with_capacity(4 * 1024 * 1024, file);
    for &(fi, s, _k, e) in &all_lines {
        w.write_all(&file_maps[fi][s..e]).with_context(|| format!("write {}", out_path.display()))?;
    }
    w.flush().with_context(|| format!("flush {}", out_path.display()))?;
    let io_write_ms = io_write_start.elapsed().as_millis() as u64;

    Ok(SortOutcome {
        input_files: input_paths.len() as u64,
        lines_in,
        bytes_in,
        sort_only_ms,
        io_read_ms: io_read.as_millis() as u64,
        io_write_ms,
    })
}

/// Iterates the groups of a sorted intermediate buffer, borrowing keys and
/// values from it. Stops with an error on a truncated record or non UTF-8 text.
pub struct SortedGroups<'a> {
    bytes: &'a [u8],
    off: usize,
}

impl<'a> SortedGroups<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, off: 0 }
    }

    fn peek(&self) -> Result<Option<(&'a str, &'a str, usize)>> {
        let Some((k, v, next)) = read_bin_line(self.bytes, self.off)? else { return Ok(None) };
        let key = std::str::from_utf8(k).context("intermediate key is not UTF-8")?;
        let value = std::str::from_utf8(v).context("intermediate value is not UTF-8")?;
        Ok(Some((key, value, next)))
    }

    pub fn next_group(&mut self) -> Result<Option<(&'a str, Vec<&'a str>)>> {
        let Some((key, value, next)) = self.peek()? else { return Ok(None) };
        self.off = next;
        let mut values = vec![value];
        while let Some((k, v, next)) = self.peek()? {
            if k != key {
                break;
            }
            values.push(v);
            self.off = next;
        }
        Ok(Some((key, values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::write_bin;

    fn pairs(raw: &[(&str, &str)]) -> Vec<Pair> {
        raw.iter().map(|(k, v)| Pair::new(*k, *v)).collect()
    }

    #[test]
    fn groups_by_key_in_key_order() {
        let groups = group_and_sort(
            pairs(&[("b", "2"), ("a", "1"), ("b", "1"), ("a", "0")]),
            ValueOrder::Lexicographic,
        );
        assert_eq!(
            groups,
            vec![
                GroupedKey { key: "a".into(), values: vec!["0".into(), "1".into()] },
                GroupedKey { key: "b".into(), values: vec!["1".into(), "2".into()] },
            ]
        );
    }

    #[test]
    fn lexicographic_order_puts_ten_before_two() {
        let groups = group_and_sort(pairs(&[("K", "2,y"), ("K", "10,x"), ("K", "1,a")]), ValueOrder::Lexicographic);
        assert_eq!(groups[0].values, vec!["1,a", "10,x", "2,y"]);
    }

    #[test]
    fn numeric_order_sorts_by_index() {
        let groups = group_and_sort(
            pairs(&[("K", "2,y"), ("K", "10,x"), ("K", "1,a"), ("K", "bad")]),
            ValueOrder::NumericIndex,
        );
        assert_eq!(groups[0].values, vec!["bad", "1,a", "2,y", "10,x"]);
    }

    #[test]
    fn index_must_be_plain_digits() {
        assert_eq!(parse_index(b"42"), Some(42));
        assert_eq!(parse_index(b"007"), Some(7));
        for bad in [&b""[..], b"+3", b"-3", b" 3", b"3 ", b"1_000", b"99999999999999999999"] {
            assert_eq!(parse_index(bad), None, "{:?}", String::from_utf8_lossy(bad));
        }
        // A signed index counts as unparsable and sorts with the other junk.
        let groups = group_and_sort(pairs(&[("K", "2,y"), ("K", "+3,x")]), ValueOrder::NumericIndex);
        assert_eq!(groups[0].values, vec!["+3,x", "2,y"]);
    }

    #[test]
    fn sorting_is_idempotent() {
        let once = group_and_sort(pairs(&[("K", "3,c"), ("J", "1,a"), ("K", "1,a"), ("K", "3,b")]), ValueOrder::Lexicographic);
        let flattened: Vec<Pair> = once
            .iter()
            .flat_map(|g| g.values.iter().map(move |v| Pair::new(g.key.clone(), v.clone())))
            .collect();
        let twice = group_and_sort(flattened, ValueOrder::Lexicographic);
        assert_eq!(once, twice);
    }

    #[test]
    fn external_sort_matches_in_memory_grouping() {
        let dir = tempfile::tempdir().unwrap();
        let raw = [("K2", "3,C"), ("K1", "1,A"), ("K2", "1,A"), ("K1", "3,C"), ("K1", "10,Z")];
        let mut first = Vec::new();
        let mut second = Vec::new();
        for (i, (k, v)) in raw.iter().enumerate() {
            let buf = if i % 2 == 0 { &mut first } else { &mut second };
            write_bin(buf, k.as_bytes(), v.as_bytes()).unwrap();
        }
        let a = dir.path().join("task0_part0.bin");
        let b = dir.path().join("task1_part0.bin");
        let empty = dir.path().join("task2_part0.bin");
        std::fs::write(&a, &first).unwrap();
        std::fs::write(&b, &second).unwrap();
        std::fs::write(&empty, b"").unwrap();

        let out = dir.path().join("sorted.bin");
        let outcome = external_sort_by_key(&[a, b, empty], &out, ValueOrder::Lexicographic).unwrap();
        assert_eq!(outcome.lines_in, 5);

        let bytes = std::fs::read(&out).unwrap();
        let mut groups = SortedGroups::new(&bytes);
        let mut seen = Vec::new();
        while let Some((k, vs)) = groups.next_group().unwrap() {
            seen.push(GroupedKey { key: k.to_string(), values: vs.iter().map(|v| v.to_string()).collect() });
        }
        assert_eq!(seen, group_and_sort(pairs(&raw), ValueOrder::Lexicographic));
    }
}
