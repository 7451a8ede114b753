use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use crate::api::{Record, RecordSource};
use crate::errors::JobError;

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(path.as_ref()).with_context(|| format!("create_dir_all {}", path.as_ref().display()))
}

/// All regular files under `path` (or `path` itself), sorted. Files whose name
/// starts with `_` or `.` below the root are bookkeeping and skipped.
pub fn list_files_recursive(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path.as_ref()).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", path.as_ref().display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let hidden = entry.depth() > 0
            && entry.file_name().to_str().map_or(false, |n| n.starts_with('_') || n.starts_with('.'));
        if !hidden {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Line-oriented record source. Trailing `\n` / `\r\n` are stripped.
pub struct LineSource<R: BufRead> {
    lines: Lines<R>,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines() }
    }
}

impl<R: BufRead> RecordSource for LineSource<R> {
    fn next_record(&mut self) -> Option<Result<Record>> {
        self.lines.next().map(|l| l.map_err(anyhow::Error::from))
    }
}

pub fn read_lines(path: impl AsRef<Path>) -> Result<LineSource<BufReader<File>>> {
    Ok(LineSource::new(open_reader(path)?))
}

pub fn hash_to_partition(key: &str, num_partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    hasher.write(key.as_bytes());
    (hasher.finish() as usize) % num_partitions.max(1)
}

pub fn open_writer(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    if let Some(parent) = path.as_ref().parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(path.as_ref()).with_context(|| format!("create {}", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

pub fn open_reader(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    let file = File::open(path.as_ref()).with_context(|| format!("open {}", path.as_ref().display()))?;
    Ok(BufReader::new(file))
}

/// Final output line: `key<TAB>value`.
pub fn write_tsv<W: Write>(writer: &mut W, key: &str, value: &str) -> Result<()> {
    writeln!(writer, "{}\t{}", key, value)?;
    Ok(())
}

// Intermediate records are [klen u32 LE][vlen u32 LE][key][value], raw UTF-8,
// so comparing key/value byte slices gives natural string order.
pub const BIN_HEADER_LEN: usize = 8;

pub fn write_bin(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) -> Result<()> {
    let klen = u32::try_from(key.len()).map_err(|_| JobError::OversizedField(key.len()))?;
    let vlen = u32::try_from(value.len()).map_err(|_| JobError::OversizedField(value.len()))?;
    buf.extend_from_slice(&klen.to_le_bytes());
    buf.extend_from_slice(&vlen.to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    Ok(())
}

/// Reads the record starting at `off`, returning `(key, value, next_offset)`.
/// `Ok(None)` at end of input; a record cut short is an error.
pub fn read_bin_line(bytes: &[u8], off: usize) -> Result<Option<(&[u8], &[u8], usize)>> {
    if off >= bytes.len() {
        return Ok(None);
    }
    let truncated = || JobError::Truncated { offset: off, len: bytes.len() };
    if bytes.len() - off < BIN_HEADER_LEN {
        return Err(truncated().into());
    }
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&bytes[off..off + 4]);
    let klen = u32::from_le_bytes(len_buf) as usize;
    len_buf.copy_from_slice(&bytes[off + 4..off + 8]);
    let vlen = u32::from_le_bytes(len_buf) as usize;
    let key_start = off + BIN_HEADER_LEN;
    let end = key_start + klen + vlen;
    if end > bytes.len() {
        return Err(truncated().into());
    }
    Ok(Some((&bytes[key_start..key_start + klen], &bytes[key_start + klen..end], end)))
}

/// Moves `from` to `to`, copying when a rename is not possible (e.g. across
/// filesystems).
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).with_context(|| format!("copy {} -> {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("remove {}", from.display()))?;
    Ok(())
}
