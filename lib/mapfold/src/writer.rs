use anyhow::{anyhow, Context, Result};
use crossbeam_channel as channel;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::error;

// Spill writers for the map phase: one dedicated IO thread per partition
// file, fed by bounded channels for backpressure.
pub struct WriterPool {
    senders: Vec<channel::Sender<WriterMsg>>,
    metrics: Arc<Vec<PartitionCounters>>,
}

enum WriterMsg {
    Data(Vec<u8>),
    Close,
}

pub struct WriterJoiner {
    handles: Vec<thread::JoinHandle<Result<()>>>,
}

impl WriterJoiner {
    /// Waits for every writer thread and returns the first failure.
    pub fn join_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for h in self.handles.drain(..) {
            let res = h.join().unwrap_or_else(|_| Err(anyhow!("spill writer thread panicked")));
            if let Err(e) = res {
                error!("spill writer failed: {:#}", e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Path of the spill file written for `partition`.
pub fn spill_path(base_dir: &Path, partition: usize) -> PathBuf {
    base_dir.join(format!("task0_part{}.bin", partition))
}

impl WriterPool {
    pub fn new(base_dir: &Path, num_partitions: usize, flush_bytes: usize, flush_interval: Duration, queue_cap: usize) -> Result<(Self, WriterJoiner)> {
        crate::io::ensure_dir(base_dir)?;
        let mut senders = Vec::with_capacity(num_partitions);
        let mut handles = Vec::with_capacity(num_partitions);
        let metrics: Arc<Vec<PartitionCounters>> = Arc::new((0..num_partitions).map(|_| PartitionCounters::default()).collect());
        for part in 0..num_partitions {
            let (tx, rx) = channel::bounded::<WriterMsg>(queue_cap.max(1));
            let path = spill_path(base_dir, part);
            let metrics = Arc::clone(&metrics);
            let handle = thread::Builder::new()
                .name(format!("spill-writer-{}", part))
                .spawn(move || -> Result<()> {
                    let counters = &metrics[part];
                    let mut writer = crate::io::open_writer(&path)?;
                    let mut buf: Vec<u8> = Vec::with_capacity(flush_bytes.min(4 * 1024 * 1024));
                    let mut last_flush = Instant::now();
                    loop {
                        // Batch writes up to flush_bytes or flush_interval.
                        let timeout = flush_interval.saturating_sub(last_flush.elapsed());
                        let closing = match rx.recv_timeout(timeout) {
                            Ok(WriterMsg::Data(bytes)) => {
                                counters.queue_len.fetch_sub(1, Ordering::Relaxed);
                                buf.extend_from_slice(&bytes);
                                false
                            }
                            // A disconnected channel means every sender is gone: finish up.
                            Ok(WriterMsg::Close) | Err(channel::RecvTimeoutError::Disconnected) => true,
                            Err(channel::RecvTimeoutError::Timeout) => false,
                        };
                        let due_to_size = buf.len() >= flush_bytes;
                        let due_to_timer = !due_to_size && last_flush.elapsed() >= flush_interval;
                        if closing || due_to_size || due_to_timer {
                            if !buf.is_empty() {
                                writer.write_all(&buf).with_context(|| format!("write {}", path.display()))?;
                                counters.bytes_written.fetch_add(buf.len() as u64, Ordering::Relaxed);
                                counters.write_calls.fetch_add(1, Ordering::Relaxed);
                                buf.clear();
                            }
                            if due_to_size { counters.flush_by_size.fetch_add(1, Ordering::Relaxed); }
                            if due_to_timer { counters.flush_by_timer.fetch_add(1, Ordering::Relaxed); }
                            writer.flush().with_context(|| format!("flush {}", path.display()))?;
                            last_flush = Instant::now();
                        }
                        if closing {
                            return Ok(());
                        }
                    }
                })
                .context("spawn spill writer")?;
            senders.push(tx);
            handles.push(handle);
        }
        Ok((Self { senders, metrics }, WriterJoiner { handles }))
    }

    pub fn num_partitions(&self) -> usize {
        self.senders.len()
    }

    // Callers pass a chunk of encoded records for one partition. The pool takes
    // ownership, enqueues, and the IO thread handles batching and flush policy.
    pub fn write_chunk(&self, partition: usize, bytes: Vec<u8>) -> Result<()> {
        let counters = &self.metrics[partition];
        counters.enq_count.fetch_add(1, Ordering::Relaxed);
        let q = counters.queue_len.fetch_add(1, Ordering::Relaxed) + 1;
        counters.max_queue_len.fetch_max(q, Ordering::Relaxed);
        self.senders[partition]
            .send(WriterMsg::Data(bytes))
            .map_err(|_| anyhow!("spill writer for partition {} has stopped", partition))
    }

    pub fn close_all(&self) {
        for tx in &self.senders {
            let _ = tx.send(WriterMsg::Close);
        }
    }

    pub fn make_thread_writer(&self, local_batch_bytes: usize) -> ThreadWriter<'_> {
        ThreadWriter::new(self, local_batch_bytes)
    }

    pub fn metrics_snapshot(&self) -> Vec<WriterPartitionMetrics> {
        self.metrics
            .iter()
            .map(|c| WriterPartitionMetrics {
                max_queue_len: c.max_queue_len.load(Ordering::Relaxed),
                enq_count: c.enq_count.load(Ordering::Relaxed),
                flush_by_size: c.flush_by_size.load(Ordering::Relaxed),
                flush_by_timer: c.flush_by_timer.load(Ordering::Relaxed),
                bytes_written: c.bytes_written.load(Ordering::Relaxed),
                write_calls: c.write_calls.load(Ordering::Relaxed),
            })
            .collect()
    }
}

/// Per-map-task buffering in front of the pool. The first send failure is kept
/// and reported by [`ThreadWriter::finish`].
pub struct ThreadWriter<'a> {
    pool: &'a WriterPool,
    local_buffers: Vec<Vec<u8>>, // per-partition aggregation buffers
    batch_bytes: usize,
    flushes: u64,
    bytes_sent: u64,
    error: Option<anyhow::Error>,
}

impl<'a> ThreadWriter<'a> {
    fn new(pool: &'a WriterPool, batch_bytes: usize) -> Self {
        let local_buffers = (0..pool.num_partitions()).map(|_| Vec::new()).collect();
        Self { pool, local_buffers, batch_bytes, flushes: 0, bytes_sent: 0, error: None }
    }

    pub fn emit_record(&mut self, partition: usize, key: &[u8], value: &[u8]) {
        if self.error.is_some() {
            return;
        }
        let buf = &mut self.local_buffers[partition];
        if let Err(e) = crate::io::write_bin(buf, key, value) {
            self.error = Some(e);
            return;
        }
        if buf.len() >= self.batch_bytes {
            self.flush_partition(partition);
        }
    }

    fn flush_partition(&mut self, partition: usize) {
        let chunk = std::mem::take(&mut self.local_buffers[partition]);
        self.bytes_sent += chunk.len() as u64;
        self.flushes += 1;
        if let Err(e) = self.pool.write_chunk(partition, chunk) {
            self.error.get_or_insert(e);
        }
    }

    /// Flushes what is buffered and returns `(flushes, bytes_sent)`.
    pub fn finish(mut self) -> Result<(u64, u64)> {
        for p in 0..self.local_buffers.len() {
            if self.error.is_none() && !self.local_buffers[p].is_empty() {
                self.flush_partition(p);
            }
        }
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok((self.flushes, self.bytes_sent)),
        }
    }
}

#[derive(Default)]
struct PartitionCounters {
    queue_len: AtomicUsize,
    max_queue_len: AtomicUsize,
    enq_count: AtomicU64,
    flush_by_size: AtomicU64,
    flush_by_timer: AtomicU64,
    bytes_written: AtomicU64,
    write_calls: AtomicU64,
}

#[derive(Clone, Debug)]
pub struct WriterPartitionMetrics {
    pub max_queue_len: usize,
    pub enq_count: u64,
    pub flush_by_size: u64,
    pub flush_by_timer: u64,
    pub bytes_written: u64,
    pub write_calls: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::read_bin_line;

    #[test]
    fn chunks_from_several_threads_reach_their_partition_file() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, mut joiner) = WriterPool::new(dir.path(), 2, 1024, Duration::from_millis(5), 4).unwrap();

        std::thread::scope(|s| {
            for t in 0..3 {
                let pool = &pool;
                s.spawn(move || {
                    let mut w = pool.make_thread_writer(16);
                    for i in 0..10 {
                        let value = format!("{}-{}", t, i);
                        w.emit_record(i % 2, b"k", value.as_bytes());
                    }
                    w.finish().unwrap();
                });
            }
        });
        pool.close_all();
        joiner.join_all().unwrap();

        for part in 0..2 {
            let bytes = std::fs::read(spill_path(dir.path(), part)).unwrap();
            let mut off = 0;
            let mut n = 0;
            while let Some((_k, _v, next)) = read_bin_line(&bytes, off).unwrap() {
                off = next;
                n += 1;
            }
            assert_eq!(n, 15);
        }
        let written: u64 = pool.metrics_snapshot().iter().map(|m| m.bytes_written).sum();
        assert!(written > 0);
    }
}
