//! Bounded, non-blocking KPI sink.
//!
//! Producers (the acting loop and the training runner) push records into
//! a bounded crossbeam channel drained by a dedicated `kpi-writer`
//! thread. `write()` must never block:
//!
//! - When the queue is full the oldest queued record is dropped to admit
//!   the newest one (recency over completeness). Under contention a
//!   producer keeps evicting until its record is admitted, so every record
//!   written before `close()` is accepted.
//! - After `close()`, or once the writer has stopped, records are counted
//!   as dropped.
//!
//! On close the writer drains what is still queued, closes its backing
//! store exactly once and signals the completion gate. A write error ends
//! the stream the same way.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use tracing::{error, info, trace, warn};

use super::gate::CompletionGate;
use super::record::KpiRecord;
use super::writer::KpiWriter;
use crate::core::{Result, TrainerError};

#[derive(Debug, Default)]
struct SinkCounters {
    accepted: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
    stopped: AtomicBool,
    aborted: AtomicBool,
}

impl SinkCounters {
    fn drop_one(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Sink statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Records admitted into the queue.
    pub accepted: u64,
    /// Records persisted by the writer.
    pub written: u64,
    /// Records discarded (overflow, closed sink, stopped writer).
    pub dropped: u64,
    /// Records currently queued.
    pub pending: usize,
}

impl SinkStats {
    /// Fraction of produced records that were dropped.
    pub fn drop_rate(&self) -> f64 {
        let produced = self.accepted + self.dropped;
        if produced == 0 {
            0.0
        } else {
            self.dropped as f64 / produced as f64
        }
    }
}

/// Producer handle of the KPI pipeline. Cheap to clone.
#[derive(Clone)]
pub struct KpiSink {
    records: Sender<KpiRecord>,
    oldest: Receiver<KpiRecord>,
    close_signal: Sender<()>,
    counters: Arc<SinkCounters>,
    capacity: usize,
}

impl KpiSink {
    /// Start the writer thread behind a queue of `capacity` records.
    ///
    /// Returns the sink and the gate signaled once the writer has closed.
    pub fn spawn<W: KpiWriter>(capacity: usize, writer: W) -> Result<(Self, CompletionGate)> {
        if capacity == 0 {
            return Err(TrainerError::Config(
                "kpi buffer capacity must be positive".to_string(),
            ));
        }
        let (records, queue) = bounded(capacity);
        let (close_signal, close) = bounded(1);
        let counters = Arc::new(SinkCounters::default());
        let gate = CompletionGate::new();

        let task = KpiWriterTask {
            queue: queue.clone(),
            close,
            writer,
            counters: Arc::clone(&counters),
            gate: gate.clone(),
        };
        thread::Builder::new()
            .name("kpi-writer".to_string())
            .spawn(move || task.run())
            .map_err(|source| TrainerError::Spawn {
                name: "kpi-writer",
                source,
            })?;

        info!(capacity, "KPI sink started");
        let sink = Self {
            records,
            oldest: queue,
            close_signal,
            counters,
            capacity,
        };
        Ok((sink, gate))
    }

    /// Queue a record. Never blocks.
    pub fn write(&self, record: KpiRecord) {
        if self.counters.closed.load(Ordering::Acquire) || self.counters.stopped.load(Ordering::Acquire) {
            self.counters.drop_one();
            trace!("KPI sink closed, record dropped");
            return;
        }

        let mut record = record;
        loop {
            match self.records.try_send(record) {
                Ok(()) => {
                    self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(TrySendError::Full(rejected)) => {
                    // Evict until this record fits.
                    if self.oldest.try_recv().is_ok() {
                        self.counters.drop_one();
                        trace!("KPI queue full, oldest record dropped");
                    }
                    record = rejected;
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.counters.drop_one();
                    return;
                }
            }
        }
    }

    /// Close the upstream. The writer drains the queue and then stops.
    ///
    /// Idempotent; the completion gate fires once the writer is done.
    pub fn close(&self) {
        if !self.counters.closed.swap(true, Ordering::AcqRel) {
            info!("Closing KPI sink");
        }
        let _ = self.close_signal.try_send(());
    }

    /// Close the upstream and discard whatever is still queued.
    pub fn abort(&self) {
        self.counters.aborted.store(true, Ordering::Release);
        self.close();
    }

    /// Check whether the sink refuses new records.
    pub fn is_closed(&self) -> bool {
        self.counters.closed.load(Ordering::Acquire) || self.counters.stopped.load(Ordering::Acquire)
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current statistics.
    pub fn stats(&self) -> SinkStats {
        SinkStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            pending: self.records.len(),
        }
    }
}

impl std::fmt::Debug for KpiSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KpiSink")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Consumer side, owned by the writer thread.
struct KpiWriterTask<W> {
    queue: Receiver<KpiRecord>,
    close: Receiver<()>,
    writer: W,
    counters: Arc<SinkCounters>,
    gate: CompletionGate,
}

impl<W: KpiWriter> KpiWriterTask<W> {
    fn run(mut self) {
        let outcome = self.pump();
        self.counters.stopped.store(true, Ordering::Release);
        if let Err(e) = &outcome {
            error!(error = %e, "KPI write failed, closing kpi stream");
        }
        if let Err(e) = self.writer.close() {
            error!(error = %e, "Error closing kpi writer");
        }
        info!(
            written = self.counters.written.load(Ordering::Relaxed),
            dropped = self.counters.dropped.load(Ordering::Relaxed),
            "KPI writer stopped"
        );
        self.gate.signal();
    }

    fn pump(&mut self) -> Result<()> {
        let queue = self.queue.clone();
        let close = self.close.clone();
        loop {
            select! {
                recv(queue) -> msg => match msg {
                    Ok(_) if self.is_aborted() => {
                        self.discard(1);
                        return self.drain();
                    }
                    Ok(record) => self.persist(&record)?,
                    // Every producer handle is gone.
                    Err(_) => return Ok(()),
                },
                recv(close) -> _ => return self.drain(),
            }
        }
    }

    fn drain(&mut self) -> Result<()> {
        while let Ok(record) = self.queue.try_recv() {
            if self.is_aborted() {
                let discarded = 1 + self.queue.try_iter().count() as u64;
                self.discard(discarded);
                warn!(discarded, "KPI sink aborted, queued records discarded");
                return Ok(());
            }
            self.persist(&record)?;
        }
        Ok(())
    }

    fn is_aborted(&self) -> bool {
        self.counters.aborted.load(Ordering::Acquire)
    }

    fn discard(&self, count: u64) {
        self.counters.dropped.fetch_add(count, Ordering::Relaxed);
    }

    fn persist(&mut self, record: &KpiRecord) -> Result<()> {
        self.writer.write(record)?;
        self.counters.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
