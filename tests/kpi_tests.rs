//! Integration tests for the KPI pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use im::OrdMap;
use parking_lot::Mutex;
use rust_online_trainer::core::{Actions, ExecutionResult, Result, Signals, Tensor, TrainerError};
use rust_online_trainer::kpi::{
    read_kpi_file, BinKpiWriter, CompletionGate, KpiFilter, KpiRecord, KpiSink, KpiWriter,
};

const WAIT: Duration = Duration::from_secs(5);

/// Records rewards; the first write blocks until released.
#[derive(Clone, Default)]
struct BlockingWriter {
    entered: CompletionGate,
    release: CompletionGate,
    rewards: Arc<Mutex<Vec<f32>>>,
    closes: Arc<AtomicUsize>,
}

impl KpiWriter for BlockingWriter {
    fn write(&mut self, record: &KpiRecord) -> Result<()> {
        self.entered.signal();
        self.release.wait();
        let reward = record.get("reward").and_then(Tensor::as_scalar).unwrap_or(f32::NAN);
        self.rewards.lock().push(reward);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails on the n-th write.
struct FailingWriter {
    remaining: usize,
    closes: Arc<AtomicUsize>,
}

impl KpiWriter for FailingWriter {
    fn write(&mut self, _record: &KpiRecord) -> Result<()> {
        if self.remaining == 0 {
            return Err(TrainerError::Kpi("disk full".to_string()));
        }
        self.remaining -= 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn reward(value: f32) -> KpiRecord {
    KpiRecord::new().with("reward", Tensor::scalar(value))
}

/// Start a sink whose writer is stuck on record 0.
fn stalled_sink(capacity: usize) -> (KpiSink, CompletionGate, BlockingWriter) {
    let writer = BlockingWriter::default();
    let (sink, gate) = KpiSink::spawn(capacity, writer.clone()).unwrap();
    sink.write(reward(0.0));
    assert!(writer.entered.wait_timeout(WAIT));
    (sink, gate, writer)
}

// =============================================================================
// Overflow
// =============================================================================

#[test]
fn test_full_queue_keeps_most_recent() {
    let (sink, gate, writer) = stalled_sink(3);

    for i in 1..=10 {
        sink.write(reward(i as f32));
    }

    let stats = sink.stats();
    assert_eq!(stats.pending, 3);
    assert_eq!(stats.dropped, 7);

    writer.release.signal();
    sink.close();
    assert!(gate.wait_timeout(WAIT));

    assert_eq!(*writer.rewards.lock(), vec![0.0, 8.0, 9.0, 10.0]);
    assert_eq!(sink.stats().written, 4);
}

#[test]
fn test_write_never_blocks_on_stalled_writer() {
    let (sink, gate, writer) = stalled_sink(1);

    // Would deadlock if write waited for room.
    for i in 0..1000 {
        sink.write(reward(i as f32));
    }
    assert_eq!(sink.stats().pending, 1);

    writer.release.signal();
    sink.close();
    assert!(gate.wait_timeout(WAIT));
}

#[test]
fn test_concurrent_producers() {
    let writer = BlockingWriter::default();
    writer.release.signal();
    let (sink, gate) = KpiSink::spawn(8, writer.clone()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let sink = sink.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    sink.write(reward(i as f32));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    sink.close();
    assert!(gate.wait_timeout(WAIT));

    // Every record is either persisted or counted as dropped.
    let stats = sink.stats();
    assert_eq!(stats.written + stats.dropped, 1000);
    assert_eq!(stats.pending, 0);
    assert_eq!(writer.rewards.lock().len() as u64, stats.written);
}

#[test]
fn test_contended_queue_keeps_a_final_record() {
    let (sink, gate, writer) = stalled_sink(1);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let sink = sink.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    sink.write(reward(i as f32));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every write was admitted; only older records were evicted.
    let stats = sink.stats();
    assert_eq!(stats.accepted, 401);
    assert_eq!(stats.dropped, 399);
    assert_eq!(stats.pending, 1);

    writer.release.signal();
    sink.close();
    assert!(gate.wait_timeout(WAIT));
    assert_eq!(*writer.rewards.lock(), vec![0.0, 99.0]);
}

// =============================================================================
// Close and abort
// =============================================================================

#[test]
fn test_close_is_idempotent() {
    let writer = BlockingWriter::default();
    writer.release.signal();
    let (sink, gate) = KpiSink::spawn(4, writer.clone()).unwrap();

    sink.write(reward(1.0));
    sink.close();
    sink.close();
    assert!(gate.wait_timeout(WAIT));
    sink.close();

    assert_eq!(writer.closes.load(Ordering::SeqCst), 1);
    assert_eq!(*writer.rewards.lock(), vec![1.0]);
}

#[test]
fn test_gate_waits_for_drain() {
    let (sink, gate, writer) = stalled_sink(4);
    sink.write(reward(1.0));
    sink.close();

    assert!(!gate.wait_timeout(Duration::from_millis(20)));

    writer.release.signal();
    assert!(gate.wait_timeout(WAIT));
    assert_eq!(*writer.rewards.lock(), vec![0.0, 1.0]);
}

#[test]
fn test_abort_discards_queued() {
    let (sink, gate, writer) = stalled_sink(3);
    for i in 1..=3 {
        sink.write(reward(i as f32));
    }

    sink.abort();
    writer.release.signal();
    assert!(gate.wait_timeout(WAIT));

    assert_eq!(*writer.rewards.lock(), vec![0.0]);
    assert_eq!(sink.stats().dropped, 3);
    assert_eq!(writer.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_write_error_ends_stream() {
    let closes = Arc::new(AtomicUsize::new(0));
    let writer = FailingWriter {
        remaining: 2,
        closes: Arc::clone(&closes),
    };
    let (sink, gate) = KpiSink::spawn(16, writer).unwrap();

    for i in 0..5 {
        sink.write(reward(i as f32));
    }
    assert!(gate.wait_timeout(WAIT));

    assert!(sink.is_closed());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(sink.stats().written, 2);

    let dropped = sink.stats().dropped;
    sink.write(reward(9.0));
    assert_eq!(sink.stats().dropped, dropped + 1);
}

// =============================================================================
// Binary files
// =============================================================================

fn result(reward: f64, action: i32) -> ExecutionResult {
    let s0: Signals = OrdMap::unit("pos".to_string(), Tensor::vector(vec![1.0, 2.0]));
    let actions: Actions = OrdMap::unit("move".to_string(), action);
    ExecutionResult::new(s0.clone(), actions, reward, s0)
}

#[test]
fn test_bin_files_through_sink() {
    let dir = tempfile::tempdir().unwrap();
    let writer = BinKpiWriter::from_labels(dir.path(), "batch").unwrap();
    let (sink, gate) = KpiSink::spawn(100, writer).unwrap();

    for i in 0..5 {
        sink.write(KpiRecord::from_result(&result(i as f64, i)));
    }
    sink.close();
    assert!(gate.wait_timeout(WAIT));

    let rewards = read_kpi_file(BinKpiWriter::key_path(dir.path(), "reward")).unwrap();
    let rewards: Vec<f32> = rewards.iter().filter_map(Tensor::as_scalar).collect();
    assert_eq!(rewards, vec![0.0, 1.0, 2.0, 3.0, 4.0]);

    let moves = read_kpi_file(BinKpiWriter::key_path(dir.path(), "actions.move")).unwrap();
    assert_eq!(moves.len(), 5);

    let positions = read_kpi_file(BinKpiWriter::key_path(dir.path(), "s0.pos")).unwrap();
    assert_eq!(positions[0], Tensor::vector(vec![1.0, 2.0]));
}

#[test]
fn test_bin_files_filtered() {
    let dir = tempfile::tempdir().unwrap();
    let filter = KpiFilter::from_patterns(["^reward$"]).unwrap();
    let writer = BinKpiWriter::create(dir.path(), filter).unwrap();
    let (sink, gate) = KpiSink::spawn(10, writer).unwrap();

    sink.write(KpiRecord::from_result(&result(1.0, 0)));
    sink.close();
    assert!(gate.wait_timeout(WAIT));

    assert!(BinKpiWriter::key_path(dir.path(), "reward").exists());
    assert!(!BinKpiWriter::key_path(dir.path(), "actions.move").exists());
    assert!(!BinKpiWriter::key_path(dir.path(), "s0.pos").exists());
}

#[test]
fn test_invalid_label_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let result = BinKpiWriter::from_labels(dir.path(), "reward,(");
    assert!(matches!(result, Err(TrainerError::Pattern(_))));
}
