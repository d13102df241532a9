//! KPI (telemetry) pipeline.
//!
//! ## Overview
//!
//! - **KpiRecord**: named tensors produced per interaction or training pass
//! - **KpiSink**: bounded drop-oldest queue feeding a writer thread
//! - **CompletionGate**: fires once the writer has drained and closed
//! - **KpiFilter**: label-based key selection
//! - **BinKpiWriter**: one bincode file per selected key
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rust_online_trainer::kpi::{BinKpiWriter, KpiRecord, KpiSink};
//!
//! let writer = BinKpiWriter::from_labels("kpis", "default")?;
//! let (sink, gate) = KpiSink::spawn(1000, writer)?;
//!
//! sink.write(KpiRecord::from_result(&result)); // never blocks
//!
//! sink.close();
//! gate.wait();
//! ```

pub mod filter;
pub mod gate;
pub mod record;
pub mod sink;
pub mod writer;

pub use filter::{KpiFilter, ANALYSIS_KPIS, BATCH_KPIS};
pub use gate::CompletionGate;
pub use record::KpiRecord;
pub use sink::{KpiSink, SinkStats};
pub use writer::{read_kpi_file, BinKpiWriter, KpiWriter};
