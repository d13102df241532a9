//! KPI persistence backends.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use super::filter::KpiFilter;
use super::record::KpiRecord;
use crate::core::{Result, Tensor, TrainerError};

/// Destination of KPI records, driven by the sink's writer thread.
///
/// `close` is called exactly once, after the last `write`.
pub trait KpiWriter: Send + 'static {
    /// Persist one record.
    fn write(&mut self, record: &KpiRecord) -> Result<()>;

    /// Flush and release the backing store.
    fn close(&mut self) -> Result<()>;
}

impl<W: KpiWriter + ?Sized> KpiWriter for Box<W> {
    fn write(&mut self, record: &KpiRecord) -> Result<()> {
        (**self).write(record)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Writes each selected KPI key to its own file, `<dir>/<key>.bin`.
///
/// Every record appends one bincode-encoded [`Tensor`] to the file of
/// each selected key. Files are truncated when first opened.
pub struct BinKpiWriter {
    dir: PathBuf,
    filter: KpiFilter,
    files: FxHashMap<String, BufWriter<File>>,
    closed: bool,
}

impl BinKpiWriter {
    /// Create a writer under `dir`, creating the directory if needed.
    pub fn create(dir: impl Into<PathBuf>, filter: KpiFilter) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            filter,
            files: FxHashMap::default(),
            closed: false,
        })
    }

    /// Create a writer selecting keys by label string.
    pub fn from_labels(dir: impl Into<PathBuf>, labels: &str) -> Result<Self> {
        Self::create(dir, KpiFilter::from_labels(labels)?)
    }

    /// Path of the file holding a key.
    pub fn key_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{key}.bin"))
    }

    /// Directory receiving the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&mut self, key: &str) -> Result<&mut BufWriter<File>> {
        if !self.files.contains_key(key) {
            let path = Self::key_path(&self.dir, key);
            debug!(key, path = %path.display(), "Opening kpi file");
            let file = File::create(&path)?;
            self.files.insert(key.to_string(), BufWriter::new(file));
        }
        self.files
            .get_mut(key)
            .ok_or_else(|| TrainerError::Kpi(format!("missing file for \"{key}\"")))
    }
}

impl KpiWriter for BinKpiWriter {
    fn write(&mut self, record: &KpiRecord) -> Result<()> {
        if self.closed {
            return Err(TrainerError::Kpi("writer closed".to_string()));
        }
        for (key, value) in record.iter() {
            if !self.filter.matches(key) {
                continue;
            }
            let file = self.file_for(key)?;
            bincode::serialize_into(file, value)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut first_error = None;
        for (_, mut file) in self.files.drain() {
            if let Err(e) = file.flush() {
                first_error.get_or_insert(e);
            }
        }
        info!(dir = %self.dir.display(), "Closed kpi files");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Read back every tensor written to a KPI file.
pub fn read_kpi_file(path: impl AsRef<Path>) -> Result<Vec<Tensor>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut tensors = Vec::new();
    loop {
        match bincode::deserialize_from::<_, Tensor>(&mut reader) {
            Ok(tensor) => tensors.push(tensor),
            Err(e) => {
                if let bincode::ErrorKind::Io(io) = e.as_ref() {
                    if io.kind() == ErrorKind::UnexpectedEof {
                        break;
                    }
                }
                return Err(e.into());
            }
        }
    }
    Ok(tensors)
}
