//! Append-only binary store for fixed-width embedding records.
//!
//! A store file is a raw slab of little-endian `f32` values: record `k`
//! occupies bytes `[k * dims * 4, (k + 1) * dims * 4)`. There is no header;
//! the file is fully described by its fingerprinted name and the configured
//! dimensionality, and a record is identified solely by its ordinal. Appends
//! are flushed per record so a crash can lose at most the partially written
//! tail, which [`recover`] truncates back to the last complete record.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, SemweaveError};

const ELEM_BYTES: u64 = 4;

fn record_bytes(dims: usize) -> u64 {
    dims as u64 * ELEM_BYTES
}

/// Row-major dense matrix of embedding records.
#[derive(Clone, Debug)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    dims: usize,
    rows: usize,
}

impl EmbeddingMatrix {
    /// Preallocates a zeroed matrix of `rows` records.
    pub fn zeroed(rows: usize, dims: usize) -> Self {
        Self {
            data: vec![0.0; rows * dims],
            dims,
            rows,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let base = index * self.dims;
        &self.data[base..base + self.dims]
    }

    pub fn set_row(&mut self, index: usize, values: &[f32]) {
        let base = index * self.dims;
        self.data[base..base + self.dims].copy_from_slice(values);
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.rows).map(|i| self.row(i))
    }

    /// Drops rows past `rows`; used when a reader finds fewer records than
    /// expected because another run is still appending.
    pub fn truncate_rows(&mut self, rows: usize) {
        if rows < self.rows {
            self.rows = rows;
            self.data.truncate(rows * self.dims);
        }
    }
}

/// Number of complete records in the store at `path`.
///
/// A missing file counts as zero records. A byte length that is not a whole
/// number of records is reported as [`SemweaveError::CorruptStore`]; callers
/// on the write path should go through [`recover`] instead of accepting it.
pub fn count(path: &Path, dims: usize) -> Result<usize> {
    let record = record_bytes(dims);
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    if len % record != 0 {
        return Err(SemweaveError::CorruptStore {
            path: path.to_path_buf(),
            len,
            record,
        });
    }
    Ok((len / record) as usize)
}

/// Truncates a partially written trailing record, returning the number of
/// complete records that remain.
///
/// This is the recovery policy for a crash mid-append: the partial tail is
/// never accepted as data, and never surfaced to the caller as an error.
pub fn recover(path: &Path, dims: usize) -> Result<usize> {
    let record = record_bytes(dims);
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    let remainder = len % record;
    if remainder != 0 {
        let keep = len - remainder;
        warn!(
            path = %path.display(),
            bytes_dropped = remainder,
            records_kept = keep / record,
            "truncating partial trailing record in embedding store"
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(keep)?;
        file.sync_all()?;
    }
    count(path, dims)
}

/// Reads existing records into a preallocated matrix of `expected` rows.
///
/// Returns the matrix together with the number of ordinals actually present,
/// which is where a resumed run continues appending. Records beyond
/// `expected` are ignored.
pub fn read_all(path: &Path, dims: usize, expected: usize) -> Result<(EmbeddingMatrix, usize)> {
    let mut matrix = EmbeddingMatrix::zeroed(expected, dims);
    let present = count(path, dims)?.min(expected);
    if present == 0 {
        return Ok((matrix, 0));
    }
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; present * dims * ELEM_BYTES as usize];
    file.read_exact(&mut buf)?;
    let mut row = vec![0.0f32; dims];
    for ordinal in 0..present {
        let base = ordinal * dims * 4;
        for (i, value) in row.iter_mut().enumerate() {
            let at = base + i * 4;
            *value = f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        }
        matrix.set_row(ordinal, &row);
    }
    Ok((matrix, present))
}

/// Appending writer over a store file.
///
/// Holds the file open in append mode for the duration of one window spec's
/// materialization; each [`append`](Self::append) is flushed so restarts
/// only ever observe whole records plus at most one partial tail.
pub struct StoreWriter {
    writer: BufWriter<File>,
    dims: usize,
    path: PathBuf,
}

impl StoreWriter {
    /// Opens `path` for appending, creating it if absent.
    pub fn open(path: &Path, dims: usize) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            dims,
            path: path.to_path_buf(),
        })
    }

    /// Appends one record of exactly `dims` little-endian floats and flushes.
    pub fn append(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            return Err(SemweaveError::capability(format!(
                "embedding of width {} written to a {}-dimensional store {}",
                vector.len(),
                self.dims,
                self.path.display()
            )));
        }
        for value in vector {
            self.writer.write_all(&value.to_le_bytes())?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
