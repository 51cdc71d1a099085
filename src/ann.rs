//! Approximate nearest-neighbor index: build, persist, load, query.
//!
//! The graph construction itself is delegated to `hnsw_rs`; this module owns
//! the caching contract around it. A persisted index file holds the build
//! parameters, the record count, and the L2-normalized vectors; the HNSW
//! graph is rebuilt by re-insertion when the file is loaded for a query.
//! The record count is readable from the file prefix without touching the
//! vector payload, which is how staleness against the backing store is
//! checked.
//!
//! Native distances are Euclidean over unit vectors, so a returned distance
//! `d` converts to cosine similarity as `1 - d^2 / 2`.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use hnsw_rs::prelude::*;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::{Result, SemweaveError};
use crate::store::EmbeddingMatrix;
use crate::vecmath;

const HNSW_MAX_NB_CONNECTION: usize = 16;
const HNSW_MAX_LAYER: usize = 16;

fn index_error(path: &Path, message: impl Into<String>) -> SemweaveError {
    SemweaveError::IndexBuild {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Converts a native L2 distance between unit vectors to cosine similarity.
pub fn cosine_from_distance(distance: f32) -> f32 {
    1.0 - distance * distance / 2.0
}

/// Persisted ANN index over one store's records.
pub struct VectorIndex {
    dims: usize,
    build_factor: u32,
    vectors: Vec<f32>,
    count: usize,
    graph: OnceCell<Hnsw<'static, f32, DistL2>>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dims", &self.dims)
            .field("build_factor", &self.build_factor)
            .field("count", &self.count)
            .field("graph_built", &self.graph.get().is_some())
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Builds an index over every record of `matrix`, normalizing each row.
    pub fn build(matrix: &EmbeddingMatrix, build_factor: u32) -> Self {
        let dims = matrix.dims();
        let mut vectors = Vec::with_capacity(matrix.rows() * dims);
        for row in matrix.iter_rows() {
            vectors.extend(vecmath::normalized(row));
        }
        Self {
            dims,
            build_factor,
            vectors,
            count: matrix.rows(),
            graph: OnceCell::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn build_factor(&self) -> u32 {
        self.build_factor
    }

    /// Serializes the index to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        let payload = (
            self.dims as u32,
            self.build_factor,
            self.count as u64,
            &self.vectors,
        );
        bincode::serialize_into(writer, &payload)
            .map_err(|err| index_error(path, err.to_string()))?;
        debug!(path = %path.display(), records = self.count, "persisted vector index");
        Ok(())
    }

    /// Deserializes an index from `path`, validating its dimensionality.
    ///
    /// The graph itself is not rebuilt here; that happens on the first
    /// [`query`](Self::query).
    pub fn load(path: &Path, dims: usize) -> Result<Self> {
        let file = File::open(path).map_err(|err| index_error(path, err.to_string()))?;
        let reader = BufReader::new(file);
        let (stored_dims, build_factor, count, vectors): (u32, u32, u64, Vec<f32>) =
            bincode::deserialize_from(reader)
                .map_err(|err| index_error(path, err.to_string()))?;
        if stored_dims as usize != dims {
            return Err(index_error(
                path,
                format!("index dimensionality {stored_dims} does not match configured {dims}"),
            ));
        }
        if vectors.len() != count as usize * dims {
            return Err(index_error(
                path,
                format!(
                    "index payload holds {} values for {count} records of width {dims}",
                    vectors.len()
                ),
            ));
        }
        Ok(Self {
            dims,
            build_factor,
            vectors,
            count: count as usize,
            graph: OnceCell::new(),
        })
    }

    /// Reads the record count from a persisted index without deserializing
    /// the vector payload.
    pub fn read_count(path: &Path) -> Result<usize> {
        let file = File::open(path).map_err(|err| index_error(path, err.to_string()))?;
        let mut reader = BufReader::new(file);
        let (_dims, _build_factor, count): (u32, u32, u64) =
            bincode::deserialize_from(&mut reader)
                .map_err(|err| index_error(path, err.to_string()))?;
        Ok(count as usize)
    }

    fn row(&self, ordinal: usize) -> &[f32] {
        let base = ordinal * self.dims;
        &self.vectors[base..base + self.dims]
    }

    fn graph(&self) -> &Hnsw<'static, f32, DistL2> {
        self.graph.get_or_init(|| {
            let hnsw = Hnsw::<f32, DistL2>::new(
                HNSW_MAX_NB_CONNECTION,
                self.count.max(1),
                HNSW_MAX_LAYER,
                self.build_factor as usize,
                DistL2 {},
            );
            for ordinal in 0..self.count {
                hnsw.insert_slice((self.row(ordinal), ordinal));
            }
            debug!(records = self.count, "rebuilt HNSW graph from persisted vectors");
            hnsw
        })
    }

    /// Returns up to `k` `(ordinal, native L2 distance)` pairs for `vector`,
    /// nearest first.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<(usize, f32)> {
        if self.count == 0 || k == 0 {
            return Vec::new();
        }
        let unit = vecmath::normalized(vector);
        let ef_search = (2 * k).max(HNSW_MAX_NB_CONNECTION);
        self.graph()
            .search(&unit, k, ef_search)
            .into_iter()
            .map(|neighbour| (neighbour.d_id, neighbour.distance))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn matrix_of(rows: &[&[f32]]) -> EmbeddingMatrix {
        let dims = rows[0].len();
        let mut matrix = EmbeddingMatrix::zeroed(rows.len(), dims);
        for (i, row) in rows.iter().enumerate() {
            matrix.set_row(i, row);
        }
        matrix
    }

    #[test]
    fn nearest_neighbour_is_found() {
        let matrix = matrix_of(&[
            &[1.0, 0.0, 0.0],
            &[0.0, 1.0, 0.0],
            &[0.0, 0.0, 1.0],
            &[0.7, 0.7, 0.0],
        ]);
        let index = VectorIndex::build(&matrix, 100);
        let hits = index.query(&[0.9, 0.1, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn distances_convert_to_cosine() {
        let matrix = matrix_of(&[&[1.0, 0.0], &[0.0, 1.0]]);
        let index = VectorIndex::build(&matrix, 100);
        let hits = index.query(&[1.0, 0.0], 2);
        let exact: Vec<f32> = hits
            .iter()
            .map(|(ordinal, distance)| {
                let expected = vecmath::cosine(matrix.row(*ordinal), &[1.0, 0.0]);
                (cosine_from_distance(*distance) - expected).abs()
            })
            .collect();
        assert!(exact.iter().all(|diff| *diff < 1e-5));
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.idx");
        let matrix = matrix_of(&[&[1.0, 0.0], &[0.0, 1.0], &[0.6, 0.8]]);
        let index = VectorIndex::build(&matrix, 64);
        index.save(&path).unwrap();

        assert_eq!(VectorIndex::read_count(&path).unwrap(), 3);

        let loaded = VectorIndex::load(&path, 2).unwrap();
        assert_eq!(loaded.count(), 3);
        assert_eq!(loaded.build_factor(), 64);
        let hits = loaded.query(&[0.6, 0.8], 1);
        assert_eq!(hits[0].0, 2);
    }

    #[test]
    fn dimension_mismatch_is_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.idx");
        let matrix = matrix_of(&[&[1.0, 0.0]]);
        VectorIndex::build(&matrix, 10).save(&path).unwrap();
        assert!(matches!(
            VectorIndex::load(&path, 3),
            Err(SemweaveError::IndexBuild { .. })
        ));
    }

    #[test]
    fn empty_index_yields_no_hits() {
        let matrix = EmbeddingMatrix::zeroed(0, 4);
        let index = VectorIndex::build(&matrix, 10);
        assert!(index.query(&[1.0, 0.0, 0.0, 0.0], 5).is_empty());
    }
}
