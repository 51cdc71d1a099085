//! Document handles over materialized cache artifacts.
//!
//! A [`Document`] owns no decoded content: chunks, embeddings, and the ANN
//! index are re-read from their cache files on demand, and record counts are
//! re-checked on every read so a reader never trusts a stale value while
//! another run is still appending.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::warn;

use crate::ann::VectorIndex;
use crate::error::Result;
use crate::fingerprint::CachePaths;
use crate::store::{self, EmbeddingMatrix};
use crate::window::{Window, WindowPlan, WindowSpec};

/// Renders the text of a chunk range.
pub fn render_span(chunks: &[String], start: usize, end: usize) -> String {
    let end = end.min(chunks.len());
    let start = start.min(end);
    chunks[start..end].concat()
}

/// Window indices of `plan` whose rendered text is non-empty — exactly the
/// windows that occupy store ordinals, in order.
pub fn embedded_window_indices(chunks: &[String], plan: &WindowPlan) -> Vec<usize> {
    plan.windows
        .iter()
        .enumerate()
        .filter(|(_, w)| !render_span(chunks, w.start, w.end).is_empty())
        .map(|(index, _)| index)
        .collect()
}

/// Window-0 embeddings of one document at one point in time.
pub struct DocumentEmbeddings {
    pub matrix: EmbeddingMatrix,
    /// Records actually present; may trail the expected count while another
    /// run is appending.
    pub present: usize,
    /// Maps store ordinal to window index.
    pub window_indices: Vec<usize>,
}

/// Handle to one ingested document's cache artifacts.
#[derive(Debug)]
pub struct Document {
    filename: String,
    base_filename: String,
    filetype: String,
    content_id: String,
    config_id: String,
    dims: usize,
    specs: Vec<WindowSpec>,
    plans: Vec<WindowPlan>,
    paths: CachePaths,
    index_requested: bool,
    index: OnceCell<Option<Arc<VectorIndex>>>,
}

impl Document {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        filename: String,
        filetype: String,
        content_id: String,
        config_id: String,
        dims: usize,
        specs: Vec<WindowSpec>,
        plans: Vec<WindowPlan>,
        paths: CachePaths,
        index_requested: bool,
    ) -> Self {
        let base_filename = Path::new(&filename)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.clone());
        Self {
            filename,
            base_filename,
            filetype,
            content_id,
            config_id,
            dims,
            specs,
            plans,
            paths,
            index_requested,
            index: OnceCell::new(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn base_filename(&self) -> &str {
        &self.base_filename
    }

    pub fn filetype(&self) -> &str {
        &self.filetype
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn specs(&self) -> &[WindowSpec] {
        &self.specs
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Windows of the first spec, the one interactive search runs over.
    pub fn search_windows(&self) -> &[Window] {
        &self.plans[0].windows
    }

    /// Reads the cached chunk list.
    pub fn chunks(&self) -> Result<Vec<String>> {
        let data = std::fs::read_to_string(&self.paths.tokens)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Loads the window-0 embedding matrix, re-checking the store's current
    /// record count.
    ///
    /// The matrix is truncated to the records actually present, so ranking a
    /// store another run is still appending to only sees whole records.
    pub fn embeddings(&self, chunks: &[String]) -> Result<DocumentEmbeddings> {
        let window_indices = embedded_window_indices(chunks, &self.plans[0]);
        let path = &self.paths.specs[0].embeddings;
        let (mut matrix, present) = store::read_all(path, self.dims, window_indices.len())?;
        matrix.truncate_rows(present);
        Ok(DocumentEmbeddings {
            matrix,
            present,
            window_indices,
        })
    }

    /// The persisted ANN index, loaded lazily on first use.
    ///
    /// Returns `None` when no index was requested or the file cannot be
    /// loaded; callers fall back to the exact strategy in that case.
    pub fn ann_index(&self) -> Option<&Arc<VectorIndex>> {
        self.index
            .get_or_init(|| {
                if !self.index_requested {
                    return None;
                }
                let path = &self.paths.specs[0].index;
                match VectorIndex::load(path, self.dims) {
                    Ok(index) => Some(Arc::new(index)),
                    Err(err) => {
                        warn!(
                            filename = %self.filename,
                            error = %err,
                            "vector index unavailable, queries fall back to exact ranking"
                        );
                        None
                    }
                }
            })
            .as_ref()
    }
}
