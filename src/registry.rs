//! Shared document registry and the query/explain façade over it.
//!
//! The registry is an explicit object passed by reference to whatever
//! transport hosts the engine. Ingestion is the only writer for a given
//! filename (the single-writer-per-fingerprint discipline); queries and
//! explanations are read-only and re-check store record counts on every
//! request rather than caching them.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::api::{
    ExplainRequest, FileInfo, FileResults, Preference, QueryRequest, QueryResult, Segment,
    WeightedQuery,
};
use crate::config::SemweaveConfig;
use crate::document::{Document, render_span};
use crate::embed::EmbeddingCapability;
use crate::error::{Result, SemweaveError};
use crate::explain::explain_window;
use crate::rank::{self, RankedWindow, RankingStrategy};

/// Insertion-ordered collection of ingested documents.
#[derive(Default)]
pub struct DocumentRegistry {
    docs: RwLock<Vec<Arc<Document>>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a document, replacing any previous entry for the same
    /// filename in place.
    pub fn insert(&self, document: Arc<Document>) {
        let mut docs = self.docs.write();
        match docs
            .iter()
            .position(|d| d.filename() == document.filename())
        {
            Some(position) => docs[position] = document,
            None => docs.push(document),
        }
    }

    pub fn get(&self, filename: &str) -> Option<Arc<Document>> {
        self.docs
            .read()
            .iter()
            .find(|d| d.filename() == filename)
            .cloned()
    }

    pub fn remove(&self, filename: &str) -> Option<Arc<Document>> {
        let mut docs = self.docs.write();
        let position = docs.iter().position(|d| d.filename() == filename)?;
        Some(docs.remove(position))
    }

    /// Snapshot in insertion order; queries iterate this so tie-breaks are
    /// stable across requests.
    pub fn snapshot(&self) -> Vec<Arc<Document>> {
        self.docs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    pub fn list(&self) -> Vec<FileInfo> {
        self.docs
            .read()
            .iter()
            .map(|doc| FileInfo {
                basename: doc.base_filename().to_string(),
                filename: doc.filename().to_string(),
                filetype: doc.filetype().to_string(),
            })
            .collect()
    }
}

/// Read-only query and explanation engine over a registry.
pub struct SearchService {
    registry: Arc<DocumentRegistry>,
    capability: Arc<dyn EmbeddingCapability>,
    config: SemweaveConfig,
}

impl SearchService {
    /// The strategy/model pairing is validated here as well, so a service
    /// built standalone fails before any I/O.
    pub fn new(
        registry: Arc<DocumentRegistry>,
        capability: Arc<dyn EmbeddingCapability>,
        config: SemweaveConfig,
    ) -> Result<Self> {
        config.strategy.validate(capability.is_asymmetric())?;
        Ok(Self {
            registry,
            capability,
            config,
        })
    }

    pub fn registry(&self) -> &Arc<DocumentRegistry> {
        &self.registry
    }

    /// Ranked search across every registered document.
    pub async fn query(&self, request: QueryRequest) -> Result<Vec<FileResults>> {
        let query_vector = self
            .combined_vector(&request.queries, &request.preferences)
            .await?;
        let documents = self.registry.snapshot();
        let mut per_document = Vec::with_capacity(documents.len());
        for document in &documents {
            per_document.push(self.rank_document(document, &query_vector, &request)?);
        }
        Ok(group_by_file(rank::merge_results(per_document)))
    }

    /// Single-term convenience over [`query`](Self::query).
    pub async fn search(&self, text: &str) -> Result<Vec<FileResults>> {
        self.query(QueryRequest {
            queries: vec![WeightedQuery {
                query: text.to_string(),
                weight: 1.0,
            }],
            preferences: Vec::new(),
        })
        .await
    }

    /// Explains which sub-span of a matched window drove its score.
    pub async fn explain(&self, request: ExplainRequest) -> Result<Vec<Segment>> {
        let document = self.registry.get(&request.filename).ok_or_else(|| {
            SemweaveError::config(format!("unknown document '{}'", request.filename))
        })?;
        let chunks = document.chunks()?;
        let (start, end) = request.offset;
        let end = end.min(chunks.len());
        let start = start.min(end);
        let query_vector = self
            .combined_vector(&request.queries, &request.preferences)
            .await?;
        explain_window(
            self.capability.as_ref(),
            &chunks[start..end],
            &query_vector,
            &self.config.explain,
        )
        .await
    }

    /// Combines weighted query embeddings and preference window embeddings
    /// into one target vector.
    async fn combined_vector(
        &self,
        queries: &[WeightedQuery],
        preferences: &[Preference],
    ) -> Result<Vec<f32>> {
        if queries.is_empty() && preferences.is_empty() {
            return Err(SemweaveError::config(
                "a query needs at least one query line or preference",
            ));
        }
        let dims = self.capability.dimensionality();
        let mut combined = vec![0.0f32; dims];
        for weighted in queries {
            let embedding = self.capability.embed_query(&weighted.query).await?;
            for (acc, value) in combined.iter_mut().zip(&embedding) {
                *acc += weighted.weight * value;
            }
        }
        for preference in preferences {
            let document = self.registry.get(&preference.filename).ok_or_else(|| {
                SemweaveError::config(format!(
                    "preference references unknown document '{}'",
                    preference.filename
                ))
            })?;
            let chunks = document.chunks()?;
            let embeddings = document.embeddings(&chunks)?;
            let ordinal = embeddings
                .window_indices
                .iter()
                .position(|&w| w == preference.index)
                .filter(|&ordinal| ordinal < embeddings.matrix.rows())
                .ok_or_else(|| {
                    SemweaveError::config(format!(
                        "preference references window {} of '{}' which has no embedding",
                        preference.index, preference.filename
                    ))
                })?;
            let row = embeddings.matrix.row(ordinal);
            for (acc, value) in combined.iter_mut().zip(row) {
                *acc += preference.weight * value;
            }
        }
        Ok(combined)
    }

    /// Ranks one document's window-0 records with the configured strategy.
    fn rank_document(
        &self,
        document: &Document,
        query_vector: &[f32],
        request: &QueryRequest,
    ) -> Result<Vec<QueryResult>> {
        let chunks = document.chunks()?;
        let embeddings = document.embeddings(&chunks)?;
        let k = self.config.num_results;

        let ranked: Vec<RankedWindow> = match self.config.strategy {
            RankingStrategy::Exact => rank::rank_exact(&embeddings.matrix, query_vector, k),
            RankingStrategy::LinearSeparator { c } => {
                rank::rank_separator(&embeddings.matrix, query_vector, k, c)
            }
            RankingStrategy::Approximate => {
                match document.ann_index() {
                    Some(index) if index.count() == embeddings.matrix.rows() => {
                        rank::rank_approximate(index, query_vector, k)
                    }
                    Some(index) => {
                        warn!(
                            filename = %document.filename(),
                            index_records = index.count(),
                            store_records = embeddings.matrix.rows(),
                            "vector index is stale, falling back to exact ranking"
                        );
                        rank::rank_exact(&embeddings.matrix, query_vector, k)
                    }
                    None => rank::rank_exact(&embeddings.matrix, query_vector, k),
                }
            }
        };

        let windows = document.search_windows();
        let mut results = Vec::with_capacity(ranked.len());
        for hit in ranked {
            let Some(&window_index) = embeddings.window_indices.get(hit.ordinal) else {
                continue;
            };
            let window = windows[window_index];
            results.push(QueryResult {
                text: render_span(&chunks, window.start, window.end),
                distance: hit.score,
                offset: (window.start, window.end),
                index: window_index,
                filename: document.filename().to_string(),
                queries: request.queries.clone(),
                preferences: request.preferences.clone(),
            });
        }
        Ok(results)
    }
}

/// Groups a globally sorted result list per file; files appear at the
/// position of their best hit and hits keep their global order.
fn group_by_file(merged: Vec<QueryResult>) -> Vec<FileResults> {
    let mut grouped: Vec<FileResults> = Vec::new();
    for result in merged {
        match grouped.iter().position(|g| g.filename == result.filename) {
            Some(position) => grouped[position].results.push(result),
            None => grouped.push(FileResults {
                filename: result.filename.clone(),
                results: vec![result],
            }),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(filename: &str, distance: f32) -> QueryResult {
        QueryResult {
            text: String::new(),
            distance,
            offset: (0, 0),
            index: 0,
            filename: filename.to_string(),
            queries: Vec::new(),
            preferences: Vec::new(),
        }
    }

    #[test]
    fn grouping_keeps_best_first_file_order() {
        let merged = vec![
            result("b", 0.95),
            result("a", 0.9),
            result("b", 0.2),
            result("a", 0.1),
        ];
        let grouped = group_by_file(merged);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].filename, "b");
        assert_eq!(grouped[0].results.len(), 2);
        assert_eq!(grouped[1].filename, "a");
    }
}
