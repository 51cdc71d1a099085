//! The indexing pipeline: materializes one document's cache artifacts.
//!
//! Per document the pipeline computes fingerprints, resolves cache paths,
//! persists the chunk list, then for each window spec brings the embedding
//! store (and requested index) to the expected record count — resuming from
//! whatever a previous run left behind. Fully processed specs are skipped
//! without touching the embedding capability, which is what makes
//! reprocessing an unchanged file free.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ann::VectorIndex;
use crate::config::SemweaveConfig;
use crate::content;
use crate::content::ContentSource;
use crate::document::{Document, embedded_window_indices, render_span};
use crate::embed::{EmbeddingCapability, TokenSeq};
use crate::error::{Result, SemweaveError};
use crate::fingerprint::{self, CachePaths, ConfigDigest};
use crate::pool::BatchPooler;
use crate::shutdown::ShutdownFlag;
use crate::store::{self, EmbeddingMatrix, StoreWriter};
use crate::window::{WindowPlan, plan_windows};

/// Configuration record written next to the cache artifacts on every run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheRecord {
    pub model_id: String,
    pub model_params: serde_json::Value,
    pub filename: String,
    pub base_filename: String,
    pub content_id: String,
    pub config_id: String,
    pub encoding: String,
    pub windows: Vec<String>,
    pub num_chunks: usize,
    pub dimensions: usize,
    pub expected_records: Vec<usize>,
    pub embedded_volume: usize,
    pub cost_estimate: Option<f64>,
    pub index: bool,
    pub index_build_factor: u32,
    pub version: String,
}

/// Outcome of a multi-document ingestion run: per-document failures are
/// collected instead of aborting the batch.
#[derive(Default)]
pub struct BatchOutcome {
    pub documents: Vec<Arc<Document>>,
    pub failures: Vec<(String, SemweaveError)>,
}

/// Orchestrates cache materialization for documents.
pub struct IndexingPipeline {
    capability: Arc<dyn EmbeddingCapability>,
    config: SemweaveConfig,
    shutdown: ShutdownFlag,
}

impl IndexingPipeline {
    /// Validates the strategy/model pairing before any I/O.
    pub fn new(
        capability: Arc<dyn EmbeddingCapability>,
        config: SemweaveConfig,
    ) -> Result<Self> {
        config.strategy.validate(capability.is_asymmetric())?;
        Ok(Self {
            capability,
            config,
            shutdown: ShutdownFlag::new(),
        })
    }

    /// Uses an externally owned shutdown flag (e.g. one wired to ctrl-c).
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownFlag) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &SemweaveConfig {
        &self.config
    }

    pub fn capability(&self) -> &Arc<dyn EmbeddingCapability> {
        &self.capability
    }

    /// Processes a list of documents, collecting per-document failures.
    ///
    /// A shutdown request stops the batch before the next document; an
    /// unreadable source fails only its own entry.
    pub async fn process_all(&self, paths: &[PathBuf]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for path in paths {
            if self.shutdown.is_triggered() {
                break;
            }
            match self.process(path).await {
                Ok(document) => outcome.documents.push(Arc::new(document)),
                Err(SemweaveError::Shutdown) => break,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "document ingestion failed");
                    outcome.failures.push((path.display().to_string(), err));
                }
            }
        }
        outcome
    }

    /// Materializes one document, resuming any partial prior run.
    pub async fn process(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        std::fs::create_dir_all(&self.config.cache_dir)?;

        let content_id = fingerprint::content_id(path)?;
        let model = self.capability.config_fingerprint_fields();
        let dims = self.capability.dimensionality();
        let window_labels: Vec<String> =
            self.config.windows.iter().map(|spec| spec.label()).collect();
        let config_id = fingerprint::config_id(&ConfigDigest {
            model_id: &model.model_id,
            model_params: &model.params,
            encoding: &self.config.encoding,
            windows: window_labels.clone(),
            dimensions: dims,
            index: self.config.build_index,
            index_build_factor: self.config.index_build_factor,
        })?;
        let paths = CachePaths::resolve(
            &self.config.cache_dir,
            &content_id,
            &config_id,
            &self.config.windows,
            self.config.index_build_factor,
        );

        let (chunks, mut tokens, filetype) = self.load_chunks(path, &paths).await?;

        let mut plans = Vec::with_capacity(self.config.windows.len());
        for spec in &self.config.windows {
            plans.push(plan_windows(spec, chunks.len())?);
        }

        self.write_cache_record(path, &paths, &model, &content_id, &config_id, dims, &chunks, &plans, &window_labels)?;

        for (spec_pos, plan) in plans.iter().enumerate() {
            self.materialize_spec(&paths, spec_pos, plan, &chunks, &mut tokens)
                .await?;
        }

        info!(
            filename = %path.display(),
            content_id = %content_id,
            config_id = %config_id,
            "document materialized"
        );
        Ok(Document::new(
            path.display().to_string(),
            filetype,
            content_id,
            config_id,
            dims,
            self.config.windows.clone(),
            plans,
            paths,
            self.config.build_index,
        ))
    }

    /// Reads the cached chunk list, tokenizing the source first when the
    /// cache is absent or a forced run was requested.
    async fn load_chunks(
        &self,
        path: &Path,
        paths: &CachePaths,
    ) -> Result<(Vec<String>, Option<TokenSeq>, String)> {
        if self.config.force || !paths.tokens.exists() {
            let source = content::read_text(path, &self.config.encoding)?;
            let filetype = source.filetype().to_string();
            let tokens = self.capability.get_tokens(source.raw_text()).await?;
            let chunks = self.capability.get_chunks(source.raw_text(), &tokens)?;
            std::fs::write(&paths.tokens, serde_json::to_vec(&chunks)?)?;
            debug!(path = %paths.tokens.display(), chunks = chunks.len(), "persisted chunk list");
            Ok((chunks, Some(tokens), filetype))
        } else {
            let data = std::fs::read_to_string(&paths.tokens)?;
            let chunks: Vec<String> = serde_json::from_str(&data)?;
            Ok((chunks, None, "text".to_string()))
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_cache_record(
        &self,
        path: &Path,
        paths: &CachePaths,
        model: &crate::embed::ModelFingerprint,
        content_id: &str,
        config_id: &str,
        dims: usize,
        chunks: &[String],
        plans: &[WindowPlan],
        window_labels: &[String],
    ) -> Result<()> {
        let expected_records: Vec<usize> = plans
            .iter()
            .map(|plan| embedded_window_indices(chunks, plan).len())
            .collect();
        let embedded_volume: usize = plans.iter().map(|plan| plan.coverage).sum();
        let record = CacheRecord {
            model_id: model.model_id.clone(),
            model_params: model.params.clone(),
            filename: path.display().to_string(),
            base_filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            content_id: content_id.to_string(),
            config_id: config_id.to_string(),
            encoding: self.config.encoding.clone(),
            windows: window_labels.to_vec(),
            num_chunks: chunks.len(),
            dimensions: dims,
            expected_records,
            embedded_volume,
            cost_estimate: self
                .capability
                .cost_per_token()
                .map(|cost| cost * embedded_volume as f64),
            index: self.config.build_index,
            index_build_factor: self.config.index_build_factor,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        std::fs::write(&paths.config, serde_json::to_vec(&record)?)?;
        Ok(())
    }

    /// Brings one window spec's store and index to the expected state.
    async fn materialize_spec(
        &self,
        paths: &CachePaths,
        spec_pos: usize,
        plan: &WindowPlan,
        chunks: &[String],
        tokens: &mut Option<TokenSeq>,
    ) -> Result<()> {
        let dims = self.capability.dimensionality();
        let spec_paths = &paths.specs[spec_pos];
        let expected = embedded_window_indices(chunks, plan).len();

        if self.config.force && spec_paths.embeddings.exists() {
            std::fs::remove_file(&spec_paths.embeddings)?;
        }

        // A partial trailing record from a crashed run is truncated here,
        // before the completeness check or any read.
        let present = store::recover(&spec_paths.embeddings, dims)?;
        let index_count = if self.config.build_index {
            VectorIndex::read_count(&spec_paths.index).ok()
        } else {
            None
        };
        let index_fresh = !self.config.build_index || index_count == Some(expected);

        if !self.config.force && present == expected && index_fresh {
            debug!(
                store = %spec_paths.embeddings.display(),
                records = expected,
                "window spec already materialized"
            );
            return Ok(());
        }

        let (mut matrix, present) = store::read_all(&spec_paths.embeddings, dims, expected)?;
        if present < expected {
            if tokens.is_none() {
                *tokens = Some(self.capability.get_tokens(&chunks.concat()).await?);
            }
            let token_seq = tokens.as_ref().expect("tokens just ensured");
            let mut writer = StoreWriter::open(&spec_paths.embeddings, dims)?;
            let (pool_count, pool_volume) =
                self.config.resolved_pool(self.capability.pool_hint());
            let mut pooler = BatchPooler::new(pool_count, pool_volume);
            let mut ordinal = present;
            let mut seen = 0usize;

            info!(
                store = %spec_paths.embeddings.display(),
                resumed_at = present,
                expected,
                "embedding window spec"
            );
            for window in &plan.windows {
                if render_span(chunks, window.start, window.end).is_empty() {
                    continue;
                }
                seen += 1;
                if seen <= present {
                    // Already embedded by a previous run.
                    continue;
                }
                if pooler.push(*window) {
                    self.flush_batch(&mut pooler, token_seq, &mut matrix, &mut writer, &mut ordinal)
                        .await?;
                    if self.shutdown.is_triggered() {
                        return Err(SemweaveError::Shutdown);
                    }
                }
            }
            self.flush_batch(&mut pooler, token_seq, &mut matrix, &mut writer, &mut ordinal)
                .await?;
        }

        if self.config.build_index {
            let index = VectorIndex::build(&matrix, self.config.index_build_factor);
            if let Err(err) = index.save(&spec_paths.index) {
                // Queries fall back to exact ranking when the index is missing.
                warn!(path = %spec_paths.index.display(), error = %err, "index build failed");
            }
        }
        Ok(())
    }

    /// Embeds and appends one drained batch; the matrix and store advance in
    /// lockstep, one ordinal per non-empty window.
    async fn flush_batch(
        &self,
        pooler: &mut BatchPooler,
        tokens: &TokenSeq,
        matrix: &mut EmbeddingMatrix,
        writer: &mut StoreWriter,
        ordinal: &mut usize,
    ) -> Result<()> {
        if pooler.is_empty() {
            return Ok(());
        }
        let batch = pooler.drain();
        let rows = self.capability.embed_batch(tokens, &batch).await?;
        if rows.len() != batch.len() {
            return Err(SemweaveError::capability(format!(
                "embedding capability returned {} rows for a batch of {}",
                rows.len(),
                batch.len()
            )));
        }
        for row in rows {
            writer.append(&row)?;
            matrix.set_row(*ordinal, &row);
            *ordinal += 1;
        }
        Ok(())
    }
}
