//! Shared test doubles for integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use semweave::embed::{EmbeddingCapability, ModelFingerprint, TokenSeq, tokenize_pieces};
use semweave::error::{Result, SemweaveError};
use semweave::window::Window;

/// Deterministic embedding model for tests: one dimension per keyword plus a
/// bias dimension, so texts mentioning a keyword more often score closer to
/// a query for that keyword. Counts every embedding call.
pub struct KeywordModel {
    keywords: Vec<String>,
    asymmetric: bool,
    /// Batches allowed before `embed_batch` starts failing; `usize::MAX`
    /// never fails.
    fail_after_batches: usize,
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
    pub windows_embedded: AtomicUsize,
}

impl KeywordModel {
    fn build(keywords: &[&str], asymmetric: bool, fail_after_batches: usize) -> Arc<Self> {
        Arc::new(Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            asymmetric,
            fail_after_batches,
            batch_calls: AtomicUsize::new(0),
            single_calls: AtomicUsize::new(0),
            windows_embedded: AtomicUsize::new(0),
        })
    }

    pub fn new(keywords: &[&str]) -> Arc<Self> {
        Self::build(keywords, false, usize::MAX)
    }

    pub fn asymmetric(keywords: &[&str]) -> Arc<Self> {
        Self::build(keywords, true, usize::MAX)
    }

    pub fn failing_after(keywords: &[&str], batches: usize) -> Arc<Self> {
        Self::build(keywords, false, batches)
    }

    pub fn total_embed_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst) + self.single_calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.keywords.len() + 1);
        for keyword in &self.keywords {
            vector.push(text.matches(keyword.as_str()).count() as f32);
        }
        vector.push(1.0);
        vector
    }
}

#[async_trait]
impl EmbeddingCapability for KeywordModel {
    fn dimensionality(&self) -> usize {
        self.keywords.len() + 1
    }

    fn is_asymmetric(&self) -> bool {
        self.asymmetric
    }

    fn config_fingerprint_fields(&self) -> ModelFingerprint {
        ModelFingerprint {
            model_id: "keyword-test-model".into(),
            params: serde_json::json!({ "keywords": self.keywords }),
        }
    }

    async fn get_tokens(&self, text: &str) -> Result<TokenSeq> {
        Ok(TokenSeq::new(tokenize_pieces(text)))
    }

    fn get_chunks(&self, _text: &str, tokens: &TokenSeq) -> Result<Vec<String>> {
        Ok(tokens.pieces().to_vec())
    }

    async fn embed_batch(&self, tokens: &TokenSeq, windows: &[Window]) -> Result<Vec<Vec<f32>>> {
        let calls = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if calls >= self.fail_after_batches {
            return Err(SemweaveError::capability("injected batch failure"));
        }
        self.windows_embedded.fetch_add(windows.len(), Ordering::SeqCst);
        Ok(windows
            .iter()
            .map(|w| self.vector_for(&tokens.render(w)))
            .collect())
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }
}
