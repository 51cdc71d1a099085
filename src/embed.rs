//! The embedding capability seam.
//!
//! Everything the engine knows about an embedding model goes through
//! [`EmbeddingCapability`]: tokenization into pieces that concatenate back to
//! the source text, batch embedding of token windows, single-text embedding
//! for queries and explanations, and the identity fields that feed the config
//! fingerprint. Model internals stay on the far side of this trait.
//!
//! Two backend variants are provided behind one interface:
//! [`EmbeddingBackend::Preset`] resolves a named model from the built-in
//! registry, and [`EmbeddingBackend::Custom`] points at an arbitrary
//! OpenAI-style embeddings endpoint. Both connect to an [`HttpEmbedder`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SemweaveError};
use crate::window::Window;

/// Environment variable overriding the embedding endpoint for presets.
pub const ENDPOINT_ENV: &str = "SEMWEAVE_EMBEDDING_URL";

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/v1/embeddings";

/// Model identity fields covered by the config fingerprint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelFingerprint {
    pub model_id: String,
    pub params: serde_json::Value,
}

/// Batching limits a model prefers; `None` leaves the configured value alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoolHint {
    pub count: Option<usize>,
    pub volume: Option<usize>,
}

/// Token pieces of one source text.
///
/// Pieces concatenate back to the exact original text, so a chunk range can
/// always be rendered without re-reading the source.
#[derive(Clone, Debug, Default)]
pub struct TokenSeq {
    pieces: Vec<String>,
}

impl TokenSeq {
    pub fn new(pieces: Vec<String>) -> Self {
        Self { pieces }
    }

    pub fn pieces(&self) -> &[String] {
        &self.pieces
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Renders the text of one window by concatenating its pieces.
    pub fn render(&self, window: &Window) -> String {
        let end = window.end.min(self.pieces.len());
        let start = window.start.min(end);
        self.pieces[start..end].concat()
    }
}

/// Pluggable embedding model.
#[async_trait]
pub trait EmbeddingCapability: Send + Sync {
    /// Width of every vector this model produces.
    fn dimensionality(&self) -> usize;

    /// Whether query and document vectors live in different spaces.
    fn is_asymmetric(&self) -> bool;

    /// Identity fields folded into the config fingerprint.
    fn config_fingerprint_fields(&self) -> ModelFingerprint;

    /// Per-token price, when the backend bills per token.
    fn cost_per_token(&self) -> Option<f64> {
        None
    }

    /// Preferred batching limits.
    fn pool_hint(&self) -> PoolHint {
        PoolHint::default()
    }

    /// Tokenizes `text` into pieces that concatenate back to it.
    async fn get_tokens(&self, text: &str) -> Result<TokenSeq>;

    /// The ordered chunk list persisted to the tokens cache.
    fn get_chunks(&self, text: &str, tokens: &TokenSeq) -> Result<Vec<String>>;

    /// Embeds one window batch; returns one row per window, in order.
    async fn embed_batch(&self, tokens: &TokenSeq, windows: &[Window]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a standalone text in document space.
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a query; equal to [`embed_single`](Self::embed_single) for
    /// symmetric models.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_single(text).await
    }
}

/// A named model in the preset registry.
#[derive(Clone, Copy, Debug)]
pub struct PresetModel {
    pub name: &'static str,
    pub model_id: &'static str,
    pub dimensions: usize,
    pub asymmetric: bool,
    pub query_prefix: &'static str,
    pub document_prefix: &'static str,
    pub pool_count: Option<usize>,
    pub pool_volume: Option<usize>,
    pub cost_per_token: Option<f64>,
}

const PRESETS: &[PresetModel] = &[
    PresetModel {
        name: "mpnet",
        model_id: "sentence-transformers/all-mpnet-base-v2",
        dimensions: 768,
        asymmetric: false,
        query_prefix: "",
        document_prefix: "",
        pool_count: None,
        pool_volume: Some(15_000),
        cost_per_token: None,
    },
    PresetModel {
        name: "minilm",
        model_id: "sentence-transformers/all-MiniLM-L6-v2",
        dimensions: 384,
        asymmetric: false,
        query_prefix: "",
        document_prefix: "",
        pool_count: None,
        pool_volume: Some(30_000),
        cost_per_token: None,
    },
    PresetModel {
        name: "e5-base",
        model_id: "intfloat/e5-base-v2",
        dimensions: 768,
        asymmetric: true,
        query_prefix: "query: ",
        document_prefix: "passage: ",
        pool_count: None,
        pool_volume: Some(15_000),
        cost_per_token: None,
    },
    PresetModel {
        name: "openai",
        model_id: "text-embedding-3-small",
        dimensions: 1536,
        asymmetric: false,
        query_prefix: "",
        document_prefix: "",
        pool_count: Some(2_048),
        pool_volume: Some(50_000),
        cost_per_token: Some(0.000_000_02),
    },
];

/// The preset model registry.
pub fn presets() -> &'static [PresetModel] {
    PRESETS
}

/// Looks up one preset by name.
pub fn preset(name: &str) -> Option<&'static PresetModel> {
    PRESETS.iter().find(|p| p.name == name)
}

/// Backend selection: a named preset or a custom endpoint.
#[derive(Clone, Debug)]
pub enum EmbeddingBackend {
    Preset(String),
    Custom {
        endpoint: String,
        model_id: String,
        dimensions: usize,
        params: serde_json::Value,
    },
}

impl EmbeddingBackend {
    /// Resolves the backend into a connected capability.
    ///
    /// Presets read their endpoint from [`ENDPOINT_ENV`] when set, falling
    /// back to a local inference server.
    pub fn connect(&self) -> Result<Arc<dyn EmbeddingCapability>> {
        match self {
            EmbeddingBackend::Preset(name) => {
                let preset = preset(name).ok_or_else(|| {
                    SemweaveError::config(format!(
                        "unknown preset model '{name}' (available: {})",
                        PRESETS
                            .iter()
                            .map(|p| p.name)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                })?;
                let endpoint = std::env::var(ENDPOINT_ENV)
                    .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
                Ok(Arc::new(HttpEmbedder::from_preset(preset, endpoint)))
            }
            EmbeddingBackend::Custom {
                endpoint,
                model_id,
                dimensions,
                params,
            } => Ok(Arc::new(HttpEmbedder::new(
                endpoint.clone(),
                model_id.clone(),
                *dimensions,
                params.clone(),
            ))),
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedRow>,
}

#[derive(Deserialize)]
struct EmbedRow {
    embedding: Vec<f32>,
}

/// Embedding capability backed by an OpenAI-style HTTP endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model_id: String,
    dimensions: usize,
    asymmetric: bool,
    query_prefix: String,
    document_prefix: String,
    params: serde_json::Value,
    cost_per_token: Option<f64>,
    pool_hint: PoolHint,
}

impl HttpEmbedder {
    pub fn new(
        endpoint: String,
        model_id: String,
        dimensions: usize,
        params: serde_json::Value,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model_id,
            dimensions,
            asymmetric: false,
            query_prefix: String::new(),
            document_prefix: String::new(),
            params,
            cost_per_token: None,
            pool_hint: PoolHint::default(),
        }
    }

    pub fn from_preset(preset: &PresetModel, endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model_id: preset.model_id.to_string(),
            dimensions: preset.dimensions,
            asymmetric: preset.asymmetric,
            query_prefix: preset.query_prefix.to_string(),
            document_prefix: preset.document_prefix.to_string(),
            params: serde_json::Value::Null,
            cost_per_token: preset.cost_per_token,
            pool_hint: PoolHint {
                count: preset.pool_count,
                volume: preset.pool_volume,
            },
        }
    }

    async fn embed_texts(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model_id,
            input,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| SemweaveError::capability(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SemweaveError::capability(format!(
                "embedding endpoint {} returned {}",
                self.endpoint,
                response.status()
            )));
        }
        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|err| SemweaveError::capability(err.to_string()))?;
        if body.data.len() != input.len() {
            return Err(SemweaveError::capability(format!(
                "embedding endpoint returned {} rows for {} inputs",
                body.data.len(),
                input.len()
            )));
        }
        let mut rows = Vec::with_capacity(body.data.len());
        for row in body.data {
            if row.embedding.len() != self.dimensions {
                return Err(SemweaveError::capability(format!(
                    "embedding width {} does not match the configured {} dimensions",
                    row.embedding.len(),
                    self.dimensions
                )));
            }
            rows.push(row.embedding);
        }
        Ok(rows)
    }
}

#[async_trait]
impl EmbeddingCapability for HttpEmbedder {
    fn dimensionality(&self) -> usize {
        self.dimensions
    }

    fn is_asymmetric(&self) -> bool {
        self.asymmetric
    }

    fn config_fingerprint_fields(&self) -> ModelFingerprint {
        ModelFingerprint {
            model_id: self.model_id.clone(),
            params: serde_json::json!({
                "endpoint": self.endpoint,
                "query_prefix": self.query_prefix,
                "document_prefix": self.document_prefix,
                "params": self.params,
            }),
        }
    }

    fn cost_per_token(&self) -> Option<f64> {
        self.cost_per_token
    }

    fn pool_hint(&self) -> PoolHint {
        self.pool_hint
    }

    async fn get_tokens(&self, text: &str) -> Result<TokenSeq> {
        Ok(TokenSeq::new(tokenize_pieces(text)))
    }

    fn get_chunks(&self, _text: &str, tokens: &TokenSeq) -> Result<Vec<String>> {
        Ok(tokens.pieces().to_vec())
    }

    async fn embed_batch(&self, tokens: &TokenSeq, windows: &[Window]) -> Result<Vec<Vec<f32>>> {
        let input: Vec<String> = windows
            .iter()
            .map(|w| format!("{}{}", self.document_prefix, tokens.render(w)))
            .collect();
        debug!(batch = input.len(), "embedding window batch");
        self.embed_texts(&input).await
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let input = vec![format!("{}{}", self.document_prefix, text)];
        Ok(self.embed_texts(&input).await?.remove(0))
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let input = vec![format!("{}{}", self.query_prefix, text)];
        Ok(self.embed_texts(&input).await?.remove(0))
    }
}

/// Splits text into pieces of one whitespace-delimited word plus its
/// trailing whitespace, so the pieces concatenate back to the input exactly.
pub fn tokenize_pieces(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut in_trailer = false;
    for ch in text.chars() {
        let is_ws = ch.is_whitespace();
        if !is_ws && in_trailer && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(ch);
        in_trailer = is_ws;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
