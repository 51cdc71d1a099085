//! # Semweave: content-addressed, resumable semantic indexing
//!
//! Semweave splits documents into overlapping token windows, embeds each
//! window through a pluggable capability, persists the vectors in
//! append-only binary stores keyed by content+configuration fingerprints,
//! and answers ranked semantic queries with sub-span explanations.
//!
//! ```text
//! Source file ──► fingerprint ──► CachePaths (tokens / config / stores / indexes)
//!                      │
//! EmbeddingCapability ─┤
//!    get_tokens        ▼
//!    get_chunks   IndexingPipeline ──► window::plan_windows ──► pool::BatchPooler
//!    embed_batch       │                                             │
//!                      ├─► store (append-only f32 records, resumable) ◄┘
//!                      └─► ann::VectorIndex (HNSW, persisted per spec)
//!
//! DocumentRegistry ──► SearchService ──► rank::{Exact, Approximate, LinearSeparator}
//!                            └─► explain (leave-one-out hotspot attribution)
//! ```
//!
//! ## Incremental by construction
//!
//! Every cache artifact is named by a content digest and a configuration
//! digest. Reprocessing an unchanged file with an unchanged configuration
//! performs zero embedding calls; changing any covered configuration field
//! opens a fresh cache namespace with no invalidation step. A crashed run
//! resumes from the last complete record, truncating at most one partial
//! trailing record.
//!
//! ## Module Guide
//!
//! - [`config`] - engine configuration and builder
//! - [`embed`] - the embedding capability seam, presets, HTTP backend
//! - [`window`] - window specs, parsing, and planning
//! - [`store`] - append-only binary embedding stores
//! - [`pool`] - batching of windows into embedding requests
//! - [`pipeline`] - per-document materialization and batch ingestion
//! - [`ann`] - persisted approximate nearest-neighbor indexes
//! - [`rank`] - the three ranking strategies and result merging
//! - [`explain`] - leave-one-out hotspot attribution
//! - [`registry`] - the shared document registry and query façade
//! - [`api`] - transport-facing request/response payloads

pub mod ann;
pub mod api;
pub mod config;
pub mod content;
pub mod document;
pub mod embed;
pub mod error;
pub mod explain;
pub mod fingerprint;
pub mod pipeline;
pub mod pool;
pub mod rank;
pub mod registry;
pub mod shutdown;
pub mod store;
pub mod vecmath;
pub mod window;

pub use api::{ExplainRequest, FileResults, QueryRequest, Segment};
pub use config::{ExplainParams, SemweaveConfig};
pub use document::Document;
pub use embed::{EmbeddingBackend, EmbeddingCapability};
pub use error::{Result, SemweaveError};
pub use pipeline::{BatchOutcome, IndexingPipeline};
pub use rank::RankingStrategy;
pub use registry::{DocumentRegistry, SearchService};
pub use shutdown::ShutdownFlag;
pub use window::WindowSpec;
