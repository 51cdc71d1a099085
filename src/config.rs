//! Engine configuration.
//!
//! All knobs that shape cache identity or query behavior live here, built
//! through [`SemweaveConfig::builder`]. Defaults mirror a sensible
//! interactive setup: one `128_0_16` window spec, ten results per document,
//! an ANN index with build factor 100, exact fallback semantics, and the
//! transformer-friendly pool volume of 15 000 chunks.

use std::path::PathBuf;

use crate::embed::PoolHint;
use crate::error::{Result, SemweaveError};
use crate::rank::RankingStrategy;
use crate::window::WindowSpec;

/// Pool volume used when neither the configuration nor the model hints at
/// one.
pub const DEFAULT_POOL_VOLUME: usize = 15_000;

/// Knobs of the leave-one-out explanation engine.
#[derive(Clone, Copy, Debug)]
pub struct ExplainParams {
    /// Number of candidate spans generated per window.
    pub num_splits: usize,
    /// Window length divisor giving each candidate's span length.
    pub divide_factor: usize,
    /// Number of spans kept as highlights.
    pub num_highlights: usize,
}

impl Default for ExplainParams {
    fn default() -> Self {
        Self {
            num_splits: 9,
            divide_factor: 6,
            num_highlights: 2,
        }
    }
}

/// Validated engine configuration.
#[derive(Clone, Debug)]
pub struct SemweaveConfig {
    pub cache_dir: PathBuf,
    pub windows: Vec<WindowSpec>,
    pub num_results: usize,
    pub build_index: bool,
    pub index_build_factor: u32,
    pub strategy: RankingStrategy,
    pub pool_count: Option<usize>,
    pub pool_volume: Option<usize>,
    pub explain: ExplainParams,
    pub encoding: String,
    pub force: bool,
}

impl SemweaveConfig {
    pub fn builder() -> SemweaveConfigBuilder {
        SemweaveConfigBuilder::default()
    }

    /// Loads environment overrides from `<cache_dir>/.env`, if present.
    pub fn load_env(&self) {
        let env_path = self.cache_dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }
    }

    /// Resolves the batching limits against a model's preferences: explicit
    /// configuration wins, then the model hint, then the crate default.
    pub fn resolved_pool(&self, hint: PoolHint) -> (Option<usize>, usize) {
        let count = self.pool_count.or(hint.count);
        let volume = self
            .pool_volume
            .or(hint.volume)
            .unwrap_or(DEFAULT_POOL_VOLUME);
        (count, volume)
    }
}

/// Builder for [`SemweaveConfig`]; `build` validates every window spec
/// before any I/O can happen.
#[derive(Clone, Debug)]
pub struct SemweaveConfigBuilder {
    cache_dir: PathBuf,
    windows: Vec<WindowSpec>,
    num_results: usize,
    build_index: bool,
    index_build_factor: u32,
    strategy: RankingStrategy,
    pool_count: Option<usize>,
    pool_volume: Option<usize>,
    explain: ExplainParams,
    encoding: String,
    force: bool,
}

impl Default for SemweaveConfigBuilder {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".semweave"),
            windows: vec![WindowSpec::new(128, 0, 16)],
            num_results: 10,
            build_index: true,
            index_build_factor: 100,
            strategy: RankingStrategy::Approximate,
            pool_count: None,
            pool_volume: None,
            explain: ExplainParams::default(),
            encoding: "utf-8".to_string(),
            force: false,
        }
    }
}

impl SemweaveConfigBuilder {
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    #[must_use]
    pub fn windows(mut self, windows: Vec<WindowSpec>) -> Self {
        self.windows = windows;
        self
    }

    /// Accepts the `size[_offset[_rewind]]` comma list, e.g. `128_0_16,256`.
    pub fn windows_text(mut self, text: &str) -> Result<Self> {
        self.windows = WindowSpec::parse_list(text)?;
        Ok(self)
    }

    #[must_use]
    pub fn num_results(mut self, num_results: usize) -> Self {
        self.num_results = num_results;
        self
    }

    #[must_use]
    pub fn build_index(mut self, build_index: bool) -> Self {
        self.build_index = build_index;
        self
    }

    #[must_use]
    pub fn index_build_factor(mut self, factor: u32) -> Self {
        self.index_build_factor = factor;
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: RankingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn pool_count(mut self, count: usize) -> Self {
        self.pool_count = Some(count);
        self
    }

    #[must_use]
    pub fn pool_volume(mut self, volume: usize) -> Self {
        self.pool_volume = Some(volume);
        self
    }

    #[must_use]
    pub fn explain(mut self, explain: ExplainParams) -> Self {
        self.explain = explain;
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn build(self) -> Result<SemweaveConfig> {
        if self.windows.is_empty() {
            return Err(SemweaveError::config("at least one window spec is required"));
        }
        for spec in &self.windows {
            spec.validate()?;
        }
        if self.num_results == 0 {
            return Err(SemweaveError::config("num_results must be at least 1"));
        }
        if self.explain.num_splits == 0 || self.explain.divide_factor == 0 {
            return Err(SemweaveError::config(
                "explain num_splits and divide_factor must be at least 1",
            ));
        }
        if self.build_index && self.index_build_factor == 0 {
            return Err(SemweaveError::config(
                "index_build_factor must be at least 1 when an index is requested",
            ));
        }
        Ok(SemweaveConfig {
            cache_dir: self.cache_dir,
            windows: self.windows,
            num_results: self.num_results,
            build_index: self.build_index,
            index_build_factor: self.index_build_factor,
            strategy: self.strategy,
            pool_count: self.pool_count,
            pool_volume: self.pool_volume,
            explain: self.explain,
            encoding: self.encoding,
            force: self.force,
        })
    }
}
