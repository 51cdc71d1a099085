//! Content and configuration fingerprints, and the cache paths they key.
//!
//! Every cache artifact is addressed by a pair of stable hex identifiers:
//! the content id (digest of the source file's bytes) and the config id
//! (digest of the serialized embedding configuration). Changing any covered
//! configuration field moves every dependent artifact to a fresh namespace;
//! there is no explicit invalidation step anywhere in the crate.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, SemweaveError};
use crate::window::WindowSpec;

/// Hex characters kept from each digest.
const FINGERPRINT_LEN: usize = 16;

/// Configuration fields covered by the config fingerprint.
///
/// Field order is fixed by the struct definition, so the serialized JSON is
/// deterministic across runs.
#[derive(Debug, Serialize)]
pub struct ConfigDigest<'a> {
    pub model_id: &'a str,
    pub model_params: &'a serde_json::Value,
    pub encoding: &'a str,
    pub windows: Vec<String>,
    pub dimensions: usize,
    pub index: bool,
    pub index_build_factor: u32,
}

fn truncated_hex(hasher: Sha256) -> String {
    let digest = hex::encode(hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

/// Streaming digest of the file at `path`.
///
/// An unreadable source is reported as [`SemweaveError::SourceRead`], which
/// is fatal for that document only.
pub fn content_id(path: &Path) -> Result<String> {
    let map_err = |source| SemweaveError::SourceRead {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(map_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file.read(&mut buf).map_err(map_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(truncated_hex(hasher))
}

/// Digest of the serialized configuration fields.
pub fn config_id(digest: &ConfigDigest<'_>) -> Result<String> {
    let serialized = serde_json::to_vec(digest)?;
    let mut hasher = Sha256::new();
    hasher.update(&serialized);
    Ok(truncated_hex(hasher))
}

/// Cache files for one window spec of one document.
#[derive(Clone, Debug)]
pub struct SpecPaths {
    pub embeddings: PathBuf,
    pub index: PathBuf,
}

/// All cache files belonging to one `(content, config)` fingerprint pair.
///
/// The naming scheme is a stability contract: resumed runs locate their
/// artifacts purely by recomputing these names.
#[derive(Clone, Debug)]
pub struct CachePaths {
    pub tokens: PathBuf,
    pub config: PathBuf,
    pub specs: Vec<SpecPaths>,
}

impl CachePaths {
    pub fn resolve(
        cache_dir: &Path,
        content_id: &str,
        config_id: &str,
        windows: &[WindowSpec],
        index_build_factor: u32,
    ) -> Self {
        let specs = windows
            .iter()
            .map(|spec| SpecPaths {
                embeddings: cache_dir.join(format!(
                    "embeddings-{content_id}-{config_id}-{}.bin",
                    spec.label()
                )),
                index: cache_dir.join(format!(
                    "index-{content_id}-{config_id}-{}-{index_build_factor}.idx",
                    spec.label()
                )),
            })
            .collect();
        Self {
            tokens: cache_dir.join(format!("tokens-{content_id}-{config_id}.json")),
            config: cache_dir.join(format!("config-{content_id}-{config_id}.json")),
            specs,
        }
    }
}
