//! Content sources: the seam in front of structural extraction.
//!
//! The engine only ever needs a source's rendered text; PDF and other
//! structured extractors live behind [`ContentSource`] in downstream crates.
//! Every variant carries a `close` hook (a no-op for plain text) that
//! [`ScopedContent`] guarantees to invoke on every exit path.

use std::ops::Deref;
use std::path::Path;

use crate::error::{Result, SemweaveError};

/// A readable document variant.
pub trait ContentSource: Send {
    /// The full rendered text of the source.
    fn raw_text(&self) -> &str;

    /// Path the source was read from.
    fn filename(&self) -> &str;

    /// Short type tag surfaced to clients, e.g. `"text"`.
    fn filetype(&self) -> &'static str;

    /// Releases any backing resources. No-op by default.
    fn close(&mut self) {}
}

/// Plain text file content.
pub struct TextContent {
    text: String,
    filename: String,
}

impl ContentSource for TextContent {
    fn raw_text(&self) -> &str {
        &self.text
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn filetype(&self) -> &'static str {
        "text"
    }
}

/// Guard that closes the wrapped source when dropped, so cleanup happens on
/// early returns and error paths alike.
pub struct ScopedContent<C: ContentSource> {
    inner: Option<C>,
}

impl<C: ContentSource> ScopedContent<C> {
    pub fn new(source: C) -> Self {
        Self {
            inner: Some(source),
        }
    }
}

impl<C: ContentSource> std::fmt::Debug for ScopedContent<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedContent")
            .field("closed", &self.inner.is_none())
            .finish_non_exhaustive()
    }
}

impl<C: ContentSource> Deref for ScopedContent<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.inner.as_ref().expect("content already closed")
    }
}

impl<C: ContentSource> Drop for ScopedContent<C> {
    fn drop(&mut self) {
        if let Some(mut source) = self.inner.take() {
            source.close();
        }
    }
}

/// Reads a plain text source with lossy decoding.
///
/// The configured encoding name participates in the config fingerprint;
/// decoding beyond UTF-8 is a concern of richer [`ContentSource`]
/// implementations.
pub fn read_text(path: &Path, _encoding: &str) -> Result<ScopedContent<TextContent>> {
    let bytes = std::fs::read(path).map_err(|source| SemweaveError::SourceRead {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok(ScopedContent::new(TextContent {
        text,
        filename: path.display().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_plain_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "hello world").unwrap();
        let content = read_text(&path, "utf-8").unwrap();
        assert_eq!(content.raw_text(), "hello world");
        assert_eq!(content.filetype(), "text");
    }

    #[test]
    fn missing_file_is_a_source_read_error() {
        let dir = tempdir().unwrap();
        let err = read_text(&dir.path().join("absent.txt"), "utf-8").unwrap_err();
        assert!(matches!(err, SemweaveError::SourceRead { .. }));
    }

    #[test]
    fn scoped_content_closes_once() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        struct Counting {
            closed: Arc<AtomicU32>,
        }
        impl ContentSource for Counting {
            fn raw_text(&self) -> &str {
                ""
            }
            fn filename(&self) -> &str {
                "counting"
            }
            fn filetype(&self) -> &'static str {
                "text"
            }
            fn close(&mut self) {
                self.closed.fetch_add(1, Ordering::SeqCst);
            }
        }

        let closed = Arc::new(AtomicU32::new(0));
        {
            let _scoped = ScopedContent::new(Counting {
                closed: Arc::clone(&closed),
            });
        }
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
