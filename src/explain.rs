//! Leave-one-out attribution of a matched window's similarity score.
//!
//! For each candidate sub-span the *complement* of the span (the window with
//! the span removed) is embedded and compared against the query vector. The
//! spans whose removal hurts the similarity most are the hotspots; they are
//! rendered as highlight segments between normal ones.

use tracing::debug;

use crate::api::{Segment, SegmentKind};
use crate::config::ExplainParams;
use crate::document::render_span;
use crate::embed::EmbeddingCapability;
use crate::error::Result;
use crate::vecmath;

/// Candidate spans over a window of `len` chunks: `num_splits` spans of
/// length `ceil(len / divide_factor)` spaced `ceil(len / num_splits)` apart,
/// clipped to the window.
fn candidate_spans(len: usize, params: &ExplainParams) -> Vec<(usize, usize)> {
    if len == 0 {
        return Vec::new();
    }
    let span_len = len.div_ceil(params.divide_factor);
    let stride = len.div_ceil(params.num_splits);
    let mut spans = Vec::new();
    for i in 0..params.num_splits {
        let start = i * stride;
        if start >= len {
            break;
        }
        spans.push((start, (start + span_len).min(len)));
    }
    spans
}

/// Explains which parts of `chunks` (one matched window) drove its
/// similarity to `query`, returning ordered normal/highlight segments.
///
/// Deterministic: identical chunks, query vector, and parameters always
/// yield identical spans and segment boundaries.
pub async fn explain_window(
    capability: &dyn EmbeddingCapability,
    chunks: &[String],
    query: &[f32],
    params: &ExplainParams,
) -> Result<Vec<Segment>> {
    let len = chunks.len();
    let spans = candidate_spans(len, params);
    if spans.is_empty() {
        return Ok(Vec::new());
    }

    // Similarity of the window *without* each span; the lowest remainder
    // marks the span that carried the most weight.
    let mut ranked: Vec<((usize, usize), f32)> = Vec::with_capacity(spans.len());
    for &(start, end) in &spans {
        let complement = format!(
            "{}{}",
            render_span(chunks, 0, start),
            render_span(chunks, end, len)
        );
        let embedding = capability.embed_single(&complement).await?;
        ranked.push(((start, end), vecmath::cosine(&embedding, query)));
    }
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(params.num_highlights);
    debug!(candidates = spans.len(), highlights = ranked.len(), "explained window");

    let mut selected: Vec<(usize, usize)> = ranked.into_iter().map(|(span, _)| span).collect();
    selected.sort_by_key(|span| span.0);

    let mut segments = Vec::new();
    let mut push = |start: usize, end: usize, kind: SegmentKind| {
        if start < end {
            segments.push(Segment {
                text: render_span(chunks, start, end),
                kind,
            });
        }
    };
    let mut cursor = 0usize;
    for (start, end) in selected {
        push(cursor, start, SegmentKind::Normal);
        push(start.max(cursor), end, SegmentKind::Highlight);
        cursor = cursor.max(end);
    }
    push(cursor, len, SegmentKind::Normal);
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{ModelFingerprint, TokenSeq};
    use crate::window::Window;
    use async_trait::async_trait;

    /// Deterministic stand-in: embeds text as [letter count, digit count],
    /// so removing the digit-heavy span visibly drops similarity to a
    /// digit-oriented query.
    struct CountingModel;

    #[async_trait]
    impl EmbeddingCapability for CountingModel {
        fn dimensionality(&self) -> usize {
            2
        }
        fn is_asymmetric(&self) -> bool {
            false
        }
        fn config_fingerprint_fields(&self) -> ModelFingerprint {
            ModelFingerprint {
                model_id: "counting".into(),
                params: serde_json::Value::Null,
            }
        }
        async fn get_tokens(&self, text: &str) -> Result<TokenSeq> {
            Ok(TokenSeq::new(crate::embed::tokenize_pieces(text)))
        }
        fn get_chunks(&self, _text: &str, tokens: &TokenSeq) -> Result<Vec<String>> {
            Ok(tokens.pieces().to_vec())
        }
        async fn embed_batch(
            &self,
            tokens: &TokenSeq,
            windows: &[Window],
        ) -> Result<Vec<Vec<f32>>> {
            let mut rows = Vec::new();
            for window in windows {
                rows.push(self.embed_single(&tokens.render(window)).await?);
            }
            Ok(rows)
        }
        async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
            let letters = text.chars().filter(|c| c.is_alphabetic()).count() as f32;
            let digits = text.chars().filter(|c| c.is_numeric()).count() as f32;
            Ok(vec![letters, digits])
        }
    }

    fn chunks_of(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| format!("{w} ")).collect()
    }

    #[test]
    fn spans_are_clipped_and_spaced() {
        let params = ExplainParams {
            num_splits: 3,
            divide_factor: 2,
            num_highlights: 2,
        };
        assert_eq!(candidate_spans(6, &params), vec![(0, 3), (2, 5), (4, 6)]);
        assert!(candidate_spans(0, &params).is_empty());
    }

    #[tokio::test]
    async fn digit_heavy_span_is_highlighted() {
        let chunks = chunks_of(&["alpha", "beta", "gamma", "111", "222", "delta"]);
        let query = vec![0.0, 1.0];
        let params = ExplainParams {
            num_splits: 3,
            divide_factor: 3,
            num_highlights: 1,
        };
        let segments = explain_window(&CountingModel, &chunks, &query, &params)
            .await
            .unwrap();

        let highlighted: Vec<&str> = segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Highlight)
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(highlighted.len(), 1);
        assert!(highlighted[0].contains("111"));

        // Segments concatenate back to the window text.
        let rebuilt: String = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(rebuilt, chunks.concat());
    }

    #[tokio::test]
    async fn explanation_is_deterministic() {
        let chunks = chunks_of(&["one", "two", "3", "4", "five", "six", "7"]);
        let query = vec![0.3, 0.7];
        let params = ExplainParams::default();
        let first = explain_window(&CountingModel, &chunks, &query, &params)
            .await
            .unwrap();
        let second = explain_window(&CountingModel, &chunks, &query, &params)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn overlapping_highlights_are_clamped() {
        let chunks = chunks_of(&["a", "b", "c", "d"]);
        let query = vec![1.0, 0.0];
        let params = ExplainParams {
            num_splits: 4,
            divide_factor: 2,
            num_highlights: 2,
        };
        let segments = explain_window(&CountingModel, &chunks, &query, &params)
            .await
            .unwrap();
        let rebuilt: String = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(rebuilt, chunks.concat());
    }
}
