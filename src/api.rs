//! Transport-facing request and response payloads.
//!
//! The HTTP layer itself lives outside this crate; these types define the
//! JSON shapes any transport exchanges with the engine.

use serde::{Deserialize, Serialize};

/// One weighted query line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeightedQuery {
    pub query: String,
    pub weight: f32,
}

/// A preference vote on a previously returned result: the referenced
/// window's stored embedding joins the combined query vector with the given
/// weight (negative weights push away).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Preference {
    pub filename: String,
    /// Window index of the preferred result.
    pub index: usize,
    pub weight: f32,
}

/// Body of a ranked-search request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub queries: Vec<WeightedQuery>,
    #[serde(default)]
    pub preferences: Vec<Preference>,
}

/// One ranked window in a query response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryResult {
    pub text: String,
    pub distance: f32,
    /// Chunk range `[start, end)` of the matched window.
    pub offset: (usize, usize),
    /// Window index within the document's first window spec.
    pub index: usize,
    pub filename: String,
    pub queries: Vec<WeightedQuery>,
    pub preferences: Vec<Preference>,
}

/// Results of one document, ordered best-first; files are themselves ordered
/// by their best hit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileResults {
    pub filename: String,
    pub results: Vec<QueryResult>,
}

/// Body of an explain request for one matched window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub filename: String,
    pub offset: (usize, usize),
    pub queries: Vec<WeightedQuery>,
    #[serde(default)]
    pub preferences: Vec<Preference>,
}

/// Segment classification in an explanation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Normal,
    Highlight,
}

/// One contiguous span of an explained window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
}

/// Listing entry for one ingested document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileInfo {
    pub basename: String,
    pub filename: String,
    pub filetype: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_request_defaults_preferences() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"queries":[{"query":"ships","weight":1.0}]}"#).unwrap();
        assert_eq!(req.queries.len(), 1);
        assert!(req.preferences.is_empty());
    }

    #[test]
    fn offsets_serialize_as_pairs() {
        let result = QueryResult {
            text: "t".into(),
            distance: 0.5,
            offset: (3, 7),
            index: 1,
            filename: "doc.txt".into(),
            queries: Vec::new(),
            preferences: Vec::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["offset"], serde_json::json!([3, 7]));
    }

    #[test]
    fn segment_kind_uses_lowercase_type_field() {
        let segment = Segment {
            text: "hot".into(),
            kind: SegmentKind::Highlight,
        };
        let json = serde_json::to_value(&segment).unwrap();
        assert_eq!(json["type"], "highlight");
        assert_eq!(json["text"], "hot");
    }
}
