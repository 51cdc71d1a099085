//! Window specifications and the planner that turns them into concrete
//! chunk ranges.
//!
//! A [`WindowSpec`] is the immutable `(size, offset, rewind)` triple that
//! controls how a document's chunk list is covered: windows of `size` chunks,
//! the first starting at `offset`, each overlapping its predecessor by
//! `rewind` chunks. Only the first spec of a configuration is used for
//! interactive search; additional specs materialize alternative granularities
//! into their own cache files.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SemweaveError};

/// Immutable window geometry: `(size, offset, rewind)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Window length in chunks.
    pub size: usize,
    /// Start shift of the first window.
    pub offset: usize,
    /// Chunk overlap between consecutive windows.
    pub rewind: usize,
}

impl WindowSpec {
    pub fn new(size: usize, offset: usize, rewind: usize) -> Self {
        Self {
            size,
            offset,
            rewind,
        }
    }

    /// Rejects geometries that cannot advance: a zero size, or a rewind that
    /// leaves the per-step advance below one chunk.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(SemweaveError::config("window size must be at least 1"));
        }
        if self.rewind >= self.size {
            return Err(SemweaveError::config(format!(
                "window rewind {} leaves no advance for size {}",
                self.rewind, self.size
            )));
        }
        Ok(())
    }

    /// The `size_offset_rewind` label used in cache file names.
    pub fn label(&self) -> String {
        format!("{}_{}_{}", self.size, self.offset, self.rewind)
    }

    /// Parses one `size[_offset[_rewind]]` element; omitted fields default
    /// to zero.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.split('_');
        let mut field = |name: &str| -> Result<Option<usize>> {
            match parts.next() {
                None => Ok(None),
                Some(raw) => raw.trim().parse::<usize>().map(Some).map_err(|_| {
                    SemweaveError::config(format!("invalid window {name} in '{text}'"))
                }),
            }
        };
        let size = field("size")?
            .ok_or_else(|| SemweaveError::config("empty window spec"))?;
        let offset = field("offset")?.unwrap_or(0);
        let rewind = field("rewind")?.unwrap_or(0);
        if parts.next().is_some() {
            return Err(SemweaveError::config(format!(
                "window spec '{text}' has too many fields"
            )));
        }
        let spec = Self::new(size, offset, rewind);
        spec.validate()?;
        Ok(spec)
    }

    /// Parses a comma-separated spec list such as `128_0_16,256`.
    pub fn parse_list(text: &str) -> Result<Vec<Self>> {
        let specs: Vec<Self> = text
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect::<Result<_>>()?;
        if specs.is_empty() {
            return Err(SemweaveError::config("no window specs given"));
        }
        Ok(specs)
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Half-open `[start, end)` chunk range produced by the planner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Concrete windows for one spec over one document, plus the total chunk
/// coverage used for progress and cost estimation.
#[derive(Clone, Debug, Default)]
pub struct WindowPlan {
    pub windows: Vec<Window>,
    pub coverage: usize,
}

/// Lays out windows for `spec` over `chunk_count` chunks.
///
/// The first window starts at `spec.offset`; each subsequent start advances
/// by `size - rewind`; each end is clipped to the chunk count; planning stops
/// with the window whose end reaches it. An offset at or past the end yields
/// an empty plan.
pub fn plan_windows(spec: &WindowSpec, chunk_count: usize) -> Result<WindowPlan> {
    spec.validate()?;
    let step = spec.size - spec.rewind;
    let mut windows = Vec::new();
    let mut coverage = 0usize;
    let mut start = spec.offset;
    while start < chunk_count {
        let end = (start + spec.size).min(chunk_count);
        windows.push(Window { start, end });
        coverage += end - start;
        if end == chunk_count {
            break;
        }
        start += step;
    }
    Ok(WindowPlan { windows, coverage })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_full_triple() {
        let spec = WindowSpec::parse("128_0_16").unwrap();
        assert_eq!(spec, WindowSpec::new(128, 0, 16));
    }

    #[test]
    fn parse_defaults_missing_fields() {
        assert_eq!(WindowSpec::parse("256").unwrap(), WindowSpec::new(256, 0, 0));
        assert_eq!(
            WindowSpec::parse("64_8").unwrap(),
            WindowSpec::new(64, 8, 0)
        );
    }

    #[test]
    fn parse_list_splits_on_commas() {
        let specs = WindowSpec::parse_list("128_0_16,256").unwrap();
        assert_eq!(
            specs,
            vec![WindowSpec::new(128, 0, 16), WindowSpec::new(256, 0, 0)]
        );
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(WindowSpec::parse("0").is_err());
        assert!(plan_windows(&WindowSpec::new(0, 0, 0), 10).is_err());
    }

    #[test]
    fn rewind_consuming_the_advance_is_rejected() {
        assert!(WindowSpec::new(16, 0, 16).validate().is_err());
        assert!(WindowSpec::new(16, 0, 17).validate().is_err());
        assert!(WindowSpec::new(16, 0, 15).validate().is_ok());
    }

    #[test]
    fn final_window_is_clipped() {
        let plan = plan_windows(&WindowSpec::new(4, 0, 1), 10).unwrap();
        let ranges: Vec<(usize, usize)> =
            plan.windows.iter().map(|w| (w.start, w.end)).collect();
        assert_eq!(ranges, vec![(0, 4), (3, 7), (6, 10)]);
        assert_eq!(plan.coverage, 12);
    }

    #[test]
    fn offset_past_end_yields_empty_plan() {
        let plan = plan_windows(&WindowSpec::new(4, 12, 0), 10).unwrap();
        assert!(plan.windows.is_empty());
        assert_eq!(plan.coverage, 0);
    }

    proptest! {
        /// Windows advance monotonically, the final end is exactly the chunk
        /// count, and every non-final window has the full spec size.
        #[test]
        fn planner_covers_to_the_end(
            chunk_count in 1usize..400,
            size in 1usize..64,
            rewind_frac in 0usize..64,
        ) {
            let rewind = rewind_frac % size;
            let spec = WindowSpec::new(size, 0, rewind);
            let plan = plan_windows(&spec, chunk_count).unwrap();
            prop_assert!(!plan.windows.is_empty());
            prop_assert_eq!(plan.windows.last().unwrap().end, chunk_count);
            for pair in plan.windows.windows(2) {
                prop_assert!(pair[1].start > pair[0].start);
                prop_assert_eq!(pair[1].start, pair[0].start + size - rewind);
                prop_assert_eq!(pair[0].len(), size);
            }
        }
    }
}
