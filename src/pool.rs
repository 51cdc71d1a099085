//! Greedy batching of windows into embedding requests.
//!
//! The pooler is an explicit object holding the pending windows and their
//! accumulated chunk volume; the indexing pipeline pushes windows in order
//! and drains a full batch whenever either limit trips, with one final
//! unconditional drain at the end of the list.

use crate::window::Window;

/// Accumulates windows until a count or volume limit is reached.
#[derive(Debug)]
pub struct BatchPooler {
    max_count: Option<usize>,
    max_volume: usize,
    pending: Vec<Window>,
    volume: usize,
}

impl BatchPooler {
    /// `max_count` bounds the number of windows per batch (unbounded when
    /// `None`); `max_volume` bounds the accumulated window length.
    pub fn new(max_count: Option<usize>, max_volume: usize) -> Self {
        Self {
            max_count,
            max_volume,
            pending: Vec::new(),
            volume: 0,
        }
    }

    /// Adds a window to the pool; returns `true` once a limit is reached and
    /// the batch should be drained.
    pub fn push(&mut self, window: Window) -> bool {
        self.volume += window.len();
        self.pending.push(window);
        self.max_count.is_some_and(|max| self.pending.len() >= max)
            || self.volume >= self.max_volume
    }

    /// Takes the pending batch, resetting the pool.
    pub fn drain(&mut self) -> Vec<Window> {
        self.volume = 0;
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn volume(&self) -> usize {
        self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: usize, end: usize) -> Window {
        Window { start, end }
    }

    #[test]
    fn count_limit_trips_first() {
        let mut pooler = BatchPooler::new(Some(2), 1_000);
        assert!(!pooler.push(window(0, 10)));
        assert!(pooler.push(window(10, 20)));
        let batch = pooler.drain();
        assert_eq!(batch.len(), 2);
        assert!(pooler.is_empty());
        assert_eq!(pooler.volume(), 0);
    }

    #[test]
    fn volume_limit_trips_first() {
        let mut pooler = BatchPooler::new(Some(100), 15);
        assert!(!pooler.push(window(0, 10)));
        assert!(pooler.push(window(10, 20)));
        assert_eq!(pooler.drain().len(), 2);
    }

    #[test]
    fn unbounded_count_relies_on_volume() {
        let mut pooler = BatchPooler::new(None, 25);
        assert!(!pooler.push(window(0, 10)));
        assert!(!pooler.push(window(10, 20)));
        assert!(pooler.push(window(20, 30)));
    }

    #[test]
    fn drain_resets_for_the_next_batch() {
        let mut pooler = BatchPooler::new(Some(1), 1_000);
        assert!(pooler.push(window(0, 5)));
        assert_eq!(pooler.drain().len(), 1);
        assert!(pooler.push(window(5, 10)));
        assert_eq!(pooler.drain(), vec![window(5, 10)]);
    }
}
