//! Combined streams: per-cycle sums over the primary subset of a node's entities

use crate::history::{Epoch, HistoryStore, InterfaceSample, Sample, VolumeSample};

/// A sample family that can be summed field by field.
pub trait Combine: Sample {
    fn zero(epoch: Epoch) -> Self;
    fn accumulate(&mut self, other: &Self);
}

impl Combine for InterfaceSample {
    fn zero(epoch: Epoch) -> Self {
        Self { epoch, in_avg_bps: 0, out_avg_bps: 0 }
    }

    fn accumulate(&mut self, other: &Self) {
        self.in_avg_bps = self.in_avg_bps.saturating_add(other.in_avg_bps);
        self.out_avg_bps = self.out_avg_bps.saturating_add(other.out_avg_bps);
    }
}

impl Combine for VolumeSample {
    fn zero(epoch: Epoch) -> Self {
        Self { epoch, read_avg_bps: 0, write_avg_bps: 0 }
    }

    fn accumulate(&mut self, other: &Self) {
        self.read_avg_bps = self.read_avg_bps.saturating_add(other.read_avg_bps);
        self.write_avg_bps = self.write_avg_bps.saturating_add(other.write_avg_bps);
    }
}

/// Running sum for one stats cycle. The combined sample always carries the
/// cycle's epoch, whatever the constituents say.
#[derive(Debug, Clone)]
pub struct AggregateCombiner<S> {
    total: S,
    contributors: usize,
}

impl<S: Combine> AggregateCombiner<S> {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            total: S::zero(epoch),
            contributors: 0,
        }
    }

    /// Count `sample` only when its entity is primary.
    pub fn add(&mut self, sample: &S, primary: bool) {
        if primary {
            self.total.accumulate(sample);
            self.contributors += 1;
        }
    }

    pub fn contributors(&self) -> usize {
        self.contributors
    }

    pub fn total(&self) -> &S {
        &self.total
    }

    /// Append the sum to the store's combined stream.
    pub fn commit(self, store: &mut HistoryStore<S>) -> S {
        store.append_combined(self.total.clone());
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(epoch: Epoch, inb: u64, outb: u64) -> InterfaceSample {
        InterfaceSample { epoch, in_avg_bps: inb, out_avg_bps: outb }
    }

    #[test]
    fn test_only_primaries_are_summed() {
        let mut combiner = AggregateCombiner::new(1_700_000_000);
        combiner.add(&net(1_700_000_000, 100, 10), true);
        combiner.add(&net(1_700_000_000, 200, 20), true);
        combiner.add(&net(1_700_000_000, 5_000, 500), false);

        let mut store = HistoryStore::new(16);
        let sum = combiner.commit(&mut store);
        assert_eq!(sum, net(1_700_000_000, 300, 30));
        assert_eq!(store.combined().and_then(|b| b.latest()), Some(&sum));
    }

    #[test]
    fn test_empty_cycle_commits_zero_at_epoch() {
        let combiner: AggregateCombiner<VolumeSample> = AggregateCombiner::new(42);
        assert_eq!(combiner.contributors(), 0);
        let mut store = HistoryStore::new(16);
        let sum = combiner.commit(&mut store);
        assert_eq!(sum, VolumeSample { epoch: 42, read_avg_bps: 0, write_avg_bps: 0 });
    }

    #[test]
    fn test_sum_saturates() {
        let mut combiner = AggregateCombiner::new(1);
        combiner.add(&net(1, u64::MAX, 0), true);
        combiner.add(&net(1, 1, 0), true);
        assert_eq!(combiner.total().in_avg_bps, u64::MAX);
    }
}
