use logomatch_core::{Descriptor, DescriptorSet, MatchCandidate, DESCRIPTOR_BYTES};
use rayon::prelude::*;

/// Largest possible Hamming distance between two descriptors
pub const MAX_DISTANCE: u32 = (DESCRIPTOR_BYTES * 8) as u32;

/// Number of differing bits, compared eight bytes at a time
#[inline]
pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.chunks_exact(8)
        .zip(b.chunks_exact(8))
        .map(|(x, y)| {
            let x = u64::from_le_bytes(x.try_into().unwrap_or([0; 8]));
            let y = u64::from_le_bytes(y.try_into().unwrap_or([0; 8]));
            (x ^ y).count_ones()
        })
        .sum()
}

/// Exhaustive nearest-neighbour matcher under Hamming distance.
///
/// With cross-check a pair `(i, j)` is reported only when `train[j]` is the
/// nearest neighbour of `query[i]` and `query[i]` the nearest neighbour of
/// `train[j]`. Equal distances resolve to the lower index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BruteForceMatcher {
    cross_check: bool,
}

impl BruteForceMatcher {
    pub fn new(cross_check: bool) -> Self {
        Self { cross_check }
    }

    pub fn cross_check(&self) -> bool {
        self.cross_check
    }

    /// Match every query descriptor against the train set, ordered by query index
    pub fn match_sets(&self, query: &DescriptorSet, train: &DescriptorSet) -> Vec<MatchCandidate> {
        if query.is_empty() || train.is_empty() {
            return Vec::new();
        }

        let forward: Vec<(usize, u32)> = query
            .as_slice()
            .par_iter()
            .map(|d| Self::nearest(d, train.as_slice()))
            .collect();

        if !self.cross_check {
            return forward
                .into_iter()
                .enumerate()
                .map(|(query_idx, (train_idx, distance))| MatchCandidate {
                    query_idx,
                    train_idx,
                    distance,
                })
                .collect();
        }

        let backward: Vec<(usize, u32)> = train
            .as_slice()
            .par_iter()
            .map(|d| Self::nearest(d, query.as_slice()))
            .collect();

        forward
            .into_iter()
            .enumerate()
            .filter(|&(query_idx, (train_idx, _))| backward[train_idx].0 == query_idx)
            .map(|(query_idx, (train_idx, distance))| MatchCandidate {
                query_idx,
                train_idx,
                distance,
            })
            .collect()
    }

    /// Index and distance of the closest row; `rows` must not be empty
    fn nearest(d: &Descriptor, rows: &[Descriptor]) -> (usize, u32) {
        let mut best = (0, u32::MAX);
        for (idx, row) in rows.iter().enumerate() {
            let distance = hamming_distance(d, row);
            if distance < best.1 {
                best = (idx, distance);
                if distance == 0 {
                    break;
                }
            }
        }
        best
    }
}
