//! Descriptor matching and Lowe's ratio test.

use imageproc::binary_descriptors::BinaryDescriptor;
use imageproc::binary_descriptors::brief::BriefDescriptor;

/// A candidate correspondence between a query and a train descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DMatch {
    /// Index into the query (source image) descriptors.
    pub query: usize,
    /// Index into the train (reference image) descriptors.
    pub train: usize,
    /// Descriptor distance; smaller is more similar.
    pub distance: u32,
}

/// Distance between two descriptors of the same kind.
pub trait DescriptorDistance {
    /// Smaller is more similar; identical descriptors have distance 0.
    fn distance(&self, other: &Self) -> u32;
}

impl DescriptorDistance for BriefDescriptor {
    fn distance(&self, other: &Self) -> u32 {
        self.hamming_distance(other)
    }
}

/// Finds the nearest train descriptors for each query descriptor.
pub trait DescriptorMatcher<D> {
    /// For every query descriptor, up to `k` candidates ordered by
    /// ascending distance. The outer vector is index-aligned with `query`.
    fn knn_match(&self, query: &[D], train: &[D], k: usize) -> Vec<Vec<DMatch>>;
}

/// Exhaustive nearest-neighbour search.
///
/// Candidates with equal distance are ordered by train index.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl<D: DescriptorDistance> DescriptorMatcher<D> for BruteForceMatcher {
    fn knn_match(&self, query: &[D], train: &[D], k: usize) -> Vec<Vec<DMatch>> {
        query
            .iter()
            .enumerate()
            .map(|(qi, q)| {
                let mut candidates: Vec<DMatch> = train
                    .iter()
                    .enumerate()
                    .map(|(ti, t)| DMatch {
                        query: qi,
                        train: ti,
                        distance: q.distance(t),
                    })
                    .collect();
                candidates.sort_by_key(|m| (m.distance, m.train));
                candidates.truncate(k);
                candidates
            })
            .collect()
    }
}

/// Lowe's ratio test: keep the best candidate of each entry when its
/// distance is strictly less than `ratio` times the second best.
///
/// Entries with fewer than two candidates are dropped.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ratio_test(knn: &[Vec<DMatch>], ratio: f32) -> Vec<DMatch> {
    knn.iter()
        .filter_map(|candidates| match candidates.as_slice() {
            [best, second, ..] if (best.distance as f32) < ratio * second.distance as f32 => {
                Some(*best)
            }
            _ => None,
        })
        .collect()
}
