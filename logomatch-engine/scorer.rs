/// Outcome of scoring one feature comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Good matches over the larger keypoint count, in [0, 1]
    pub score: f64,
    pub is_match: bool,
    pub good_matches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScorer {
    match_threshold: f64,
}

impl SimilarityScorer {
    pub fn new(match_threshold: f64) -> Self {
        Self { match_threshold }
    }

    /// `good / max(a, b)` clamped to [0, 1]; zero when both sides are empty
    pub fn score(good_matches: usize, keypoints_a: usize, keypoints_b: usize) -> f64 {
        let denom = keypoints_a.max(keypoints_b);
        if denom == 0 {
            return 0.0;
        }
        (good_matches as f64 / denom as f64).clamp(0.0, 1.0)
    }

    pub fn is_match(&self, score: f64) -> bool {
        score > self.match_threshold
    }

    pub fn evaluate(&self, good_matches: usize, keypoints_a: usize, keypoints_b: usize) -> Similarity {
        let score = Self::score(good_matches, keypoints_a, keypoints_b);
        Similarity {
            score,
            is_match: self.is_match(score),
            good_matches,
        }
    }
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(0.8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_score_examples() {
        assert_eq!(SimilarityScorer::score(0, 0, 0), 0.0);
        assert_eq!(SimilarityScorer::score(0, 120, 0), 0.0);
        assert_eq!(SimilarityScorer::score(45, 100, 80), 0.45);
        assert_eq!(SimilarityScorer::score(500, 500, 500), 1.0);
    }

    #[test]
    fn test_match_threshold_is_strict() {
        let scorer = SimilarityScorer::default();
        assert!(!scorer.evaluate(80, 100, 100).is_match);
        assert!(scorer.evaluate(81, 100, 100).is_match);
    }

    proptest! {
        #[test]
        fn prop_score_in_unit_interval(good in 0usize..2000, a in 0usize..1000, b in 0usize..1000) {
            let s = SimilarityScorer::score(good, a, b);
            prop_assert!((0.0..=1.0).contains(&s));
            if a == 0 && b == 0 {
                prop_assert_eq!(s, 0.0);
            }
        }

        #[test]
        fn prop_score_monotonic_in_good_matches(good in 0usize..500, a in 1usize..1000, b in 0usize..1000) {
            prop_assert!(SimilarityScorer::score(good, a, b) <= SimilarityScorer::score(good + 1, a, b));
        }
    }
}
