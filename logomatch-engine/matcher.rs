use logomatch_core::{DescriptorSet, MatchCandidate};

use crate::config::MatchingConfig;
use crate::error::MatchError;
use crate::ledger::{LedgerScope, Native};
use crate::provider::{MatchVector, VisionProvider};

/// Cross-checked brute-force matching plus the good-match filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatcher {
    good_match_threshold: u32,
    cross_check: bool,
}

impl DescriptorMatcher {
    pub fn new(cfg: &MatchingConfig) -> Self {
        Self {
            good_match_threshold: cfg.good_match_threshold,
            cross_check: cfg.cross_check,
        }
    }

    pub fn good_match_threshold(&self) -> u32 {
        self.good_match_threshold
    }

    /// Match `query` against `train`; the matcher and the match vector are
    /// owned by `scope`.
    pub fn match_in<'s>(
        &self,
        provider: &dyn VisionProvider,
        scope: &'s LedgerScope,
        query: &DescriptorSet,
        train: &DescriptorSet,
    ) -> Result<Native<'s, MatchVector>, MatchError> {
        if query.is_empty() {
            return Err(MatchError::EmptyDescriptorSet("query"));
        }
        if train.is_empty() {
            return Err(MatchError::EmptyDescriptorSet("train"));
        }

        let matcher = provider.matcher(scope, self.cross_check)?;
        Ok(provider.match_descriptors(scope, &matcher, query, train)?)
    }

    #[inline]
    pub fn is_good(&self, candidate: &MatchCandidate) -> bool {
        candidate.distance < self.good_match_threshold
    }

    pub fn good_matches<'a>(&self, matches: &'a [MatchCandidate]) -> impl Iterator<Item = &'a MatchCandidate> + 'a {
        let threshold = self.good_match_threshold;
        matches.iter().filter(move |m| m.distance < threshold)
    }
}

impl Default for DescriptorMatcher {
    fn default() -> Self {
        Self::new(&MatchingConfig::default())
    }
}
