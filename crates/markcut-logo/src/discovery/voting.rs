use markcut_types::{CancelToken, Cancelled};

use super::candidate::Candidate;

/// Pairwise scoring of corner candidates.
pub trait CandidateMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_match(&self, a: &Candidate, b: &Candidate) -> bool;

    /// Compares `candidate` with every candidate already retained for the same
    /// corner. Each matching pair gains one hit on both sides. Returns the
    /// number of matches found.
    fn vote(
        &self,
        pool: &mut [Candidate],
        candidate: &mut Candidate,
        cancel: &CancelToken,
    ) -> Result<u32, Cancelled> {
        let mut matches = 0;
        for retained in pool.iter_mut() {
            cancel.check()?;
            if self.is_match(retained, candidate) {
                retained.hits += 1;
                candidate.hits += 1;
                matches += 1;
            }
        }
        Ok(matches)
    }
}

/// Two candidates match when their luma edges overlap strongly and, when both
/// carry chroma, their chroma planes agree almost everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutualVoting {
    luma_match_rate: f32,
    chroma_match_rate: f32,
}

impl MutualVoting {
    pub fn new(luma_match_rate: f32, chroma_match_rate: f32) -> Self {
        Self {
            luma_match_rate,
            chroma_match_rate,
        }
    }
}

impl CandidateMatcher for MutualVoting {
    fn name(&self) -> &'static str {
        "mutual-voting"
    }

    fn is_match(&self, a: &Candidate, b: &Candidate) -> bool {
        let Some(agreement) = a.agreement(b) else {
            return false;
        };
        let Some(luma) = agreement.luma_rate() else {
            return false;
        };
        if luma <= self.luma_match_rate {
            return false;
        }
        agreement
            .chroma_rate()
            .is_none_or(|chroma| chroma > self.chroma_match_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::candidate::{CandidateStorage, StorageKind};
    use crate::sobel::{EDGE, EdgePlane};

    fn candidate(frame_number: u64, edges: &[(u32, u32)]) -> Candidate {
        let mut luma = EdgePlane::blank(16, 8);
        for &(x, y) in edges {
            luma.set(x, y, EDGE);
        }
        Candidate {
            frame_number,
            storage: CandidateStorage::from_planes(vec![luma], StorageKind::Unpacked),
            hits: 0,
        }
    }

    #[test]
    fn identical_candidates_vote_for_each_other() {
        let voting = MutualVoting::new(0.86, 0.9);
        let edges = [(4, 4), (5, 4), (6, 4), (7, 4)];
        let mut pool = vec![candidate(0, &edges), candidate(12, &[(1, 1)])];
        let mut fresh = candidate(24, &edges);
        let matches = voting
            .vote(&mut pool, &mut fresh, &CancelToken::new())
            .unwrap();
        assert_eq!(matches, 1);
        assert_eq!(fresh.hits, 1);
        assert_eq!(pool[0].hits, 1);
        assert_eq!(pool[1].hits, 0);
    }

    #[test]
    fn blank_pairs_never_match() {
        let voting = MutualVoting::new(0.86, 0.9);
        assert!(!voting.is_match(&candidate(0, &[]), &candidate(1, &[])));
    }

    #[test]
    fn rate_must_exceed_threshold() {
        let voting = MutualVoting::new(0.75, 0.9);
        // 3 shared of 4 in either: exactly 0.75.
        let a = candidate(0, &[(1, 1), (2, 1), (3, 1), (4, 1)]);
        let b = candidate(1, &[(1, 1), (2, 1), (3, 1)]);
        assert!(!voting.is_match(&a, &b));
    }

    #[test]
    fn cancellation_stops_voting() {
        let voting = MutualVoting::new(0.86, 0.9);
        let mut pool = vec![candidate(0, &[(1, 1)])];
        let mut fresh = candidate(1, &[(1, 1)]);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(voting.vote(&mut pool, &mut fresh, &cancel).is_err());
        assert_eq!(fresh.hits, 0);
    }
}
