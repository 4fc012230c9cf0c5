use std::collections::HashSet;

use crate::store::PostId;

/// `limit` を個人化候補と発見候補に等分した予算。
///
/// Both halves use integer division, so an odd limit requests one candidate fewer than
/// `limit` in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateBudget {
    pub personalized: usize,
    pub discovery: usize,
}

impl CandidateBudget {
    #[must_use]
    pub fn split(limit: usize) -> Self {
        let half = limit / 2;
        Self {
            personalized: half,
            discovery: half,
        }
    }

    #[must_use]
    pub fn total(self) -> usize {
        self.personalized + self.discovery
    }
}

/// 個人化候補を先に、続けて未出の発見候補を並べる。
///
/// Each stream keeps its source order and no id appears twice in the output.
pub fn merge_candidates<P, D>(personalized: P, discovery: D) -> Vec<PostId>
where
    P: IntoIterator<Item = PostId>,
    D: IntoIterator<Item = PostId>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for post_id in personalized.into_iter().chain(discovery) {
        if seen.insert(post_id) {
            merged.push(post_id);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use uuid::Uuid;

    use super::*;

    fn ids(n: usize) -> Vec<PostId> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 0)]
    #[case(2, 1)]
    #[case(9, 4)]
    #[case(10, 5)]
    fn split_uses_floor_division(#[case] limit: usize, #[case] half: usize) {
        let budget = CandidateBudget::split(limit);
        assert_eq!(budget.personalized, half);
        assert_eq!(budget.discovery, half);
        assert!(budget.total() <= limit);
    }

    #[test]
    fn personalized_precede_discovery() {
        let personalized = ids(2);
        let discovery = ids(2);

        let merged = merge_candidates(personalized.clone(), discovery.clone());

        assert_eq!(
            merged,
            vec![personalized[0], personalized[1], discovery[0], discovery[1]]
        );
    }

    #[test]
    fn ids_from_both_sources_appear_once() {
        let p = ids(3);
        let merged = merge_candidates(vec![p[0], p[1]], vec![p[1], p[2], p[0]]);
        assert_eq!(merged, vec![p[0], p[1], p[2]]);
    }

    #[test]
    fn duplicates_within_a_source_collapse() {
        let p = ids(2);
        let merged = merge_candidates(vec![p[0], p[0], p[1]], Vec::new());
        assert_eq!(merged, vec![p[0], p[1]]);
    }

    #[test]
    fn empty_sources_merge_to_empty() {
        assert!(merge_candidates(Vec::new(), Vec::new()).is_empty());
    }
}
