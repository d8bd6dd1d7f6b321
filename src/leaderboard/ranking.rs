//! Rank calculation (standard competition ranking, SQL `RANK()`)
//!
//! Ordering is strictly descending by total score. Equal totals share a
//! rank, and the next distinct total takes its 1-based position, so gaps
//! appear after ties: `[100, 100, 90]` ranks as `[1, 1, 3]`.
//!
//! Order among exactly-tied players follows input order (stable sort).
//! Pure functions only: no I/O, no shared state.

use super::types::PlayerId;

/// Player total with its computed rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedScore {
    pub player_id: PlayerId,
    pub total_score: i64,
    pub rank: u64,
}

/// Rank arbitrary items by a score key
///
/// Returns items sorted descending by `score`, each paired with its rank.
pub fn rank_by<T, F>(mut items: Vec<T>, score: F) -> Vec<(T, u64)>
where
    F: Fn(&T) -> i64,
{
    // sort_by is stable, ties keep their input order
    items.sort_by(|a, b| score(b).cmp(&score(a)));

    let mut ranked = Vec::with_capacity(items.len());
    let mut previous: Option<(i64, u64)> = None;

    for (position, item) in items.into_iter().enumerate() {
        let total = score(&item);
        let rank = match previous {
            Some((prev_total, prev_rank)) if prev_total == total => prev_rank,
            _ => position as u64 + 1,
        };
        previous = Some((total, rank));
        ranked.push((item, rank));
    }

    ranked
}

/// Compute ranks for `(player_id, total_score)` pairs
pub fn compute_ranks<I>(aggregates: I) -> Vec<RankedScore>
where
    I: IntoIterator<Item = (PlayerId, i64)>,
{
    rank_by(aggregates.into_iter().collect(), |(_, total)| *total)
        .into_iter()
        .map(|((player_id, total_score), rank)| RankedScore {
            player_id,
            total_score,
            rank,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranks_of(ranked: &[RankedScore]) -> Vec<u64> {
        ranked.iter().map(|r| r.rank).collect()
    }

    #[test]
    fn test_distinct_scores() {
        let ranked = compute_ranks(vec![
            (PlayerId(2), 80),
            (PlayerId(1), 90),
            (PlayerId(3), 10),
        ]);

        assert_eq!(ranked[0].player_id, PlayerId(1));
        assert_eq!(ranked[1].player_id, PlayerId(2));
        assert_eq!(ranked[2].player_id, PlayerId(3));
        assert_eq!(ranks_of(&ranked), vec![1, 2, 3]);
    }

    #[test]
    fn test_ties_share_rank_with_gap_after() {
        let ranked = compute_ranks(vec![
            (PlayerId(1), 100),
            (PlayerId(2), 100),
            (PlayerId(3), 90),
        ]);

        assert_eq!(ranks_of(&ranked), vec![1, 1, 3]);
    }

    #[test]
    fn test_tie_in_the_middle() {
        let ranked = compute_ranks(vec![
            (PlayerId(1), 50),
            (PlayerId(2), 70),
            (PlayerId(3), 70),
            (PlayerId(4), 70),
            (PlayerId(5), 90),
            (PlayerId(6), 10),
        ]);

        assert_eq!(ranks_of(&ranked), vec![1, 2, 2, 2, 5, 6]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let ranked = compute_ranks(vec![
            (PlayerId(9), 40),
            (PlayerId(3), 40),
            (PlayerId(5), 40),
        ]);

        let ids: Vec<_> = ranked.iter().map(|r| r.player_id).collect();
        assert_eq!(ids, vec![PlayerId(9), PlayerId(3), PlayerId(5)]);
        assert_eq!(ranks_of(&ranked), vec![1, 1, 1]);
    }

    #[test]
    fn test_rank_matches_count_of_greater() {
        let totals = vec![5, 3, 5, 8, 0, 3, 3, 8, 1];
        let ranked = compute_ranks(
            totals
                .iter()
                .enumerate()
                .map(|(i, t)| (PlayerId(i as i64), *t)),
        );

        for entry in &ranked {
            let greater = totals.iter().filter(|t| **t > entry.total_score).count() as u64;
            assert_eq!(entry.rank, greater + 1);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(compute_ranks(Vec::new()).is_empty());
    }
}
