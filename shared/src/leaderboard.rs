use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{ContributionRecord, GithubHandle, Scoring};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub contributor_login: GithubHandle,
    #[serde(rename = "mergedPRCount")]
    pub merged_pr_count: u64,
    pub points: u64,
    /// 1-based position in the sorted leaderboard.
    pub rank: u32,
}

/// Rebuilds the whole leaderboard from the full record set.
///
/// Only merged records count. Entries are ordered by points, then merged PR
/// count (both descending), then login ascending, so equal inputs always give
/// equal output.
pub fn recompute<'a>(
    records: impl IntoIterator<Item = &'a ContributionRecord>,
    scoring: &dyn Scoring,
) -> Vec<LeaderboardEntry> {
    let mut totals: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for record in records.into_iter().filter(|r| r.is_merged()) {
        let (count, points) = totals.entry(record.author_login.as_str()).or_default();
        *count += 1;
        *points = points.saturating_add(scoring.points(record));
    }

    totals
        .into_iter()
        .sorted_by(|(login_a, (count_a, points_a)), (login_b, (count_b, points_b))| {
            points_b
                .cmp(points_a)
                .then(count_b.cmp(count_a))
                .then(login_a.cmp(login_b))
        })
        .enumerate()
        .map(|(place, (login, (merged_pr_count, points)))| LeaderboardEntry {
            contributor_login: login.to_string(),
            merged_pr_count,
            points,
            rank: place as u32 + 1,
        })
        .collect()
}
