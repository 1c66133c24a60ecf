use serde::{Deserialize, Serialize};

use crate::ContributionRecord;

/// Points awarded for a single merged contribution.
pub trait Scoring: Send + Sync {
    fn points(&self, record: &ContributionRecord) -> u64;
}

fn default_points_per_pr() -> u64 {
    10
}

/// Flat points per merged PR plus an optional, capped bonus for diff size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsFormula {
    #[serde(default = "default_points_per_pr")]
    pub points_per_pr: u64,
    /// One bonus point per this many changed lines. No size bonus when unset or zero.
    #[serde(default)]
    pub lines_per_bonus_point: Option<u64>,
    #[serde(default)]
    pub max_size_bonus: u64,
}

impl Default for PointsFormula {
    fn default() -> Self {
        Self {
            points_per_pr: default_points_per_pr(),
            lines_per_bonus_point: None,
            max_size_bonus: 0,
        }
    }
}

impl PointsFormula {
    pub fn size_bonus(&self, record: &ContributionRecord) -> u64 {
        self.lines_per_bonus_point
            .and_then(|lines| record.lines_changed().checked_div(lines))
            .unwrap_or_default()
            .min(self.max_size_bonus)
    }
}

impl Scoring for PointsFormula {
    fn points(&self, record: &ContributionRecord) -> u64 {
        if !record.is_merged() {
            return 0;
        }
        self.points_per_pr.saturating_add(self.size_bonus(record))
    }
}
