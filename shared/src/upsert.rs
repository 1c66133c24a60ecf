use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ContributionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Decides what an upsert of `incoming` does to the stored `existing` record.
///
/// Returns the outcome and the record to write, if any. A stored merged record
/// never goes back to open or closed; points already awarded stay awarded.
pub fn reconcile(
    existing: Option<&ContributionRecord>,
    incoming: ContributionRecord,
) -> (UpsertOutcome, Option<ContributionRecord>) {
    let Some(existing) = existing else {
        return (UpsertOutcome::Created, Some(incoming));
    };

    if existing.is_merged() && !incoming.is_merged() {
        return (UpsertOutcome::Unchanged, None);
    }

    if *existing == incoming {
        (UpsertOutcome::Unchanged, None)
    } else {
        (UpsertOutcome::Updated, Some(incoming))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::PrState;

    fn record(state: PrState, additions: u64) -> ContributionRecord {
        ContributionRecord {
            repo_full_name: "octo/demo".to_string(),
            pr_number: 1,
            author_login: "alice".to_string(),
            state,
            merged_at: state
                .is_merged()
                .then(|| Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            additions,
            deletions: 0,
        }
    }

    #[test]
    fn first_sighting_is_created() {
        let (outcome, write) = reconcile(None, record(PrState::Open, 1));
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(write, Some(record(PrState::Open, 1)));
    }

    #[test]
    fn identical_is_unchanged() {
        let stored = record(PrState::Open, 1);
        assert_eq!(
            reconcile(Some(&stored), stored.clone()),
            (UpsertOutcome::Unchanged, None)
        );
    }

    #[test]
    fn open_can_transition() {
        let stored = record(PrState::Open, 1);
        for next in [PrState::Merged, PrState::Closed] {
            let (outcome, write) = reconcile(Some(&stored), record(next, 1));
            assert_eq!(outcome, UpsertOutcome::Updated);
            assert_eq!(write.unwrap().state, next);
        }
    }

    #[test]
    fn closed_can_reopen() {
        let stored = record(PrState::Closed, 1);
        let (outcome, write) = reconcile(Some(&stored), record(PrState::Open, 1));
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(write.unwrap().state, PrState::Open);
    }

    #[test]
    fn merged_never_regresses() {
        let stored = record(PrState::Merged, 1);
        for stale in [PrState::Open, PrState::Closed] {
            assert_eq!(
                reconcile(Some(&stored), record(stale, 99)),
                (UpsertOutcome::Unchanged, None)
            );
        }
    }

    #[test]
    fn merged_picks_up_new_diff_size() {
        let stored = record(PrState::Merged, 1);
        let (outcome, write) = reconcile(Some(&stored), record(PrState::Merged, 40));
        assert_eq!(outcome, UpsertOutcome::Updated);
        let written = write.unwrap();
        assert_eq!(written.state, PrState::Merged);
        assert_eq!(written.additions, 40);
    }
}
