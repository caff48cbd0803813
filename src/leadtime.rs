use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::devops::{TeamContext, Tracker};
use crate::model::work_item::{LeadTime, Revision};

/// Replay state changes in chronological order.
///
/// Start is the first move into active work (or the first move into a
/// not-started state when the item never became active). Finish is the last
/// move into "Done", cleared whenever a start or create timestamp is first
/// recorded. Rework after "Done" is not visible here.
pub fn reduce(revisions: &[Revision]) -> LeadTime {
    let mut create: Option<DateTime<Utc>> = None;
    let mut start: Option<DateTime<Utc>> = None;
    let mut finish: Option<DateTime<Utc>> = None;

    for rev in revisions {
        let Some(change) = rev.state.as_ref() else {
            continue;
        };
        // A rewrite of the same value is not a transition.
        if change.old_value == change.new_value {
            continue;
        }
        let Some(state) = change.new_value.as_deref() else {
            continue;
        };
        match state {
            "New" | "To Do" if create.is_none() => {
                create = Some(rev.changed_date);
                finish = None;
            }
            "Started" | "In Progress" if start.is_none() => {
                start = Some(rev.changed_date);
                finish = None;
            }
            "Done" => finish = Some(rev.changed_date),
            _ => {}
        }
    }

    LeadTime {
        start: start.or(create),
        finish,
    }
}

/// Fetch an item's history and derive its lead time.
pub async fn lead_time(tracker: &dyn Tracker, team: &TeamContext, id: i64) -> Result<LeadTime> {
    let revisions = tracker
        .get_revisions(team, id)
        .await
        .with_context(|| format!("Failed to fetch history for work item {id}"))?;
    let lead_time = reduce(&revisions);
    let last_iteration = revisions
        .iter()
        .rev()
        .find_map(|r| r.iteration_path.as_deref());
    debug!(id, ?last_iteration, start = ?lead_time.start, finish = ?lead_time.finish, "derived lead time");
    Ok(lead_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devops::tests::{at, state_rev, team, MockTracker};

    #[test]
    fn new_started_done() {
        let lt = reduce(&[
            state_rev("New", at(2021, 3, 1)),
            state_rev("Started", at(2021, 3, 2)),
            state_rev("Done", at(2021, 3, 5)),
        ]);
        assert_eq!(lt.start, Some(at(2021, 3, 2)));
        assert_eq!(lt.finish, Some(at(2021, 3, 5)));
    }

    #[test]
    fn never_done_has_no_finish() {
        let lt = reduce(&[
            state_rev("To Do", at(2021, 3, 1)),
            state_rev("In Progress", at(2021, 3, 2)),
        ]);
        assert_eq!(lt.start, Some(at(2021, 3, 2)));
        assert_eq!(lt.finish, None);
    }

    #[test]
    fn last_done_wins() {
        let lt = reduce(&[
            state_rev("New", at(2021, 3, 1)),
            state_rev("Done", at(2021, 3, 3)),
            state_rev("Done", at(2021, 3, 9)),
        ]);
        assert_eq!(lt.finish, Some(at(2021, 3, 9)));
    }

    #[test]
    fn reopened_after_done_keeps_finish() {
        let lt = reduce(&[
            state_rev("New", at(2021, 3, 1)),
            state_rev("Started", at(2021, 3, 2)),
            state_rev("Done", at(2021, 3, 4)),
            state_rev("In Progress", at(2021, 3, 6)),
        ]);
        assert_eq!(lt.start, Some(at(2021, 3, 2)));
        assert_eq!(lt.finish, Some(at(2021, 3, 4)));
    }

    #[test]
    fn first_start_clears_earlier_done() {
        // Done before any activity is replaced by the start reset.
        let lt = reduce(&[
            state_rev("Done", at(2021, 3, 1)),
            state_rev("In Progress", at(2021, 3, 2)),
        ]);
        assert_eq!(lt.finish, None);
    }

    #[test]
    fn falls_back_to_create_without_start() {
        let lt = reduce(&[
            state_rev("New", at(2021, 3, 1)),
            state_rev("Done", at(2021, 3, 2)),
        ]);
        assert_eq!(lt.start, Some(at(2021, 3, 1)));
        assert_eq!(lt.finish, Some(at(2021, 3, 2)));
    }

    #[test]
    fn unchanged_state_is_not_a_transition() {
        let mut restated = state_rev("Done", at(2021, 3, 8));
        if let Some(change) = restated.state.as_mut() {
            change.old_value = Some("Done".into());
        }
        let lt = reduce(&[
            state_rev("New", at(2021, 3, 1)),
            state_rev("Done", at(2021, 3, 3)),
            restated,
        ]);
        assert_eq!(lt.finish, Some(at(2021, 3, 3)));
    }

    #[test]
    fn empty_history() {
        assert_eq!(reduce(&[]), LeadTime::default());
    }

    #[tokio::test]
    async fn lead_time_reads_tracker_history() {
        let mut tracker = MockTracker::default();
        tracker.revisions.insert(
            7,
            vec![
                state_rev("New", at(2021, 4, 1)),
                state_rev("In Progress", at(2021, 4, 2)),
                state_rev("Done", at(2021, 4, 3)),
            ],
        );
        let lt = lead_time(&tracker, &team(), 7).await.unwrap();
        assert_eq!(lt.start, Some(at(2021, 4, 2)));
        assert_eq!(lt.finish, Some(at(2021, 4, 3)));
    }

    #[tokio::test]
    async fn lead_time_propagates_errors() {
        let tracker = MockTracker {
            should_fail: true,
            ..MockTracker::default()
        };
        let err = lead_time(&tracker, &team(), 7).await.unwrap_err();
        assert!(err.to_string().contains("work item 7"));
    }
}
