use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info};

use crate::devops::{TeamContext, Tracker};
use crate::error::ExportError;
use crate::model::work_item::{WorkItem, WorkItemType};

/// Per-call limit of the work items batch endpoint.
pub const BATCH_SIZE: usize = 200;

/// Fields fetched for every item. Lead-time columns are derived locally.
pub const FETCHED_FIELDS: [&str; 14] = [
    "System.Id",
    "System.WorkItemType",
    "System.Parent",
    "System.Title",
    "System.Description",
    "System.Tags",
    "Microsoft.VSTS.Common.ValueArea",
    "Microsoft.VSTS.Common.BusinessValue",
    "System.AssignedTo",
    "System.State",
    "System.CreatedDate",
    "System.ChangedDate",
    "System.AreaPath",
    "System.IterationPath",
];

pub struct ItemQuery<'a> {
    pub area_path: &'a str,
    pub iteration_path: &'a str,
    pub item_type: Option<&'a WorkItemType>,
}

/// Quote a WIQL string literal, rejecting control characters.
fn literal(field: &'static str, value: &str) -> Result<String, ExportError> {
    if value.is_empty() || value.chars().any(char::is_control) {
        return Err(ExportError::InvalidQueryValue {
            field,
            value: value.to_string(),
        });
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}

pub fn build_wiql(query: &ItemQuery<'_>) -> Result<String, ExportError> {
    let area = literal("area path", query.area_path)?;
    let iteration = literal("iteration path", query.iteration_path)?;
    let type_clause = match query.item_type {
        Some(t) => format!(
            "[System.WorkItemType] = {}",
            literal("work item type", t.service_name())?
        ),
        None => {
            let alternatives = WorkItemType::OF_INTEREST
                .iter()
                .map(|t| literal("work item type", t.service_name()))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|lit| format!("[System.WorkItemType] = {lit}"))
                .collect::<Vec<_>>();
            format!("( {} )", alternatives.join(" or "))
        }
    };

    Ok(format!(
        "Select [System.Id] From WorkItems \
         Where [System.AreaPath] = {area} \
         and {type_clause} \
         and [System.IterationPath] = {iteration} \
         and [System.State] <> 'Removed' \
         Order by [Microsoft.VSTS.Common.Priority] asc, [System.CreatedDate] desc"
    ))
}

pub struct Retriever<'a> {
    tracker: &'a dyn Tracker,
    team: &'a TeamContext,
    include_parents: bool,
}

impl<'a> Retriever<'a> {
    pub fn new(tracker: &'a dyn Tracker, team: &'a TeamContext) -> Self {
        Self {
            tracker,
            team,
            include_parents: false,
        }
    }

    /// Also fetch parents that live outside the queried iteration.
    pub fn with_parents(mut self, include: bool) -> Self {
        self.include_parents = include;
        self
    }

    pub async fn retrieve(&self, query: &ItemQuery<'_>) -> Result<Vec<WorkItem>> {
        let wiql = build_wiql(query)?;
        debug!(%wiql, "running work item query");

        let Some(ids) = self.tracker.query_ids(self.team, &wiql).await? else {
            info!(iteration = query.iteration_path, "query returned no results");
            return Ok(Vec::new());
        };

        let mut items = Vec::with_capacity(ids.len());
        for batch in ids.chunks(BATCH_SIZE) {
            let fetched = self
                .tracker
                .get_work_items(self.team, batch, &FETCHED_FIELDS)
                .await?;
            for item in &fetched {
                debug!(id = item.id, "{}, {}: {}", item.item_type, item.title, item.state);
            }
            items.extend(fetched);
        }

        if self.include_parents {
            let parents = self.fetch_missing_parents(&ids, &items).await?;
            items.extend(parents);
        }

        info!(count = items.len(), "work items retrieved");
        Ok(items)
    }

    async fn fetch_missing_parents(&self, ids: &[i64], items: &[WorkItem]) -> Result<Vec<WorkItem>> {
        let known: HashSet<i64> = ids.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut parents = Vec::new();

        for parent_id in items.iter().filter_map(|i| i.parent) {
            if known.contains(&parent_id) || !seen.insert(parent_id) {
                continue;
            }
            let Some(parent) = self
                .tracker
                .get_work_item(self.team, parent_id, &FETCHED_FIELDS)
                .await?
            else {
                continue;
            };
            if parent.item_type.is_of_interest() {
                debug!(id = parent.id, "added parent from another iteration");
                parents.push(parent);
            }
        }
        Ok(parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devops::tests::{make_work_item, team, MockTracker};

    fn query<'a>(iteration: &'a str, item_type: Option<&'a WorkItemType>) -> ItemQuery<'a> {
        ItemQuery {
            area_path: "CNP.GIS",
            iteration_path: iteration,
            item_type,
        }
    }

    #[test]
    fn wiql_filters_and_orders() {
        let wiql = build_wiql(&query("CNP.GIS\\Sprint 21.03-A", None)).unwrap();
        assert!(wiql.contains("[System.AreaPath] = 'CNP.GIS'"));
        assert!(wiql.contains("[System.IterationPath] = 'CNP.GIS\\Sprint 21.03-A'"));
        assert!(wiql.contains(
            "( [System.WorkItemType] = 'Product Backlog Item' or [System.WorkItemType] = 'Task' )"
        ));
        assert!(wiql.contains("[System.State] <> 'Removed'"));
        assert!(wiql.ends_with("Order by [Microsoft.VSTS.Common.Priority] asc, [System.CreatedDate] desc"));
    }

    #[test]
    fn wiql_single_type() {
        let task = WorkItemType::Task;
        let wiql = build_wiql(&query("Sprint 1", Some(&task))).unwrap();
        assert!(wiql.contains("and [System.WorkItemType] = 'Task' and"));
    }

    #[test]
    fn wiql_escapes_quotes() {
        let wiql = build_wiql(&query("Sprint 'O'Neil", None)).unwrap();
        assert!(wiql.contains("'Sprint ''O''Neil'"));
    }

    #[test]
    fn wiql_rejects_control_characters() {
        let err = build_wiql(&query("Sprint\n1' or 1=1", None)).unwrap_err();
        assert!(matches!(err, ExportError::InvalidQueryValue { field: "iteration path", .. }));
    }

    #[tokio::test]
    async fn ids_are_fetched_in_batches_of_200() {
        let items = (1..=450)
            .map(|id| make_work_item(id, WorkItemType::Task, None))
            .collect();
        let tracker = MockTracker::with_items(items);
        let team = team();

        let result = Retriever::new(&tracker, &team)
            .retrieve(&query("Sprint 1", None))
            .await
            .unwrap();

        let sizes: Vec<usize> = tracker.batches.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![200, 200, 50]);
        assert_eq!(result.len(), 450);
        assert!(result.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn missing_result_container_yields_nothing() {
        let tracker = MockTracker::default();
        let team = team();
        let result = Retriever::new(&tracker, &team)
            .retrieve(&query("Sprint 1", None))
            .await
            .unwrap();
        assert!(result.is_empty());
        assert!(tracker.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn parents_outside_iteration_are_added_once() {
        let mut tracker = MockTracker::with_items(vec![
            make_work_item(1, WorkItemType::Task, Some(100)),
            make_work_item(2, WorkItemType::Task, Some(100)),
            make_work_item(3, WorkItemType::Task, Some(200)),
        ]);
        tracker
            .items
            .insert(100, make_work_item(100, WorkItemType::BacklogItem, None));
        tracker.items.insert(
            200,
            make_work_item(200, WorkItemType::Other("Feature".into()), None),
        );
        let team = team();

        let result = Retriever::new(&tracker, &team)
            .with_parents(true)
            .retrieve(&query("Sprint 1", None))
            .await
            .unwrap();

        let ids: Vec<i64> = result.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 100]);
    }

    #[tokio::test]
    async fn query_errors_propagate() {
        let tracker = MockTracker {
            should_fail: true,
            ..MockTracker::default()
        };
        let team = team();
        let result = Retriever::new(&tracker, &team)
            .retrieve(&query("Sprint 1", None))
            .await;
        assert!(result.is_err());
    }
}
