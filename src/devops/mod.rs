pub mod azure;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::iteration::Iteration;
use crate::model::work_item::{Revision, WorkItem};

/// Project and team a request is scoped to.
#[derive(Debug, Clone)]
pub struct TeamContext {
    pub project: String,
    pub team: String,
}

/// A project, team or board as returned by the listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

/// One page of projects; a token means more pages follow.
#[derive(Debug, Clone, Default)]
pub struct ProjectPage {
    pub projects: Vec<NamedRef>,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberCapacity {
    pub team_member: String,
    pub capacity_per_day: f64,
}

/// Operations consumed from the work-tracking service.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Run a WIQL query. `None` means the service returned no result container.
    async fn query_ids(&self, team: &TeamContext, wiql: &str) -> Result<Option<Vec<i64>>>;

    /// Fetch up to 200 items by ID with the given field projection.
    async fn get_work_items(
        &self,
        team: &TeamContext,
        ids: &[i64],
        fields: &[&str],
    ) -> Result<Vec<WorkItem>>;

    async fn get_work_item(
        &self,
        team: &TeamContext,
        id: i64,
        fields: &[&str],
    ) -> Result<Option<WorkItem>>;

    /// Update history of one item, oldest first.
    async fn get_revisions(&self, team: &TeamContext, id: i64) -> Result<Vec<Revision>>;

    async fn list_iterations(&self, team: &TeamContext, current_only: bool)
        -> Result<Vec<Iteration>>;

    async fn get_capacities(
        &self,
        team: &TeamContext,
        iteration: &Iteration,
    ) -> Result<Vec<MemberCapacity>>;

    async fn list_projects(&self, continuation_token: Option<&str>) -> Result<ProjectPage>;

    async fn list_teams(&self, project: &str) -> Result<Vec<NamedRef>>;

    async fn list_boards(&self, team: &TeamContext) -> Result<Vec<NamedRef>>;
}
