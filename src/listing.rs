use anyhow::Result;
use clap::ValueEnum;
use tracing::debug;

use crate::devops::{NamedRef, TeamContext, Tracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    Projects,
    Teams,
    Boards,
}

impl ListKind {
    fn label(self) -> &'static str {
        match self {
            ListKind::Projects => "Project",
            ListKind::Teams => "Team",
            ListKind::Boards => "Board",
        }
    }
}

/// Every project in the organization, following continuation tokens.
pub async fn projects(tracker: &dyn Tracker) -> Result<Vec<NamedRef>> {
    let mut all = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = tracker.list_projects(token.as_deref()).await?;
        debug!(count = page.projects.len(), "project page received");
        all.extend(page.projects);
        match page.continuation_token {
            Some(next) if !next.is_empty() && token.as_deref() != Some(next.as_str()) => {
                token = Some(next)
            }
            _ => break,
        }
    }
    Ok(all)
}

pub async fn teams(tracker: &dyn Tracker, project: &str) -> Result<Vec<NamedRef>> {
    tracker.list_teams(project).await
}

pub async fn boards(tracker: &dyn Tracker, team: &TeamContext) -> Result<Vec<NamedRef>> {
    tracker.list_boards(team).await
}

pub async fn list(tracker: &dyn Tracker, kind: ListKind, team: &TeamContext) -> Result<Vec<String>> {
    let entries = match kind {
        ListKind::Projects => projects(tracker).await?,
        ListKind::Teams => teams(tracker, &team.project).await?,
        ListKind::Boards => boards(tracker, team).await?,
    };
    Ok(format_entries(kind, &entries))
}

/// `Project [0]: name` style lines, numbered across pages.
pub fn format_entries(kind: ListKind, entries: &[NamedRef]) -> Vec<String> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| format!("{} [{index}]: {}", kind.label(), entry.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devops::tests::{named, team, MockTracker};

    #[tokio::test]
    async fn projects_follow_continuation_tokens() {
        let tracker = MockTracker {
            project_pages: vec![
                vec![named("CNP.GIS"), named("Grid")],
                vec![named("Metering")],
                vec![named("Outage")],
            ],
            ..MockTracker::default()
        };
        let names: Vec<String> = projects(&tracker)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["CNP.GIS", "Grid", "Metering", "Outage"]);
    }

    #[tokio::test]
    async fn project_lines_are_numbered_across_pages() {
        let tracker = MockTracker {
            project_pages: vec![vec![named("CNP.GIS")], vec![named("Grid")]],
            ..MockTracker::default()
        };
        let lines = list(&tracker, ListKind::Projects, &team()).await.unwrap();
        assert_eq!(lines, vec!["Project [0]: CNP.GIS", "Project [1]: Grid"]);
    }

    #[tokio::test]
    async fn teams_and_boards() {
        let tracker = MockTracker {
            teams: vec![named("CNP.GIS Team"), named("Field Ops")],
            boards: vec![named("Backlog items")],
            ..MockTracker::default()
        };
        let team = team();
        assert_eq!(
            list(&tracker, ListKind::Teams, &team).await.unwrap(),
            vec!["Team [0]: CNP.GIS Team", "Team [1]: Field Ops"]
        );
        assert_eq!(
            list(&tracker, ListKind::Boards, &team).await.unwrap(),
            vec!["Board [0]: Backlog items"]
        );
    }

    #[tokio::test]
    async fn empty_organization_lists_nothing() {
        let tracker = MockTracker::default();
        assert!(list(&tracker, ListKind::Projects, &team()).await.unwrap().is_empty());
    }
}
