use anyhow::Result;
use chrono::{DateTime, Datelike, TimeZone};
use chrono_tz::Tz;
use tracing::info;

use crate::devops::{TeamContext, Tracker};
use crate::error::ExportError;
use crate::model::iteration::Iteration;

/// Which iterations a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationSelector {
    Current,
    Path(String),
    AllPast,
}

impl IterationSelector {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None => IterationSelector::Current,
            Some("ALL") => IterationSelector::AllPast,
            Some(path) => IterationSelector::Path(path.to_string()),
        }
    }
}

/// Business rule bounding which iterations count: nothing that starts before
/// `cutoff_year` or after `now` in the business timezone.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub cutoff_year: i32,
    pub now: DateTime<Tz>,
}

impl DateWindow {
    pub fn today(cutoff_year: i32, tz: Tz) -> Self {
        Self {
            cutoff_year,
            now: tz.from_utc_datetime(&chrono::Utc::now().naive_utc()),
        }
    }

    pub fn contains(&self, iteration: &Iteration) -> bool {
        match iteration.start_date {
            // The year is taken from the date as the service reports it.
            Some(start) => start.year() >= self.cutoff_year && start <= self.now,
            None => false,
        }
    }
}

pub struct IterationResolver<'a> {
    tracker: &'a dyn Tracker,
    team: &'a TeamContext,
    window: DateWindow,
}

impl<'a> IterationResolver<'a> {
    pub fn new(tracker: &'a dyn Tracker, team: &'a TeamContext, window: DateWindow) -> Self {
        Self {
            tracker,
            team,
            window,
        }
    }

    pub async fn resolve(&self, selector: &IterationSelector) -> Result<Vec<Iteration>> {
        match selector {
            IterationSelector::Current => Ok(vec![self.current().await?]),
            IterationSelector::Path(path) => Ok(vec![self.by_path(path).await?]),
            IterationSelector::AllPast => self.all_past().await,
        }
    }

    /// The last in-window candidate of the "current" timeframe wins.
    pub async fn current(&self) -> Result<Iteration> {
        let mut current = None;
        for (index, iteration) in self
            .tracker
            .list_iterations(self.team, true)
            .await?
            .into_iter()
            .filter(|it| self.window.contains(it))
            .enumerate()
        {
            log_iteration(index, &iteration);
            current = Some(iteration);
        }
        current.ok_or_else(|| ExportError::NoCurrentIteration(self.team.team.clone()).into())
    }

    pub async fn by_path(&self, path: &str) -> Result<Iteration> {
        self.all_past()
            .await?
            .into_iter()
            .find(|it| it.path == path)
            .ok_or_else(|| ExportError::IterationNotFound(path.to_string()).into())
    }

    /// Every in-window iteration, in the order the service lists them.
    pub async fn all_past(&self) -> Result<Vec<Iteration>> {
        Ok(self
            .tracker
            .list_iterations(self.team, false)
            .await?
            .into_iter()
            .filter(|it| self.window.contains(it))
            .collect())
    }
}

fn log_iteration(index: usize, iteration: &Iteration) {
    let fmt = |d: Option<DateTime<chrono::Utc>>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    };
    info!(
        "Iteration [{index}]: {}, {} ({} -> {})",
        iteration.name,
        iteration.path,
        fmt(iteration.start_date),
        fmt(iteration.finish_date)
    );
}
