use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono_tz::Tz;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use crate::config::{self, Defaults};
use crate::devops::azure::AzureDevOpsClient;
use crate::devops::{TeamContext, Tracker};
use crate::export::rows::{RowContext, WorkItemRow, CAPACITY_COLUMNS, WORK_ITEM_COLUMNS};
use crate::export::{ensure_writable, output_path, ExportMode, SheetExporter};
use crate::iteration::{DateWindow, IterationResolver, IterationSelector};
use crate::leadtime;
use crate::listing::{self, ListKind};
use crate::model::iteration::{Capacity, Iteration};
use crate::model::work_item::WorkItemType;
use crate::retriever::{ItemQuery, Retriever};

const CAPACITY_SHEET: &str = "capacity";

#[derive(Debug, Parser)]
#[command(
    name = "sprint-export",
    about = "Retrieve work items from Azure DevOps for a given or current iteration."
)]
pub struct Cli {
    /// Project name, e.g. CNP.GIS
    #[arg(short, long)]
    pub project: Option<String>,

    /// Team name, e.g. "CNP.GIS Team"
    #[arg(short, long)]
    pub team: Option<String>,

    /// Iteration path, e.g. "CNP.GIS\Sprint 21.03-A". Omit for the current
    /// iteration, or pass ALL for every past iteration.
    #[arg(short, long, value_name = "ITERATION PATH")]
    pub iteration: Option<String>,

    /// Only export one work item type
    #[arg(short = 'w', long = "type", value_enum)]
    pub item_type: Option<TypeArg>,

    /// Area path to query (defaults to the project name)
    #[arg(long)]
    pub area: Option<String>,

    /// Add rows to an existing file instead of creating a new one
    #[arg(long)]
    pub append: bool,

    /// Include parents that belong to other iterations
    #[arg(long)]
    pub with_parents: bool,

    /// Export team capacity instead of work items
    #[arg(long)]
    pub capacity: bool,

    /// Directory the spreadsheets are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Print the projects, teams or boards visible to the token and exit
    #[arg(long, value_enum)]
    pub list: Option<ListKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TypeArg {
    Pbi,
    Task,
}

impl From<TypeArg> for WorkItemType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Pbi => WorkItemType::BacklogItem,
            TypeArg::Task => WorkItemType::Task,
        }
    }
}

/// Everything one run needs, with CLI flags layered over config defaults.
pub struct Plan {
    pub team: TeamContext,
    pub area: String,
    pub selector: IterationSelector,
    pub item_type: Option<WorkItemType>,
    pub mode: ExportMode,
    pub with_parents: bool,
    pub capacity: bool,
    pub output_dir: PathBuf,
    pub sheet_name: String,
    pub link_template: String,
    pub organization: String,
    pub timezone: Tz,
    pub days_per_iteration: u32,
}

impl Plan {
    pub fn new(cli: Cli, defaults: &Defaults, organization: String) -> Result<Self> {
        let project = cli.project.unwrap_or_else(|| defaults.project.clone());
        let area = cli
            .area
            .or_else(|| defaults.area.clone())
            .unwrap_or_else(|| project.clone());
        Ok(Self {
            team: TeamContext {
                project,
                team: cli.team.unwrap_or_else(|| defaults.team.clone()),
            },
            area,
            selector: IterationSelector::from_arg(cli.iteration.as_deref()),
            item_type: cli.item_type.map(WorkItemType::from),
            mode: if cli.append {
                ExportMode::Append
            } else {
                ExportMode::Create
            },
            with_parents: cli.with_parents,
            capacity: cli.capacity,
            output_dir: cli
                .output_dir
                .unwrap_or_else(|| defaults.output_dir.clone()),
            sheet_name: defaults.sheet_name.clone(),
            link_template: defaults.link_template.clone(),
            organization,
            timezone: defaults.business_timezone()?,
            days_per_iteration: defaults.days_per_iteration,
        })
    }

    /// Work item types written to separate files. `None` stands for capacity.
    pub fn export_kinds(&self) -> Vec<Option<WorkItemType>> {
        if self.capacity {
            return vec![None];
        }
        match &self.item_type {
            Some(t) => vec![Some(t.clone())],
            None => WorkItemType::OF_INTEREST.iter().cloned().map(Some).collect(),
        }
    }

    /// One combined file in all-past mode, otherwise one per iteration.
    pub fn target(&self, iteration: Option<&Iteration>, kind: Option<&WorkItemType>) -> PathBuf {
        let stem = match (&self.selector, iteration) {
            (IterationSelector::AllPast, _) | (_, None) => "ALL",
            (_, Some(it)) => it.path.as_str(),
        };
        let suffix = kind
            .map(WorkItemType::file_suffix)
            .unwrap_or_else(|| "Capacity".into());
        output_path(&self.output_dir, stem, &suffix)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = config::load_config()?;
    let connection = config.connection()?;
    let defaults = &config.defaults;

    let list = cli.list;
    let plan = Plan::new(cli, defaults, connection.organization_url.clone())?;
    let client = AzureDevOpsClient::new(&connection, defaults.max_retries);

    if let Some(kind) = list {
        for line in listing::list(&client, kind, &plan.team).await? {
            println!("{line}");
        }
        return Ok(());
    }

    let window = DateWindow::today(defaults.cutoff_year, plan.timezone);
    for path in execute(&client, &plan, window).await? {
        println!("****** Completed: {}", path.display());
    }
    Ok(())
}

/// Resolve iterations, check every target, then retrieve and export.
pub async fn execute(tracker: &dyn Tracker, plan: &Plan, window: DateWindow) -> Result<Vec<PathBuf>> {
    info!(selector = ?plan.selector, "resolving iterations");
    let iterations = IterationResolver::new(tracker, &plan.team, window)
        .resolve(&plan.selector)
        .await?;

    let targets: Vec<(Option<WorkItemType>, PathBuf)> = plan
        .export_kinds()
        .into_iter()
        .map(|kind| {
            let path = plan.target(iterations.first(), kind.as_ref());
            (kind, path)
        })
        .collect();
    // Nothing is retrieved unless every file can be written.
    for (_, path) in &targets {
        ensure_writable(path, plan.mode)?;
    }

    if iterations.is_empty() {
        warn!("no iterations within the reporting window");
    }

    for (kind, path) in &targets {
        for (index, iteration) in iterations.iter().enumerate() {
            // Later iterations of a combined export append to the first.
            let mode = if index == 0 {
                plan.mode
            } else {
                ExportMode::Append
            };
            match kind {
                Some(item_type) => {
                    export_items(tracker, plan, iteration, item_type, path, mode).await?
                }
                None => export_capacity(tracker, plan, iteration, path, mode).await?,
            }
        }
    }

    Ok(targets.into_iter().map(|(_, path)| path).collect())
}

async fn export_items(
    tracker: &dyn Tracker,
    plan: &Plan,
    iteration: &Iteration,
    item_type: &WorkItemType,
    path: &Path,
    mode: ExportMode,
) -> Result<()> {
    info!(iteration = %iteration.path, %item_type, "retrieving work items");
    let query = ItemQuery {
        area_path: &plan.area,
        iteration_path: &iteration.path,
        item_type: Some(item_type),
    };
    let mut items = Retriever::new(tracker, &plan.team)
        .with_parents(plan.with_parents)
        .retrieve(&query)
        .await?;

    for item in &mut items {
        item.lead_time = leadtime::lead_time(tracker, &plan.team, item.id).await?;
    }

    let ctx = RowContext {
        link_template: &plan.link_template,
        organization: &plan.organization,
        team: &plan.team,
        timezone: plan.timezone,
        exported_at: iteration.finish_date,
    };
    let rows: Vec<WorkItemRow<'_>> = items
        .iter()
        .map(|item| WorkItemRow { item, ctx: &ctx })
        .collect();

    info!(path = %path.display(), rows = rows.len(), "storing work items");
    let mut exporter = SheetExporter::open(path, &plan.sheet_name, mode, &WORK_ITEM_COLUMNS)?;
    exporter.write_rows(&rows)?;
    exporter.save()
}

async fn export_capacity(
    tracker: &dyn Tracker,
    plan: &Plan,
    iteration: &Iteration,
    path: &Path,
    mode: ExportMode,
) -> Result<()> {
    info!(iteration = %iteration.path, "retrieving capacity");
    let rows: Vec<Capacity> = tracker
        .get_capacities(&plan.team, iteration)
        .await?
        .into_iter()
        .map(|member| Capacity {
            team_member: member.team_member,
            capacity_per_day: member.capacity_per_day,
            days_per_iteration: plan.days_per_iteration,
            iteration_path: iteration.path.clone(),
        })
        .collect();

    let mut exporter = SheetExporter::open(path, CAPACITY_SHEET, mode, &CAPACITY_COLUMNS)?;
    exporter.write_rows(&rows)?;
    exporter.save()
}
