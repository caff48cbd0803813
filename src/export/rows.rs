use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::{CellValue, SheetRow};
use crate::devops::TeamContext;
use crate::model::iteration::Capacity;
use crate::model::work_item::WorkItem;
use crate::util::tags::classify;

/// Base work item columns followed by derived ones, in sheet order.
pub const WORK_ITEM_COLUMNS: [&str; 21] = [
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
    "Microsoft.VSTS.Scheduling.StartDate",
    "Microsoft.VSTS.Scheduling.FinishDate",
    "Export.Operation",
    "Export.Region",
    "Export.Planned",
    "Export.Link",
    "Export.ExportedAt",
];

pub const CAPACITY_COLUMNS: [&str; 4] = [
    "Capacity.TeamMember",
    "Capacity.CapacityPerDay",
    "Capacity.DaysPerIteration",
    "System.IterationPath",
];

/// Fill a link template's `{organization}`, `{project}`, `{team}` and `{id}`.
pub fn item_link(template: &str, organization: &str, team: &TeamContext, id: i64) -> String {
    template
        .replace("{organization}", organization.trim_end_matches('/'))
        .replace("{project}", &urlencoding::encode(&team.project))
        .replace("{team}", &urlencoding::encode(&team.team))
        .replace("{id}", &id.to_string())
}

/// Shared context for every row of one export.
pub struct RowContext<'a> {
    pub link_template: &'a str,
    pub organization: &'a str,
    pub team: &'a TeamContext,
    pub timezone: Tz,
    /// Due date of the exported iteration.
    pub exported_at: Option<DateTime<Utc>>,
}

impl RowContext<'_> {
    fn date(&self, value: Option<DateTime<Utc>>) -> CellValue {
        value
            .map(|d| {
                CellValue::Text(
                    d.with_timezone(&self.timezone)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string(),
                )
            })
            .unwrap_or(CellValue::Empty)
    }
}

pub struct WorkItemRow<'a> {
    pub item: &'a WorkItem,
    pub ctx: &'a RowContext<'a>,
}

fn text(value: Option<&str>) -> CellValue {
    match value {
        Some(s) if !s.is_empty() => CellValue::Text(s.to_string()),
        _ => CellValue::Empty,
    }
}

impl SheetRow for WorkItemRow<'_> {
    fn cells(&self) -> Vec<CellValue> {
        let item = self.item;
        let ctx = self.ctx;
        let class = classify(item.tags.as_deref());

        vec![
            CellValue::Number(item.id as f64),
            CellValue::Text(item.item_type.service_name().to_string()),
            item.parent
                .map(|p| CellValue::Number(p as f64))
                .unwrap_or(CellValue::Empty),
            text(Some(&item.title)),
            text(item.description.as_deref()),
            text(item.tags.as_deref()),
            text(item.value_area.as_deref()),
            item.business_value
                .map(|v| CellValue::Number(v as f64))
                .unwrap_or(CellValue::Empty),
            text(item.assigned_to.as_deref()),
            text(Some(&item.state)),
            ctx.date(item.created_date),
            ctx.date(item.changed_date),
            text(Some(&item.area_path)),
            text(Some(&item.iteration_path)),
            ctx.date(item.lead_time.start),
            ctx.date(item.lead_time.finish),
            CellValue::Text(class.operation.into()),
            text(class.region),
            CellValue::Text(class.planned.into()),
            CellValue::Text(item_link(
                ctx.link_template,
                ctx.organization,
                ctx.team,
                item.id,
            )),
            ctx.date(ctx.exported_at),
        ]
    }
}

impl SheetRow for Capacity {
    fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::Text(self.team_member.clone()),
            CellValue::Number(self.capacity_per_day),
            CellValue::Number(f64::from(self.days_per_iteration)),
            CellValue::Text(self.iteration_path.clone()),
        ]
    }
}
