use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{MemberCapacity, NamedRef, ProjectPage, TeamContext, Tracker};
use crate::config::DevOpsConfig;
use crate::model::iteration::Iteration;
use crate::model::work_item::{FieldChange, LeadTime, Revision, WorkItem, WorkItemType};

const API_VERSION: &str = "7.0";
const UPDATES_PAGE: usize = 200;
const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";
/// Exponent cap for retry backoff: 500ms * 2^6 = 32s.
const MAX_BACKOFF_EXPONENT: u32 = 6;

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500u64.saturating_mul(1u64 << attempt.min(MAX_BACKOFF_EXPONENT)))
}

pub struct AzureDevOpsClient {
    base_url: String,
    auth_header: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl AzureDevOpsClient {
    pub fn new(config: &DevOpsConfig, max_retries: u32) -> Self {
        // PAT auth is Basic with an empty user name.
        let creds = format!(":{}", config.personal_access_token);
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        Self {
            base_url: config.organization_url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {encoded}"),
            client: reqwest::Client::new(),
            max_retries,
        }
    }

    fn project_url(&self, team: &TeamContext) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(&team.project))
    }

    fn team_url(&self, team: &TeamContext) -> String {
        format!(
            "{}/{}",
            self.project_url(team),
            urlencoding::encode(&team.team)
        )
    }

    /// Sends a request, retrying transient faults with exponential backoff
    /// when `max_retries` is non-zero.
    async fn send<F>(&self, what: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            let result = build()
                .header("Authorization", &self.auth_header)
                .header("Accept", "application/json")
                .send()
                .await;

            let retryable = match &result {
                Ok(resp) => {
                    let status = resp.status();
                    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                }
                Err(e) => e.is_connect() || e.is_timeout(),
            };

            if retryable && attempt < self.max_retries {
                let delay = backoff(attempt);
                warn!(request = what, attempt, ?delay, "transient Azure DevOps failure, retrying");
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
                continue;
            }

            let resp = result.with_context(|| format!("Azure DevOps {what} request failed"))?;
            return resp
                .error_for_status()
                .with_context(|| format!("Azure DevOps {what} returned an error status"));
        }
    }
}

#[derive(Deserialize)]
struct WiqlResponse {
    #[serde(rename = "workItems")]
    work_items: Option<Vec<WorkItemRef>>,
}

#[derive(Deserialize)]
struct WorkItemRef {
    id: i64,
}

#[derive(Deserialize)]
struct ValueList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Deserialize)]
struct RawNamed {
    id: String,
    name: String,
}

impl From<RawNamed> for NamedRef {
    fn from(raw: RawNamed) -> Self {
        NamedRef {
            id: raw.id,
            name: raw.name,
        }
    }
}

#[derive(Deserialize)]
struct RawWorkItem {
    id: i64,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawUpdate {
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIteration {
    id: String,
    name: String,
    path: String,
    attributes: Option<IterationAttributes>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IterationAttributes {
    start_date: Option<DateTime<Utc>>,
    finish_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct CapacityResponse {
    #[serde(default, alias = "teamMembers")]
    value: Vec<RawCapacity>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCapacity {
    team_member: Identity,
    #[serde(default)]
    activities: Vec<Activity>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identity {
    display_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Activity {
    #[serde(default)]
    capacity_per_day: f64,
}

fn str_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields.get(name).and_then(|v| v.as_str()).map(String::from)
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn date_field(fields: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
    fields
        .get(name)
        .and_then(|v| v.as_str())
        .and_then(parse_date)
}

/// Identity fields come back as objects; older API versions return a plain string.
fn identity_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("displayName")
            .and_then(|v| v.as_str())
            .map(String::from),
        _ => None,
    }
}

fn to_work_item(raw: RawWorkItem) -> WorkItem {
    let f = &raw.fields;
    WorkItem {
        id: f.get("System.Id").and_then(|v| v.as_i64()).unwrap_or(raw.id),
        item_type: WorkItemType::from_service_name(
            &str_field(f, "System.WorkItemType").unwrap_or_default(),
        ),
        parent: f.get("System.Parent").and_then(|v| v.as_i64()),
        title: str_field(f, "System.Title").unwrap_or_default(),
        description: str_field(f, "System.Description"),
        tags: str_field(f, "System.Tags"),
        value_area: str_field(f, "Microsoft.VSTS.Common.ValueArea"),
        business_value: f
            .get("Microsoft.VSTS.Common.BusinessValue")
            .and_then(|v| v.as_i64()),
        assigned_to: identity_field(f, "System.AssignedTo"),
        state: str_field(f, "System.State").unwrap_or_default(),
        created_date: date_field(f, "System.CreatedDate"),
        changed_date: date_field(f, "System.ChangedDate"),
        area_path: str_field(f, "System.AreaPath").unwrap_or_default(),
        iteration_path: str_field(f, "System.IterationPath").unwrap_or_default(),
        lead_time: LeadTime::default(),
    }
}

fn change(fields: &Map<String, Value>, name: &str) -> Option<FieldChange> {
    let obj = fields.get(name)?.as_object()?;
    let value = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(String::from);
    Some(FieldChange {
        old_value: value("oldValue"),
        new_value: value("newValue"),
    })
}

/// Updates without a changed date only touch links or attachments.
fn to_revision(raw: RawUpdate) -> Option<Revision> {
    let changed_date = change(&raw.fields, "System.ChangedDate")?
        .new_value
        .as_deref()
        .and_then(parse_date)?;
    Some(Revision {
        changed_date,
        state: change(&raw.fields, "System.State"),
        iteration_path: change(&raw.fields, "System.IterationPath").and_then(|c| c.new_value),
    })
}

#[async_trait]
impl Tracker for AzureDevOpsClient {
    async fn query_ids(&self, team: &TeamContext, wiql: &str) -> Result<Option<Vec<i64>>> {
        let url = format!("{}/_apis/wit/wiql", self.team_url(team));
        let body = serde_json::json!({ "query": wiql });
        let resp = self
            .send("wiql", || {
                self.client
                    .post(&url)
                    .query(&[("api-version", API_VERSION)])
                    .json(&body)
            })
            .await?;
        let parsed: WiqlResponse = resp.json().await.context("Failed to parse WIQL response")?;
        Ok(parsed
            .work_items
            .map(|refs| refs.into_iter().map(|r| r.id).collect()))
    }

    async fn get_work_items(
        &self,
        team: &TeamContext,
        ids: &[i64],
        fields: &[&str],
    ) -> Result<Vec<WorkItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/_apis/wit/workitemsbatch", self.project_url(team));
        let body = serde_json::json!({ "ids": ids, "fields": fields });
        let resp = self
            .send("work items batch", || {
                self.client
                    .post(&url)
                    .query(&[("api-version", API_VERSION)])
                    .json(&body)
            })
            .await?;
        let parsed: ValueList<RawWorkItem> = resp
            .json()
            .await
            .context("Failed to parse work items batch")?;
        Ok(parsed.value.into_iter().map(to_work_item).collect())
    }

    async fn get_work_item(
        &self,
        team: &TeamContext,
        id: i64,
        fields: &[&str],
    ) -> Result<Option<WorkItem>> {
        let url = format!("{}/_apis/wit/workitems/{id}", self.project_url(team));
        let field_list = fields.join(",");
        let resp = self
            .send("work item", || {
                self.client
                    .get(&url)
                    .query(&[("api-version", API_VERSION), ("fields", field_list.as_str())])
            })
            .await?;
        let raw: Option<RawWorkItem> = resp.json().await.context("Failed to parse work item")?;
        Ok(raw.map(to_work_item))
    }

    async fn get_revisions(&self, team: &TeamContext, id: i64) -> Result<Vec<Revision>> {
        let url = format!("{}/_apis/wit/workItems/{id}/updates", self.project_url(team));
        let mut revisions = Vec::new();
        let mut skip = 0usize;
        loop {
            let top = UPDATES_PAGE.to_string();
            let skip_s = skip.to_string();
            let resp = self
                .send("work item updates", || {
                    self.client.get(&url).query(&[
                        ("api-version", API_VERSION),
                        ("$top", top.as_str()),
                        ("$skip", skip_s.as_str()),
                    ])
                })
                .await?;
            let page: ValueList<RawUpdate> = resp
                .json()
                .await
                .with_context(|| format!("Failed to parse updates for work item {id}"))?;
            let count = page.value.len();
            revisions.extend(page.value.into_iter().filter_map(to_revision));
            if count < UPDATES_PAGE {
                break;
            }
            skip += count;
        }
        debug!(id, revisions = revisions.len(), "fetched revision history");
        Ok(revisions)
    }

    async fn list_iterations(
        &self,
        team: &TeamContext,
        current_only: bool,
    ) -> Result<Vec<Iteration>> {
        let url = format!("{}/_apis/work/teamsettings/iterations", self.team_url(team));
        let resp = self
            .send("team iterations", || {
                let req = self.client.get(&url).query(&[("api-version", API_VERSION)]);
                if current_only {
                    req.query(&[("$timeframe", "current")])
                } else {
                    req
                }
            })
            .await?;
        let parsed: ValueList<RawIteration> = resp
            .json()
            .await
            .context("Failed to parse team iterations")?;
        Ok(parsed
            .value
            .into_iter()
            .map(|it| {
                let (start_date, finish_date) = it
                    .attributes
                    .map(|a| (a.start_date, a.finish_date))
                    .unwrap_or((None, None));
                Iteration {
                    id: it.id,
                    name: it.name,
                    path: it.path,
                    start_date,
                    finish_date,
                }
            })
            .collect())
    }

    async fn get_capacities(
        &self,
        team: &TeamContext,
        iteration: &Iteration,
    ) -> Result<Vec<MemberCapacity>> {
        let url = format!(
            "{}/_apis/work/teamsettings/iterations/{}/capacities",
            self.team_url(team),
            iteration.id
        );
        let resp = self
            .send("capacities", || {
                self.client.get(&url).query(&[("api-version", API_VERSION)])
            })
            .await?;
        let parsed: CapacityResponse = resp.json().await.context("Failed to parse capacities")?;
        Ok(parsed
            .value
            .into_iter()
            .map(|c| MemberCapacity {
                team_member: c.team_member.display_name,
                capacity_per_day: c.activities.iter().map(|a| a.capacity_per_day).sum(),
            })
            .collect())
    }

    async fn list_projects(&self, continuation_token: Option<&str>) -> Result<ProjectPage> {
        let url = format!("{}/_apis/projects", self.base_url);
        let resp = self
            .send("projects", || {
                let req = self.client.get(&url).query(&[("api-version", API_VERSION)]);
                match continuation_token {
                    Some(token) => req.query(&[("continuationToken", token)]),
                    None => req,
                }
            })
            .await?;
        let continuation_token = resp
            .headers()
            .get(CONTINUATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|t| !t.is_empty())
            .map(String::from);
        let parsed: ValueList<RawNamed> = resp.json().await.context("Failed to parse projects")?;
        Ok(ProjectPage {
            projects: parsed.value.into_iter().map(NamedRef::from).collect(),
            continuation_token,
        })
    }

    async fn list_teams(&self, project: &str) -> Result<Vec<NamedRef>> {
        let url = format!(
            "{}/_apis/projects/{}/teams",
            self.base_url,
            urlencoding::encode(project)
        );
        let resp = self
            .send("teams", || {
                self.client.get(&url).query(&[("api-version", API_VERSION)])
            })
            .await?;
        let parsed: ValueList<RawNamed> = resp.json().await.context("Failed to parse teams")?;
        Ok(parsed.value.into_iter().map(NamedRef::from).collect())
    }

    async fn list_boards(&self, team: &TeamContext) -> Result<Vec<NamedRef>> {
        let url = format!("{}/_apis/work/boards", self.team_url(team));
        let resp = self
            .send("boards", || {
                self.client.get(&url).query(&[("api-version", API_VERSION)])
            })
            .await?;
        let parsed: ValueList<RawNamed> = resp.json().await.context("Failed to parse boards")?;
        Ok(parsed.value.into_iter().map(NamedRef::from).collect())
    }
}
