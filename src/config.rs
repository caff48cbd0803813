use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::ExportError;

pub const DEFAULT_LINK_TEMPLATE: &str =
    "{organization}/{project}/_sprints/taskboard/{team}?workitem={id}";

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub devops: Option<DevOpsConfig>,
    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DevOpsConfig {
    pub organization_url: String,
    pub personal_access_token: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Defaults {
    pub project: String,
    pub team: String,
    pub area: Option<String>,
    pub output_dir: PathBuf,
    pub sheet_name: String,
    pub timezone: String,
    pub cutoff_year: i32,
    pub days_per_iteration: u32,
    pub link_template: String,
    pub max_retries: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            project: "CNP.GIS".into(),
            team: "CNP.GIS Team".into(),
            area: None,
            output_dir: PathBuf::from("iterations"),
            sheet_name: "current_iteration".into(),
            timezone: "America/Chicago".into(),
            cutoff_year: 2021,
            days_per_iteration: 10,
            link_template: DEFAULT_LINK_TEMPLATE.into(),
            max_retries: 0,
        }
    }
}

impl Defaults {
    pub fn business_timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone {:?}: {e}", self.timezone))
    }
}

impl AppConfig {
    /// Connection settings with environment overrides applied.
    pub fn connection(&self) -> Result<DevOpsConfig> {
        connection_from(
            self.devops.as_ref(),
            std::env::var("AZURE_DEVOPS_ORG_URL").ok(),
            std::env::var("AZURE_DEVOPS_PAT").ok(),
        )
    }
}

fn connection_from(
    file: Option<&DevOpsConfig>,
    env_url: Option<String>,
    env_pat: Option<String>,
) -> Result<DevOpsConfig> {
    let organization_url = env_url
        .or_else(|| file.map(|c| c.organization_url.clone()))
        .filter(|s| !s.is_empty());
    let personal_access_token = env_pat
        .or_else(|| file.map(|c| c.personal_access_token.clone()))
        .filter(|s| !s.is_empty());

    match (organization_url, personal_access_token) {
        (Some(url), Some(pat)) => Ok(DevOpsConfig {
            organization_url: url.trim_end_matches('/').to_string(),
            personal_access_token: pat,
        }),
        _ => Err(ExportError::MissingCredentials.into()),
    }
}

fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sprint-export")
        .join("config.toml")
}

pub fn load_config() -> Result<AppConfig> {
    let path = config_path();
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).with_context(|| "Failed to parse config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.devops.is_none());
        assert_eq!(config.defaults.cutoff_year, 2021);
        assert_eq!(config.defaults.output_dir, PathBuf::from("iterations"));
        assert_eq!(config.defaults.max_retries, 0);
    }

    #[test]
    fn partial_defaults_keep_the_rest() {
        let config = parse_config(
            r#"
            [devops]
            organization_url = "https://dev.azure.com/acme/"
            personal_access_token = "secret"

            [defaults]
            project = "Grid"
            days_per_iteration = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.defaults.project, "Grid");
        assert_eq!(config.defaults.days_per_iteration, 8);
        assert_eq!(config.defaults.team, "CNP.GIS Team");
        assert_eq!(config.devops.unwrap().personal_access_token, "secret");
    }

    #[test]
    fn environment_overrides_file() {
        let file = DevOpsConfig {
            organization_url: "https://dev.azure.com/file/".into(),
            personal_access_token: "file-pat".into(),
        };
        let conn = connection_from(Some(&file), None, Some("env-pat".into())).unwrap();
        assert_eq!(conn.organization_url, "https://dev.azure.com/file");
        assert_eq!(conn.personal_access_token, "env-pat");
    }

    #[test]
    fn missing_credentials_is_an_error() {
        let err = connection_from(None, Some("https://dev.azure.com/x".into()), None).unwrap_err();
        assert!(err.to_string().contains("AZURE_DEVOPS_PAT"));
    }

    #[test]
    fn timezone_parses() {
        let defaults = Defaults::default();
        assert_eq!(defaults.business_timezone().unwrap(), chrono_tz::America::Chicago);
        let bad = Defaults {
            timezone: "Mars/Olympus".into(),
            ..Defaults::default()
        };
        assert!(bad.business_timezone().is_err());
    }
}
