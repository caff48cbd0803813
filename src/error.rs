use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("File ({}) already exists.", .0.display())]
    OutputExists(PathBuf),

    #[error("Iteration {0} not found within the reporting window")]
    IterationNotFound(String),

    #[error("No current iteration found for team {0}")]
    NoCurrentIteration(String),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidQueryValue { field: &'static str, value: String },

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Missing Azure DevOps credentials. Set AZURE_DEVOPS_PAT or add [devops] to ~/.sprint-export/config.toml")]
    MissingCredentials,
}
