use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    pub id: String,
    pub name: String,
    pub path: String,
    pub start_date: Option<DateTime<Utc>>,
    /// Due date of the sprint.
    pub finish_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capacity {
    pub team_member: String,
    /// Sum over all activities.
    pub capacity_per_day: f64,
    pub days_per_iteration: u32,
    pub iteration_path: String,
}
