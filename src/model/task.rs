use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::{error::AppError, model::parse_column};

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TaskRow {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub assigned_to_id: u64,
    pub created_by_id: u64,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub const TASK_COLUMNS: &str = "id, title, description, status, priority, assigned_to_id, \
     created_by_id, due_date, completed_at, created_at";

#[derive(Debug, Serialize, ToSchema)]
pub struct Task {
    pub id: u64,
    #[schema(example = "Prepare onboarding checklist")]
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned_to_id: u64,
    pub created_by_id: u64,
    #[schema(value_type = Option<String>)]
    pub due_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>)]
    pub completed_at: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn can_view(&self, user_id: u64, is_admin: bool) -> bool {
        is_admin || self.assigned_to_id == user_id || self.created_by_id == user_id
    }

    pub fn can_update_status(&self, user_id: u64, is_admin: bool) -> bool {
        is_admin || self.assigned_to_id == user_id
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: parse_column(&row.status, "tasks.status")?,
            priority: parse_column(&row.priority, "tasks.priority")?,
            id: row.id,
            title: row.title,
            description: row.description,
            assigned_to_id: row.assigned_to_id,
            created_by_id: row.created_by_id,
            due_date: row.due_date,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(assigned_to_id: u64, created_by_id: u64) -> Task {
        Task {
            id: 1,
            title: "Prepare onboarding checklist".into(),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            assigned_to_id,
            created_by_id,
            due_date: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn creator_views_but_only_assignee_updates() {
        let task = task(2, 3);
        assert!(task.can_view(2, false));
        assert!(task.can_view(3, false));
        assert!(!task.can_view(4, false));
        assert!(task.can_update_status(2, false));
        assert!(!task.can_update_status(3, false));
    }

    #[test]
    fn admins_bypass_ownership() {
        let task = task(2, 3);
        assert!(task.can_view(9, true));
        assert!(task.can_update_status(9, true));
    }
}
