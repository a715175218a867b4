use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Team {
    pub id: u64,
    #[schema(example = "Platform")]
    pub name: String,
    pub description: Option<String>,
    pub department_id: Option<u64>,
    /// Employee id of the team lead
    pub lead_id: Option<u64>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct TeamMember {
    pub user_id: u64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}
