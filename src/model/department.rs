use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Department {
    #[schema(example = 3)]
    pub id: u64,
    #[schema(example = "Human Resources")]
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}
