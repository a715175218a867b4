use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::{error::AppError, model::parse_column};

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
    Late,
    Excused,
}

#[derive(Debug, sqlx::FromRow)]
pub struct AttendanceRow {
    pub id: u64,
    pub user_id: u64,
    pub date: NaiveDate,
    pub status: String,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub const ATTENDANCE_COLUMNS: &str = "id, user_id, date, status, note, updated_at";

/// One record per user and day.
#[derive(Debug, Serialize, ToSchema)]
pub struct Attendance {
    pub id: u64,
    pub user_id: u64,
    #[schema(value_type = String, example = "2026-01-05")]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AttendanceRow> for Attendance {
    type Error = AppError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: parse_column(&row.status, "attendances.status")?,
            id: row.id,
            user_id: row.user_id,
            date: row.date,
            note: row.note,
            updated_at: row.updated_at,
        })
    }
}
