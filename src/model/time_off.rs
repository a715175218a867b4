use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::{
    error::{AppError, FieldErrors},
    model::parse_column,
};

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimeOffType {
    Vacation,
    Sick,
    Unpaid,
    Other,
}

/// Workflow state of a request.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimeOffStatus {
    Pending,
    /// Awaiting the HR decision
    ManagerApproved,
    Approved,
    Denied,
    Cancelled,
}

impl TimeOffStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TimeOffStatus::Approved | TimeOffStatus::Denied | TimeOffStatus::Cancelled
        )
    }

    /// States that still hold (or will hold) days off the calendar.
    pub fn blocks_calendar(self) -> bool {
        matches!(
            self,
            TimeOffStatus::Pending | TimeOffStatus::ManagerApproved | TimeOffStatus::Approved
        )
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TimeOffRow {
    pub id: u64,
    pub user_id: u64,
    pub manager_id: Option<u64>,
    pub hr_id: Option<u64>,
    pub kind: String,
    pub status: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    pub manager_decision_at: Option<DateTime<Utc>>,
    pub hr_decision_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const TIME_OFF_COLUMNS: &str = "id, user_id, manager_id, hr_id, kind, status, start_date, \
     end_date, reason, manager_decision_at, hr_decision_at, created_at, updated_at";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TimeOffRequest {
    #[schema(example = 12)]
    pub id: u64,
    /// Requesting user
    #[schema(example = 7)]
    pub user_id: u64,
    /// User id of the manager assigned to (or deciding) the first stage
    pub manager_id: Option<u64>,
    /// User id of the HR approver
    pub hr_id: Option<u64>,
    #[serde(rename = "type")]
    pub kind: TimeOffType,
    pub status: TimeOffStatus,
    #[schema(example = "2026-01-05", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-09", value_type = String)]
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    #[schema(example = 5)]
    pub duration_days: i64,
    #[schema(value_type = Option<String>)]
    pub manager_decision_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub hr_decision_at: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl TimeOffRequest {
    /// True when the inclusive ranges share at least one day.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        !(self.end_date < start || self.start_date > end)
    }
}

impl TryFrom<TimeOffRow> for TimeOffRequest {
    type Error = AppError;

    fn try_from(row: TimeOffRow) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: parse_column(&row.kind, "time_off_requests.kind")?,
            status: parse_column(&row.status, "time_off_requests.status")?,
            duration_days: duration_days(row.start_date, row.end_date),
            id: row.id,
            user_id: row.user_id,
            manager_id: row.manager_id,
            hr_id: row.hr_id,
            start_date: row.start_date,
            end_date: row.end_date,
            reason: row.reason,
            manager_decision_at: row.manager_decision_at,
            hr_decision_at: row.hr_decision_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Inclusive day count of a range, zero for inverted ranges.
pub fn duration_days(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        0
    } else {
        (end - start).num_days() + 1
    }
}

pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if end < start {
        errors.add("end_date", "end_date must be on or after start_date");
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = validate_date_range(date("2025-01-10"), date("2025-01-05")).unwrap_err();
        assert!(err.contains("end_date"));
    }

    #[test]
    fn single_day_range_is_valid() {
        assert!(validate_date_range(date("2025-01-10"), date("2025-01-10")).is_ok());
        assert_eq!(duration_days(date("2025-01-10"), date("2025-01-10")), 1);
        assert_eq!(duration_days(date("2025-01-10"), date("2025-01-14")), 5);
        assert_eq!(duration_days(date("2025-01-10"), date("2025-01-05")), 0);
    }

    #[test]
    fn status_strings_match_storage() {
        assert_eq!(TimeOffStatus::ManagerApproved.as_ref(), "manager_approved");
        assert_eq!(
            TimeOffStatus::from_str("manager_approved").unwrap(),
            TimeOffStatus::ManagerApproved
        );
        assert!(TimeOffStatus::Cancelled.is_terminal());
        assert!(!TimeOffStatus::ManagerApproved.is_terminal());
        assert!(!TimeOffStatus::Denied.blocks_calendar());
    }

    #[test]
    fn overlap_is_inclusive() {
        let row = TimeOffRow {
            id: 1,
            user_id: 1,
            manager_id: None,
            hr_id: None,
            kind: "vacation".into(),
            status: "pending".into(),
            start_date: date("2025-03-01"),
            end_date: date("2025-03-05"),
            reason: None,
            manager_decision_at: None,
            hr_decision_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let request = TimeOffRequest::try_from(row).unwrap();
        assert_eq!(request.duration_days, 5);
        assert!(request.overlaps(date("2025-03-05"), date("2025-03-07")));
        assert!(request.overlaps(date("2025-02-20"), date("2025-03-01")));
        assert!(!request.overlaps(date("2025-03-06"), date("2025-03-07")));
    }
}
