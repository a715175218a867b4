use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct TimeEntry {
    pub id: u64,
    pub user_id: u64,
    #[schema(value_type = String)]
    pub clock_in: DateTime<Utc>,
    #[schema(value_type = Option<String>)]
    pub clock_out: Option<DateTime<Utc>>,
}

impl TimeEntry {
    /// Worked minutes, None while the entry is still open.
    pub fn worked_minutes(&self) -> Option<i64> {
        self.clock_out.map(|out| (out - self.clock_in).num_minutes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn open_entry_has_no_duration() {
        let entry = TimeEntry {
            id: 1,
            user_id: 2,
            clock_in: Utc::now(),
            clock_out: None,
        };
        assert_eq!(entry.worked_minutes(), None);
    }

    #[test]
    fn closed_entry_reports_minutes() {
        let clock_in = Utc::now();
        let entry = TimeEntry {
            id: 1,
            user_id: 2,
            clock_in,
            clock_out: Some(clock_in + Duration::minutes(95)),
        };
        assert_eq!(entry.worked_minutes(), Some(95));
    }
}
