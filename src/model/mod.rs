pub mod attendance;
pub mod department;
pub mod employee;
pub mod message;
pub mod paystub;
pub mod role;
pub mod task;
pub mod team;
pub mod time_entry;
pub mod time_off;
pub mod user;

use std::str::FromStr;

use crate::error::AppError;

/// Parses an enum stored as text, reporting the column on failure.
pub(crate) fn parse_column<T: FromStr>(value: &str, column: &str) -> Result<T, AppError> {
    value
        .parse::<T>()
        .map_err(|_| AppError::Internal(format!("unexpected value {value:?} in column {column}")))
}
