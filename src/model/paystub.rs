use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::FieldErrors;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Paystub {
    pub id: u64,
    pub user_id: u64,
    #[schema(value_type = String, example = "2026-01-01")]
    pub pay_period_start: NaiveDate,
    #[schema(value_type = String, example = "2026-01-31")]
    pub pay_period_end: NaiveDate,
    #[schema(example = 5000.0)]
    pub gross_pay: f64,
    #[schema(example = 900.0)]
    pub taxes: f64,
    #[schema(example = 150.0)]
    pub deductions: f64,
    #[schema(example = 3950.0)]
    pub net_pay: f64,
    pub notes: Option<String>,
    #[schema(value_type = Option<String>)]
    pub issued_at: Option<DateTime<Utc>>,
}

pub const PAYSTUB_COLUMNS: &str = "id, user_id, pay_period_start, pay_period_end, gross_pay, \
     taxes, deductions, net_pay, notes, issued_at";

/// Monetary amounts are kept to the cent.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

pub fn net_pay(gross: f64, taxes: f64, deductions: f64) -> f64 {
    round_cents(round_cents(gross) - round_cents(taxes) - round_cents(deductions))
}

pub fn validate_paystub(
    period_start: NaiveDate,
    period_end: NaiveDate,
    gross: f64,
    taxes: f64,
    deductions: f64,
) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if period_start > period_end {
        errors.add(
            "pay_period_end",
            "pay_period_start must be before or equal to pay_period_end",
        );
    }
    for (field, amount) in [("gross_pay", gross), ("taxes", taxes), ("deductions", deductions)] {
        if !amount.is_finite() || amount < 0.0 {
            errors.add(field, "Amount must be zero or greater");
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn net_pay_subtracts_and_rounds() {
        assert_eq!(net_pay(5000.0, 900.0, 150.0), 3950.0);
        assert_eq!(net_pay(10.499, 0.0, 0.0), 10.5);
        assert_eq!(net_pay(100.10, 20.20, 0.0), 79.9);
    }

    #[test]
    fn rejects_negative_amounts_and_inverted_period() {
        let errors =
            validate_paystub(date("2026-02-01"), date("2026-01-31"), -1.0, 0.0, f64::NAN).unwrap_err();
        assert!(errors.contains("pay_period_end"));
        assert!(errors.contains("gross_pay"));
        assert!(errors.contains("deductions"));
        assert!(!errors.contains("taxes"));
    }

    #[test]
    fn accepts_single_day_period() {
        assert!(validate_paystub(date("2026-01-31"), date("2026-01-31"), 10.0, 1.0, 1.0).is_ok());
    }
}
