use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{error::AppError, model::parse_column, model::role::Role};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmployeeRow {
    pub id: u64,
    pub user_id: u64,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub department_id: Option<u64>,
    pub position: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub salary: Option<f64>,
    pub manager_id: Option<u64>,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "user_id": 7,
        "employee_code": "EMP-001",
        "first_name": "John",
        "last_name": "Doe",
        "department_id": 10,
        "position": "Engineer",
        "hire_date": "2024-01-01",
        "salary": 72000.0,
        "manager_id": 4,
        "role": "employee"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 7)]
    pub user_id: u64,

    #[schema(example = "EMP-001")]
    pub employee_code: String,

    #[schema(example = "John")]
    pub first_name: String,

    #[schema(example = "Doe")]
    pub last_name: String,

    #[schema(example = 10, nullable = true)]
    pub department_id: Option<u64>,

    #[schema(example = "Engineer", nullable = true)]
    pub position: Option<String>,

    #[schema(example = "2024-01-01", value_type = Option<String>)]
    pub hire_date: Option<NaiveDate>,

    #[schema(example = 72000.0, nullable = true)]
    pub salary: Option<f64>,

    /// Employee id of this employee's manager
    #[schema(example = 4, nullable = true)]
    pub manager_id: Option<u64>,

    pub role: Role,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = AppError;

    fn try_from(row: EmployeeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: parse_column(&row.role, "employees.role")?,
            id: row.id,
            user_id: row.user_id,
            employee_code: row.employee_code,
            first_name: row.first_name,
            last_name: row.last_name,
            department_id: row.department_id,
            position: row.position,
            hire_date: row.hire_date,
            salary: row.salary,
            manager_id: row.manager_id,
        })
    }
}

pub const EMPLOYEE_COLUMNS: &str = "id, user_id, employee_code, first_name, last_name, \
     department_id, position, hire_date, salary, manager_id, role";

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str) -> EmployeeRow {
        EmployeeRow {
            id: 1,
            user_id: 7,
            employee_code: "EMP-001".into(),
            first_name: "John".into(),
            last_name: "Doe".into(),
            department_id: None,
            position: None,
            hire_date: None,
            salary: Some(1000.0),
            manager_id: Some(4),
            role: role.into(),
        }
    }

    #[test]
    fn row_converts_with_known_role() {
        let employee = Employee::try_from(row("manager")).unwrap();
        assert_eq!(employee.role, Role::Manager);
        assert_eq!(employee.full_name(), "John Doe");
    }

    #[test]
    fn unknown_role_is_an_error() {
        assert!(Employee::try_from(row("superuser")).is_err());
    }
}
