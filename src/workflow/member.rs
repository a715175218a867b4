use serde::Serialize;
use sqlx::MySqlPool;

use crate::{
    error::{AppError, AppResult},
    model::{parse_column, role::Role},
};

/// A user resolved together with their employee record, role and department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub user_id: u64,
    pub username: String,
    pub employee_id: Option<u64>,
    pub role: Option<Role>,
    /// Employee id of this member's manager
    pub manager_id: Option<u64>,
    pub department: Option<String>,
}

impl Member {
    pub fn is_admin(&self) -> bool {
        self.role.is_some_and(Role::is_admin)
    }

    pub fn is_reviewer(&self) -> bool {
        self.role.is_some_and(Role::is_reviewer)
    }

    /// Manager or admin employee of the HR department.
    pub fn is_hr(&self, hr_department: &str) -> bool {
        let in_hr = self
            .department
            .as_deref()
            .is_some_and(|d| d.trim().eq_ignore_ascii_case(hr_department.trim()));
        in_hr && self.is_reviewer()
    }

    pub fn is_hr_or_admin(&self, hr_department: &str) -> bool {
        self.is_admin() || self.is_hr(hr_department)
    }

    /// True when `other` reports directly to this member.
    pub fn manages(&self, other: &Member) -> bool {
        matches!((self.employee_id, other.manager_id), (Some(me), Some(theirs)) if me == theirs)
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    user_id: u64,
    username: String,
    employee_id: Option<u64>,
    role: Option<String>,
    manager_id: Option<u64>,
    department: Option<String>,
}

impl TryFrom<MemberRow> for Member {
    type Error = AppError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let role = match row.role.as_deref() {
            Some(value) => Some(parse_column::<Role>(value, "employees.role")?),
            None => None,
        };
        Ok(Self {
            user_id: row.user_id,
            username: row.username,
            employee_id: row.employee_id,
            role,
            manager_id: row.manager_id,
            department: row.department,
        })
    }
}

const MEMBER_SQL: &str = r#"
    SELECT
        u.id AS user_id,
        u.username,
        e.id AS employee_id,
        e.role,
        e.manager_id,
        d.name AS department
    FROM users u
    LEFT JOIN employees e ON e.user_id = u.id
    LEFT JOIN departments d ON d.id = e.department_id
    WHERE u.id = ?
"#;

/// Loads a member by user id, regardless of the active flag.
pub async fn find_member(pool: &MySqlPool, user_id: u64) -> AppResult<Option<Member>> {
    let row = sqlx::query_as::<_, MemberRow>(MEMBER_SQL)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    row.map(Member::try_from).transpose()
}

/// Loads the acting member. Inactive or removed accounts are refused.
pub async fn load_actor(pool: &MySqlPool, user_id: u64) -> AppResult<Member> {
    let active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match active {
        Some(true) => find_member(pool, user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Account not found".into())),
        Some(false) => Err(AppError::Forbidden("Account is disabled".into())),
        None => Err(AppError::Unauthorized("Account not found".into())),
    }
}

/// User ids of every employee reporting to the given employee.
pub async fn subordinate_user_ids(pool: &MySqlPool, manager_employee_id: u64) -> AppResult<Vec<u64>> {
    let ids = sqlx::query_scalar::<_, u64>("SELECT user_id FROM employees WHERE manager_id = ?")
        .bind(manager_employee_id)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn member(user_id: u64, employee_id: u64, role: Role, manager_id: Option<u64>, dept: &str) -> Member {
        Member {
            user_id,
            username: format!("user{user_id}"),
            employee_id: Some(employee_id),
            role: Some(role),
            manager_id,
            department: Some(dept.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::member;
    use super::*;

    const HR: &str = "Human Resources";

    #[test]
    fn hr_requires_department_and_reviewer_role() {
        assert!(member(1, 1, Role::Manager, None, "human resources").is_hr(HR));
        assert!(member(1, 1, Role::Admin, None, "Human Resources").is_hr(HR));
        assert!(!member(1, 1, Role::Employee, None, "Human Resources").is_hr(HR));
        assert!(!member(1, 1, Role::Manager, None, "Engineering").is_hr(HR));
    }

    #[test]
    fn admins_count_as_hr_stage_reviewers() {
        let admin = member(1, 1, Role::Admin, None, "Engineering");
        assert!(!admin.is_hr(HR));
        assert!(admin.is_hr_or_admin(HR));
    }

    #[test]
    fn manages_follows_manager_pointer() {
        let boss = member(1, 10, Role::Manager, None, "Engineering");
        let report = member(2, 20, Role::Employee, Some(10), "Engineering");
        let other = member(3, 30, Role::Employee, Some(99), "Engineering");
        assert!(boss.manages(&report));
        assert!(!boss.manages(&other));
        assert!(!report.manages(&boss));
    }

    #[test]
    fn member_without_employee_has_no_authority() {
        let bare = Member {
            user_id: 5,
            username: "bare".into(),
            employee_id: None,
            role: None,
            manager_id: None,
            department: None,
        };
        assert!(!bare.is_reviewer());
        assert!(!bare.is_hr_or_admin(HR));
    }
}
