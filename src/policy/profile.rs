//! Field-level permissions for the profile edit form.
//!
//! One table, keyed by whether the actor is an admin and whether they edit
//! their own record, drives both the form description handed to clients and
//! the server-side check of a submission.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::FieldErrors,
    model::{employee::Employee, role::Role},
    utils::db_utils::SqlValue,
    workflow::Member,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Display, AsRefStr, EnumIter, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProfileField {
    Username,
    Email,
    Bio,
    Password,
    IsActive,
    Role,
    EmployeeCode,
    FirstName,
    LastName,
    DepartmentId,
    Position,
    HireDate,
    Salary,
    ManagerId,
}

impl ProfileField {
    /// Fields stored on the employee record rather than the user.
    pub fn is_employee_field(self) -> bool {
        matches!(
            self,
            ProfileField::Role
                | ProfileField::EmployeeCode
                | ProfileField::FirstName
                | ProfileField::LastName
                | ProfileField::DepartmentId
                | ProfileField::Position
                | ProfileField::HireDate
                | ProfileField::Salary
                | ProfileField::ManagerId
        )
    }

    pub fn column(self) -> &'static str {
        match self {
            ProfileField::Username => "username",
            ProfileField::Email => "email",
            ProfileField::Bio => "bio",
            ProfileField::Password => "password_hash",
            ProfileField::IsActive => "is_active",
            ProfileField::Role => "role",
            ProfileField::EmployeeCode => "employee_code",
            ProfileField::FirstName => "first_name",
            ProfileField::LastName => "last_name",
            ProfileField::DepartmentId => "department_id",
            ProfileField::Position => "position",
            ProfileField::HireDate => "hire_date",
            ProfileField::Salary => "salary",
            ProfileField::ManagerId => "manager_id",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldAccess {
    Hidden,
    ReadOnly,
    Editable,
}

/// Who edits whom.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EditContext {
    pub actor_is_admin: bool,
    pub self_edit: bool,
    pub target_has_employee: bool,
}

impl EditContext {
    pub fn new(actor: &Member, target: &Member) -> Self {
        Self {
            actor_is_admin: actor.is_admin(),
            self_edit: actor.user_id == target.user_id,
            target_has_employee: target.employee_id.is_some(),
        }
    }

    pub fn access(&self, field: ProfileField) -> FieldAccess {
        use FieldAccess::*;
        use ProfileField::*;

        if field.is_employee_field() && !self.target_has_employee {
            return Hidden;
        }

        match (field, self.actor_is_admin, self.self_edit) {
            (Username | Email | Bio, true, _) => Editable,
            (Username | Email | Bio, false, true) => Editable,
            (Username | Email | Bio, false, false) => ReadOnly,

            (Password, true, _) | (Password, false, true) => Editable,
            (Password, false, false) => Hidden,

            (IsActive, true, false) => Editable,
            (IsActive, _, _) => ReadOnly,

            (Role, true, false) => Editable,
            (Role, true, true) => ReadOnly,
            (Role, false, _) => Hidden,

            (Salary, true, _) => Editable,
            (Salary, false, true) => ReadOnly,
            (Salary, false, false) => Hidden,

            (EmployeeCode | FirstName | LastName | DepartmentId | Position | HireDate | ManagerId, true, _) => {
                Editable
            }
            (EmployeeCode | FirstName | LastName | DepartmentId | Position | HireDate | ManagerId, false, _) => {
                ReadOnly
            }
        }
    }

    fn denial(&self, field: ProfileField) -> &'static str {
        match field {
            ProfileField::Role if self.self_edit && self.actor_is_admin => "You cannot change your own role.",
            ProfileField::IsActive if self.self_edit => "You cannot deactivate your own account.",
            f if f.is_employee_field() && !self.target_has_employee => "This user has no employee record.",
            _ => "You do not have permission to change this field.",
        }
    }
}

/// Current values of the edited record.
#[derive(Debug, Clone)]
pub struct ProfileSnapshot {
    pub user_id: u64,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub is_active: bool,
    pub employee: Option<Employee>,
}

impl ProfileSnapshot {
    fn value(&self, field: ProfileField) -> Value {
        let employee = self.employee.as_ref();
        match field {
            ProfileField::Username => json!(self.username),
            ProfileField::Email => json!(self.email),
            ProfileField::Bio => json!(self.bio),
            ProfileField::Password => Value::Null,
            ProfileField::IsActive => json!(self.is_active),
            ProfileField::Role => json!(employee.map(|e| e.role)),
            ProfileField::EmployeeCode => json!(employee.map(|e| &e.employee_code)),
            ProfileField::FirstName => json!(employee.map(|e| &e.first_name)),
            ProfileField::LastName => json!(employee.map(|e| &e.last_name)),
            ProfileField::DepartmentId => json!(employee.and_then(|e| e.department_id)),
            ProfileField::Position => json!(employee.and_then(|e| e.position.as_ref())),
            ProfileField::HireDate => json!(employee.and_then(|e| e.hire_date)),
            ProfileField::Salary => json!(employee.and_then(|e| e.salary)),
            ProfileField::ManagerId => json!(employee.and_then(|e| e.manager_id)),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FormField {
    pub name: ProfileField,
    pub access: FieldAccess,
    #[schema(value_type = Object)]
    pub value: Value,
}

/// Visible fields of the edit form with their current values.
pub fn build_form(ctx: &EditContext, current: &ProfileSnapshot) -> Vec<FormField> {
    ProfileField::iter()
        .filter_map(|field| match ctx.access(field) {
            FieldAccess::Hidden => None,
            access => Some(FormField {
                name: field,
                access,
                value: current.value(field),
            }),
        })
        .collect()
}

/// Missing key -> None, explicit null -> Some(None).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct ProfileSubmission {
    #[validate(length(min = 3, max = 64, message = "Username must be between 3 and 64 characters"))]
    pub username: Option<String>,

    #[validate(email(message = "Invalid email address"), length(max = 120, message = "Email is too long"))]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub bio: Option<Option<String>>,

    pub password: Option<String>,

    pub confirm_password: Option<String>,

    pub is_active: Option<bool>,

    pub role: Option<Role>,

    #[validate(length(min = 1, max = 20, message = "Employee code must be between 1 and 20 characters"))]
    pub employee_code: Option<String>,

    #[validate(length(min = 1, max = 50, message = "First name must be between 1 and 50 characters"))]
    pub first_name: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Last name must be between 1 and 50 characters"))]
    pub last_name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<u64>)]
    pub department_id: Option<Option<u64>>,

    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub position: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub hire_date: Option<Option<NaiveDate>>,

    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<f64>)]
    pub salary: Option<Option<f64>>,

    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<u64>)]
    pub manager_id: Option<Option<u64>>,
}

/// Accepted column changes, split by table.
#[derive(Debug, Default, PartialEq)]
pub struct ProfileChanges {
    pub user: Vec<(&'static str, SqlValue)>,
    pub employee: Vec<(&'static str, SqlValue)>,
    /// Plain text, hashed by the caller
    pub password: Option<String>,
    pub touched: Vec<ProfileField>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.employee.is_empty() && self.password.is_none()
    }

    pub fn manager_change(&self) -> Option<u64> {
        self.employee.iter().find_map(|(column, value)| match (column, value) {
            (&"manager_id", SqlValue::Int(id)) => *id,
            _ => None,
        })
    }
}

/// Checks a submission against the permission table and content rules.
///
/// A field equal to its current value is not a change and is never rejected.
pub fn validate_submission(
    ctx: &EditContext,
    current: &ProfileSnapshot,
    submission: &ProfileSubmission,
) -> Result<ProfileChanges, FieldErrors> {
    let mut errors = match submission.validate() {
        Ok(()) => FieldErrors::new(),
        Err(e) => FieldErrors::from(e),
    };
    let mut changes = ProfileChanges::default();
    let employee = current.employee.as_ref();

    let mut gate = |field: ProfileField, changed: bool, value: SqlValue, changes: &mut ProfileChanges| {
        if !changed {
            return;
        }
        if ctx.access(field) != FieldAccess::Editable {
            errors.add(field.as_ref(), ctx.denial(field));
            return;
        }
        changes.touched.push(field);
        if field.is_employee_field() {
            changes.employee.push((field.column(), value));
        } else {
            changes.user.push((field.column(), value));
        }
    };

    if let Some(username) = &submission.username {
        gate(ProfileField::Username, *username != current.username, username.clone().into(), &mut changes);
    }
    if let Some(email) = &submission.email {
        gate(ProfileField::Email, *email != current.email, email.clone().into(), &mut changes);
    }
    if let Some(bio) = &submission.bio {
        gate(ProfileField::Bio, *bio != current.bio, bio.clone().into(), &mut changes);
    }
    if let Some(is_active) = submission.is_active {
        gate(ProfileField::IsActive, is_active != current.is_active, SqlValue::Bool(is_active), &mut changes);
    }
    if let Some(role) = submission.role {
        let changed = employee.map(|e| e.role) != Some(role);
        gate(ProfileField::Role, changed, role.as_ref().to_string().into(), &mut changes);
    }
    if let Some(code) = &submission.employee_code {
        let changed = employee.map(|e| &e.employee_code) != Some(code);
        gate(ProfileField::EmployeeCode, changed, code.clone().into(), &mut changes);
    }
    if let Some(first) = &submission.first_name {
        let changed = employee.map(|e| &e.first_name) != Some(first);
        gate(ProfileField::FirstName, changed, first.clone().into(), &mut changes);
    }
    if let Some(last) = &submission.last_name {
        let changed = employee.map(|e| &e.last_name) != Some(last);
        gate(ProfileField::LastName, changed, last.clone().into(), &mut changes);
    }
    if let Some(department) = submission.department_id {
        let changed = employee.map(|e| e.department_id) != Some(department);
        gate(ProfileField::DepartmentId, changed, department.into(), &mut changes);
    }
    if let Some(position) = &submission.position {
        let changed = employee.map(|e| &e.position) != Some(position);
        gate(ProfileField::Position, changed, position.clone().into(), &mut changes);
    }
    if let Some(hire_date) = submission.hire_date {
        let changed = employee.map(|e| e.hire_date) != Some(hire_date);
        gate(ProfileField::HireDate, changed, hire_date.into(), &mut changes);
    }
    if let Some(salary) = submission.salary {
        let changed = employee.map(|e| e.salary) != Some(salary);
        gate(ProfileField::Salary, changed, salary.into(), &mut changes);
    }
    if let Some(manager) = submission.manager_id {
        let changed = employee.map(|e| e.manager_id) != Some(manager);
        gate(ProfileField::ManagerId, changed, manager.into(), &mut changes);
    }

    // blank password means "keep the current one"
    if let Some(password) = submission.password.as_deref().filter(|p| !p.trim().is_empty()) {
        if ctx.access(ProfileField::Password) != FieldAccess::Editable {
            errors.add(ProfileField::Password.as_ref(), ctx.denial(ProfileField::Password));
        } else if password.chars().count() < 6 {
            errors.add(ProfileField::Password.as_ref(), "Password must be at least 6 characters");
        } else if submission.confirm_password.as_deref() != Some(password) {
            errors.add("confirm_password", "Passwords must match");
        } else {
            changes.password = Some(password.to_string());
            changes.touched.push(ProfileField::Password);
        }
    }

    if let Some(Some(bio)) = &submission.bio {
        if bio.chars().count() > 200 {
            errors.add("bio", "Bio must be at most 200 characters");
        }
    }
    if let Some(Some(position)) = &submission.position {
        if position.chars().count() > 100 {
            errors.add("position", "Position must be at most 100 characters");
        }
    }
    if let Some(Some(salary)) = submission.salary {
        if !salary.is_finite() || salary < 0.0 {
            errors.add("salary", "Salary must be zero or greater");
        }
    }
    if let (Some(Some(manager)), Some(e)) = (submission.manager_id, employee) {
        if manager == e.id {
            errors.add("manager_id", "An employee cannot manage themselves");
        }
    }

    if errors.is_empty() { Ok(changes) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(actor_is_admin: bool, self_edit: bool) -> EditContext {
        EditContext {
            actor_is_admin,
            self_edit,
            target_has_employee: true,
        }
    }

    fn snapshot(role: Role) -> ProfileSnapshot {
        ProfileSnapshot {
            user_id: 1,
            username: "alice".into(),
            email: "alice@company.com".into(),
            bio: None,
            is_active: true,
            employee: Some(Employee {
                id: 11,
                user_id: 1,
                employee_code: "EMP-011".into(),
                first_name: "Alice".into(),
                last_name: "Smith".into(),
                department_id: Some(2),
                position: Some("Engineer".into()),
                hire_date: None,
                salary: Some(5000.0),
                manager_id: Some(4),
                role,
            }),
        }
    }

    #[test]
    fn role_visibility_follows_table() {
        assert_eq!(ctx(true, false).access(ProfileField::Role), FieldAccess::Editable);
        assert_eq!(ctx(true, true).access(ProfileField::Role), FieldAccess::ReadOnly);
        assert_eq!(ctx(false, true).access(ProfileField::Role), FieldAccess::Hidden);
        assert_eq!(ctx(false, false).access(ProfileField::Role), FieldAccess::Hidden);
    }

    #[test]
    fn identity_fields_belong_to_owner_and_admin() {
        for field in [ProfileField::Username, ProfileField::Email] {
            assert_eq!(ctx(false, true).access(field), FieldAccess::Editable);
            assert_eq!(ctx(true, false).access(field), FieldAccess::Editable);
            assert_eq!(ctx(false, false).access(field), FieldAccess::ReadOnly);
        }
    }

    #[test]
    fn employee_fields_are_admin_only() {
        for field in [ProfileField::DepartmentId, ProfileField::Position, ProfileField::Salary] {
            assert_eq!(ctx(true, true).access(field), FieldAccess::Editable);
            assert_ne!(ctx(false, true).access(field), FieldAccess::Editable);
        }
        assert_eq!(ctx(false, false).access(ProfileField::Salary), FieldAccess::Hidden);
    }

    #[test]
    fn employee_fields_hidden_without_employee_record() {
        let ctx = EditContext {
            actor_is_admin: true,
            self_edit: false,
            target_has_employee: false,
        };
        assert_eq!(ctx.access(ProfileField::Position), FieldAccess::Hidden);
        assert_eq!(ctx.access(ProfileField::Role), FieldAccess::Hidden);
        assert_eq!(ctx.access(ProfileField::Username), FieldAccess::Editable);
    }

    #[test]
    fn admin_cannot_change_own_role() {
        let submission = ProfileSubmission {
            role: Some(Role::Employee),
            ..Default::default()
        };
        let errors = validate_submission(&ctx(true, true), &snapshot(Role::Admin), &submission).unwrap_err();
        assert_eq!(errors.messages("role"), ["You cannot change your own role."]);
    }

    #[test]
    fn resubmitting_own_role_unchanged_is_accepted() {
        let submission = ProfileSubmission {
            role: Some(Role::Admin),
            username: Some("alice".into()),
            ..Default::default()
        };
        let changes = validate_submission(&ctx(true, true), &snapshot(Role::Admin), &submission).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn admin_changes_other_users_role() {
        let submission = ProfileSubmission {
            role: Some(Role::Manager),
            ..Default::default()
        };
        let changes = validate_submission(&ctx(true, false), &snapshot(Role::Employee), &submission).unwrap();
        assert_eq!(changes.employee, vec![("role", SqlValue::Text(Some("manager".into())))]);
        assert_eq!(changes.touched, vec![ProfileField::Role]);
    }

    #[test]
    fn owner_cannot_raise_own_salary_or_move_department() {
        let submission = ProfileSubmission {
            salary: Some(Some(9000.0)),
            department_id: Some(Some(7)),
            bio: Some(Some("hello".into())),
            ..Default::default()
        };
        let errors = validate_submission(&ctx(false, true), &snapshot(Role::Employee), &submission).unwrap_err();
        assert!(errors.contains("salary"));
        assert!(errors.contains("department_id"));
        assert!(!errors.contains("bio"));
    }

    #[test]
    fn owner_updates_identity_fields() {
        let submission = ProfileSubmission {
            username: Some("alice2".into()),
            email: Some("alice2@company.com".into()),
            bio: Some(None),
            ..Default::default()
        };
        let mut current = snapshot(Role::Employee);
        current.bio = Some("old".into());
        let changes = validate_submission(&ctx(false, true), &current, &submission).unwrap();
        assert_eq!(
            changes.user,
            vec![
                ("username", SqlValue::Text(Some("alice2".into()))),
                ("email", SqlValue::Text(Some("alice2@company.com".into()))),
                ("bio", SqlValue::Text(None)),
            ]
        );
        assert!(changes.employee.is_empty());
    }

    #[test]
    fn admin_cannot_deactivate_self() {
        let submission = ProfileSubmission {
            is_active: Some(false),
            ..Default::default()
        };
        let errors = validate_submission(&ctx(true, true), &snapshot(Role::Admin), &submission).unwrap_err();
        assert_eq!(errors.messages("is_active"), ["You cannot deactivate your own account."]);
    }

    #[test]
    fn content_rules_apply() {
        let submission = ProfileSubmission {
            username: Some("ab".into()),
            email: Some("not-an-email".into()),
            password: Some("secret1".into()),
            confirm_password: Some("secret2".into()),
            manager_id: Some(Some(11)),
            ..Default::default()
        };
        let errors = validate_submission(&ctx(true, false), &snapshot(Role::Employee), &submission).unwrap_err();
        assert!(errors.contains("username"));
        assert!(errors.contains("email"));
        assert!(errors.contains("confirm_password"));
        assert_eq!(errors.messages("manager_id"), ["An employee cannot manage themselves"]);
    }

    #[test]
    fn password_change_is_collected_when_confirmed() {
        let submission = ProfileSubmission {
            password: Some("secret1".into()),
            confirm_password: Some("secret1".into()),
            ..Default::default()
        };
        let changes = validate_submission(&ctx(false, true), &snapshot(Role::Employee), &submission).unwrap();
        assert_eq!(changes.password.as_deref(), Some("secret1"));
        assert!(changes.user.is_empty());
    }

    #[test]
    fn blank_password_keeps_current() {
        let submission = ProfileSubmission {
            password: Some(String::new()),
            confirm_password: Some(String::new()),
            bio: Some(Some("hi".into())),
            ..Default::default()
        };
        let changes = validate_submission(&ctx(false, true), &snapshot(Role::Employee), &submission).unwrap();
        assert!(changes.password.is_none());
        assert!(changes.touched.contains(&ProfileField::Bio));
        assert!(!changes.touched.contains(&ProfileField::Password));
    }

    #[test]
    fn short_password_is_rejected() {
        let submission = ProfileSubmission {
            password: Some("abc".into()),
            confirm_password: Some("abc".into()),
            ..Default::default()
        };
        let errors = validate_submission(&ctx(false, true), &snapshot(Role::Employee), &submission).unwrap_err();
        assert_eq!(errors.messages("password"), ["Password must be at least 6 characters"]);
    }

    #[test]
    fn manager_change_is_reported() {
        let submission = ProfileSubmission {
            manager_id: Some(Some(30)),
            ..Default::default()
        };
        let changes = validate_submission(&ctx(true, false), &snapshot(Role::Employee), &submission).unwrap();
        assert_eq!(changes.manager_change(), Some(30));
    }

    #[test]
    fn form_renders_same_table() {
        let fields = build_form(&ctx(true, true), &snapshot(Role::Admin));
        let role = fields.iter().find(|f| f.name == ProfileField::Role).unwrap();
        assert_eq!(role.access, FieldAccess::ReadOnly);
        assert_eq!(role.value, json!("admin"));

        let fields = build_form(&ctx(false, false), &snapshot(Role::Employee));
        assert!(fields.iter().all(|f| f.name != ProfileField::Role));
        assert!(fields.iter().all(|f| f.name != ProfileField::Salary));
        assert!(fields.iter().all(|f| f.access == FieldAccess::ReadOnly));
    }
}
