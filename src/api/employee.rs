use crate::{
    api::{profile::manager_assignment_error, require_admin},
    auth::{
        auth::AuthUser,
        handlers::{is_duplicate_key, release_identity},
    },
    error::{AppError, AppResult, ErrorBody, FieldErrors, MessageBody},
    model::{
        employee::{EMPLOYEE_COLUMNS, Employee, EmployeeRow},
        role::Role,
    },
    utils::{
        IdentityKind,
        db_utils::{SqlValue, bind_values, build_update_sql, execute_update},
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateEmployee {
    /// Account this employee record is attached to
    #[schema(example = 7)]
    pub user_id: u64,
    #[validate(length(min = 1, max = 20, message = "Employee code must be between 1 and 20 characters"))]
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[validate(length(min = 1, max = 50, message = "First name must be between 1 and 50 characters"))]
    #[schema(example = "John")]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "Last name must be between 1 and 50 characters"))]
    #[schema(example = "Doe")]
    pub last_name: String,
    pub department_id: Option<u64>,
    #[validate(length(max = 100, message = "Position must be at most 100 characters"))]
    pub position: Option<String>,
    #[schema(example = "2026-01-01", value_type = Option<String>)]
    pub hire_date: Option<NaiveDate>,
    #[validate(range(min = 0.0, message = "Salary must be zero or greater"))]
    pub salary: Option<f64>,
    /// Employee id of the manager
    pub manager_id: Option<u64>,
    pub role: Role,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct EmployeeQuery {
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub department_id: Option<u64>,
    pub manager_id: Option<u64>,
    pub role: Option<Role>,
    /// Search by name or employee code
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

/// Only the listed columns can be changed.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateEmployee {
    #[validate(length(min = 1, max = 20, message = "Employee code must be between 1 and 20 characters"))]
    pub employee_code: Option<String>,
    #[validate(length(min = 1, max = 50, message = "First name must be between 1 and 50 characters"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Last name must be between 1 and 50 characters"))]
    pub last_name: Option<String>,
    pub department_id: Option<u64>,
    #[validate(length(max = 100, message = "Position must be at most 100 characters"))]
    pub position: Option<String>,
    #[schema(example = "2026-01-01", value_type = Option<String>)]
    pub hire_date: Option<NaiveDate>,
    #[validate(range(min = 0.0, message = "Salary must be zero or greater"))]
    pub salary: Option<f64>,
    pub manager_id: Option<u64>,
    pub role: Option<Role>,
}

impl UpdateEmployee {
    fn into_changes(self) -> Vec<(&'static str, SqlValue)> {
        let mut changes: Vec<(&'static str, SqlValue)> = Vec::new();
        if let Some(v) = self.employee_code {
            changes.push(("employee_code", v.into()));
        }
        if let Some(v) = self.first_name {
            changes.push(("first_name", v.into()));
        }
        if let Some(v) = self.last_name {
            changes.push(("last_name", v.into()));
        }
        if let Some(v) = self.department_id {
            changes.push(("department_id", v.into()));
        }
        if let Some(v) = self.position {
            changes.push(("position", v.into()));
        }
        if let Some(v) = self.hire_date {
            changes.push(("hire_date", Some(v).into()));
        }
        if let Some(v) = self.salary {
            changes.push(("salary", Some(v).into()));
        }
        if let Some(v) = self.manager_id {
            changes.push(("manager_id", v.into()));
        }
        if let Some(v) = self.role {
            changes.push(("role", v.as_ref().to_string().into()));
        }
        changes
    }
}

async fn fetch_employee(pool: &MySqlPool, id: u64) -> AppResult<Employee> {
    let row = sqlx::query_as::<_, EmployeeRow>(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee not found".into()))?;
    Employee::try_from(row)
}

async fn check_department(pool: &MySqlPool, department_id: Option<u64>, errors: &mut FieldErrors) -> AppResult<()> {
    if let Some(id) = department_id {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM departments WHERE id = ?)")
            .bind(id)
            .fetch_one(pool)
            .await?;
        if !exists {
            errors.add("department_id", "Department not found");
        }
    }
    Ok(())
}

fn employee_conflict(e: sqlx::Error) -> AppError {
    if is_duplicate_key(&e) {
        AppError::Conflict("Employee code already in use or user already has an employee record".into())
    } else {
        e.into()
    }
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 403, description = "Admin only", body = ErrorBody),
        (status = 409, description = "Duplicate employee code or user", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;
    let payload = payload.into_inner();

    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(e) => e.into(),
    };
    let user_exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
        .bind(payload.user_id)
        .fetch_one(pool.get_ref())
        .await?;
    if !user_exists {
        errors.add("user_id", "User not found");
    }
    check_department(&pool, payload.department_id, &mut errors).await?;
    if let Some(manager_id) = payload.manager_id {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM employees WHERE id = ?)")
            .bind(manager_id)
            .fetch_one(pool.get_ref())
            .await?;
        if !exists {
            errors.add("manager_id", "Manager not found");
        }
    }
    errors.into_result()?;

    let result = sqlx::query(
        r#"
        INSERT INTO employees
            (user_id, employee_code, first_name, last_name, department_id, position, hire_date, salary, manager_id, role)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.user_id)
    .bind(&payload.employee_code)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(payload.department_id)
    .bind(&payload.position)
    .bind(payload.hire_date)
    .bind(payload.salary)
    .bind(payload.manager_id)
    .bind(payload.role.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(employee_conflict)?;

    let employee = fetch_employee(&pool, result.last_insert_id()).await?;
    info!(employee_id = employee.id, user_id = employee.user_id, name = %employee.full_name(), "Employee created");
    Ok(HttpResponse::Created().json(employee))
}

#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse),
        (status = 403, description = "Admin only", body = ErrorBody)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    // ---------- build WHERE clause dynamically ----------
    let mut conditions = Vec::new();
    let mut bindings: Vec<SqlValue> = Vec::new();

    if let Some(department_id) = query.department_id {
        conditions.push("department_id = ?");
        bindings.push(department_id.into());
    }

    if let Some(manager_id) = query.manager_id {
        conditions.push("manager_id = ?");
        bindings.push(manager_id.into());
    }

    if let Some(role) = query.role {
        conditions.push("role = ?");
        bindings.push(role.as_ref().to_string().into());
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("(first_name LIKE ? OR last_name LIKE ? OR employee_code LIKE ?)");
        let like = format!("%{}%", search);
        bindings.push(like.clone().into());
        bindings.push(like.clone().into());
        bindings.push(like.into());
    }

    let where_clause = if conditions.is_empty() {
        "".to_string()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) as total FROM employees {}", where_clause);
    debug!(sql = %count_sql, bindings = ?bindings, "Counting employees");

    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), bindings.iter().cloned())
        .fetch_one(pool.get_ref())
        .await?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees {} ORDER BY id DESC LIMIT ? OFFSET ?",
        where_clause
    );
    debug!(sql = %data_sql, page, per_page, offset, "Fetching employees");

    let rows = bind_values!(sqlx::query_as::<_, EmployeeRow>(&data_sql), bindings)
        .bind(per_page as i64)
        .bind(offset as i64)
        .fetch_all(pool.get_ref())
        .await?;

    let data = rows
        .into_iter()
        .map(Employee::try_from)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "No fields provided", body = ErrorBody),
        (status = 404, description = "Employee not found", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateEmployee>,
) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;
    let employee_id = path.into_inner();
    let current = fetch_employee(&pool, employee_id).await?;
    let payload = payload.into_inner();

    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(e) => e.into(),
    };
    check_department(&pool, payload.department_id, &mut errors).await?;
    if let Some(manager_id) = payload.manager_id.filter(|m| current.manager_id != Some(*m)) {
        if let Some(message) = manager_assignment_error(&pool, employee_id, manager_id).await? {
            errors.add("manager_id", message);
        }
    }
    if payload.role.is_some_and(|r| r != current.role) && current.user_id == auth.user_id {
        errors.add("role", "You cannot change your own role.");
    }
    errors.into_result()?;

    let update = build_update_sql("employees", payload.into_changes(), "id", employee_id)?;
    execute_update(pool.get_ref(), update).await.map_err(employee_conflict)?;

    info!(employee_id, "Employee updated");
    Ok(HttpResponse::Ok().json(fetch_employee(&pool, employee_id).await?))
}

/// Delete Employee together with the linked account
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = MessageBody),
        (status = 400, description = "Cannot delete own account", body = ErrorBody),
        (status = 404, description = "Employee not found", body = ErrorBody)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;
    let employee_id = path.into_inner();
    let employee = fetch_employee(&pool, employee_id).await?;

    if employee.user_id == auth.user_id {
        return Err(AppError::BadRequest("You cannot delete your own account".into()));
    }

    let identity = sqlx::query_as::<_, (String, String)>("SELECT username, email FROM users WHERE id = ?")
        .bind(employee.user_id)
        .fetch_optional(pool.get_ref())
        .await?;

    let mut tx = pool.begin().await?;
    // reports lose their manager rather than blocking the delete
    sqlx::query("UPDATE employees SET manager_id = NULL WHERE manager_id = ?")
        .bind(employee_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(employee.user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if let Some((username, email)) = identity {
        release_identity(IdentityKind::Username, &username).await;
        release_identity(IdentityKind::Email, &email).await;
    }

    info!(employee_id, user_id = employee.user_id, "Employee and account deleted");
    Ok(HttpResponse::Ok().json(MessageBody::new("Successfully deleted")))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = ErrorBody)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(auth: AuthUser, pool: web::Data<MySqlPool>, path: web::Path<u64>) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;
    Ok(HttpResponse::Ok().json(fetch_employee(&pool, path.into_inner()).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_maps_only_present_fields() {
        let update = UpdateEmployee {
            position: Some("Lead".into()),
            salary: Some(1200.5),
            role: Some(Role::Manager),
            ..Default::default()
        };
        assert_eq!(
            update.into_changes(),
            vec![
                ("position", SqlValue::Text(Some("Lead".into()))),
                ("salary", SqlValue::Float(Some(1200.5))),
                ("role", SqlValue::Text(Some("manager".into()))),
            ]
        );
    }

    #[test]
    fn empty_update_has_no_changes() {
        assert!(UpdateEmployee::default().into_changes().is_empty());
    }

    #[test]
    fn negative_salary_fails_validation() {
        let update = UpdateEmployee {
            salary: Some(-1.0),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }
}
