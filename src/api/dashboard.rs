use crate::{
    api::{require_admin, require_reviewer},
    auth::auth::AuthUser,
    error::{AppResult, ErrorBody},
    model::{
        employee::{EMPLOYEE_COLUMNS, Employee, EmployeeRow},
        task::{TASK_COLUMNS, Task, TaskRow},
    },
};
use actix_web::{HttpResponse, web};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct AdminDashboard {
    pub total_employees: i64,
    pub total_users: i64,
    pub total_departments: i64,
    pub total_teams: i64,
    pub recent_employees: Vec<Employee>,
}

#[derive(Serialize, ToSchema)]
pub struct ManagerDashboard {
    pub team_members: Vec<Employee>,
    pub recent_tasks: Vec<Task>,
}

async fn count(pool: &MySqlPool, table: &'static str) -> AppResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    Ok(sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool).await?)
}

fn into_employees(rows: Vec<EmployeeRow>) -> AppResult<Vec<Employee>> {
    rows.into_iter().map(Employee::try_from).collect()
}

#[utoipa::path(
    get,
    path = "/api/dashboard/admin",
    responses(
        (status = 200, description = "Organization totals and newest employees", body = AdminDashboard),
        (status = 403, description = "Admin only", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn admin_dashboard(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;

    let recent = sqlx::query_as::<_, EmployeeRow>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees ORDER BY id DESC LIMIT 5"
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(AdminDashboard {
        total_employees: count(&pool, "employees").await?,
        total_users: count(&pool, "users").await?,
        total_departments: count(&pool, "departments").await?,
        total_teams: count(&pool, "teams").await?,
        recent_employees: into_employees(recent)?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/manager",
    responses(
        (status = 200, description = "Direct reports and their latest tasks", body = ManagerDashboard),
        (status = 403, description = "Managers and admins only", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn manager_dashboard(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let actor = require_reviewer(&pool, &auth).await?;
    let Some(employee_id) = actor.employee_id else {
        return Ok(HttpResponse::Ok().json(ManagerDashboard {
            team_members: Vec::new(),
            recent_tasks: Vec::new(),
        }));
    };

    let members = sqlx::query_as::<_, EmployeeRow>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE manager_id = ? ORDER BY last_name, first_name"
    ))
    .bind(employee_id)
    .fetch_all(pool.get_ref())
    .await?;

    let tasks = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks \
         WHERE assigned_to_id IN (SELECT user_id FROM employees WHERE manager_id = ?) \
         ORDER BY created_at DESC, id DESC LIMIT 5"
    ))
    .bind(employee_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(ManagerDashboard {
        team_members: into_employees(members)?,
        recent_tasks: tasks.into_iter().map(Task::try_from).collect::<AppResult<Vec<_>>>()?,
    }))
}
