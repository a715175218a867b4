use crate::{
    api::require_reviewer,
    auth::auth::AuthUser,
    error::{AppError, AppResult, ErrorBody, FieldErrors},
    model::task::{TASK_COLUMNS, Task, TaskPriority, TaskRow, TaskStatus},
    workflow::member::load_actor,
};
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTask {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    /// User id of the assignee
    pub assigned_to_id: u64,
    #[schema(example = "2026-02-01", value_type = Option<String>)]
    pub due_date: Option<NaiveDate>,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTaskStatus {
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

fn into_tasks(rows: Vec<TaskRow>) -> AppResult<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

async fn fetch_task(pool: &MySqlPool, id: u64) -> AppResult<Task> {
    let row = sqlx::query_as::<_, TaskRow>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;
    Task::try_from(row)
}

/// Tasks assigned to the caller, earliest due date first, undated last.
#[utoipa::path(
    get,
    path = "/api/tasks",
    params(TaskFilter),
    responses((status = 200, description = "Own tasks", body = [Task])),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn my_tasks(auth: AuthUser, pool: web::Data<MySqlPool>, filter: web::Query<TaskFilter>) -> AppResult<HttpResponse> {
    let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE assigned_to_id = ?");
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY due_date IS NULL, due_date ASC, id DESC");

    let mut query = sqlx::query_as::<_, TaskRow>(&sql).bind(auth.user_id);
    if let Some(status) = &filter.status {
        query = query.bind(status.as_ref());
    }
    Ok(HttpResponse::Ok().json(into_tasks(query.fetch_all(pool.get_ref()).await?)?))
}

#[utoipa::path(
    get,
    path = "/api/tasks/created",
    responses(
        (status = 200, description = "Tasks created by the caller", body = [Task]),
        (status = 403, description = "Managers and admins only", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn created_tasks(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let actor = require_reviewer(&pool, &auth).await?;

    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE created_by_id = ? ORDER BY created_at DESC, id DESC"
    ))
    .bind(actor.user_id)
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(into_tasks(rows)?))
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTask,
    responses(
        (status = 201, description = "Task created as pending", body = Task),
        (status = 403, description = "Managers and admins only", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn create_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTask>,
) -> AppResult<HttpResponse> {
    let actor = require_reviewer(&pool, &auth).await?;

    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(e) => e.into(),
    };
    let assignee_active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = ?")
        .bind(payload.assigned_to_id)
        .fetch_optional(pool.get_ref())
        .await?;
    if assignee_active != Some(true) {
        errors.add("assigned_to_id", "Assignee not found");
    }
    errors.into_result()?;

    let result = sqlx::query(
        r#"
        INSERT INTO tasks (title, description, status, priority, assigned_to_id, created_by_id, due_date, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, UTC_TIMESTAMP())
        "#,
    )
    .bind(payload.title.trim())
    .bind(&payload.description)
    .bind(TaskStatus::Pending.as_ref())
    .bind(payload.priority.as_ref())
    .bind(payload.assigned_to_id)
    .bind(actor.user_id)
    .bind(payload.due_date)
    .execute(pool.get_ref())
    .await?;

    let task = fetch_task(&pool, result.last_insert_id()).await?;
    info!(task_id = task.id, assigned_to = task.assigned_to_id, "Task created");
    Ok(HttpResponse::Created().json(task))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task", body = Task),
        (status = 403, description = "Not assignee, creator or admin", body = ErrorBody),
        (status = 404, description = "Task not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn get_task(auth: AuthUser, pool: web::Data<MySqlPool>, path: web::Path<u64>) -> AppResult<HttpResponse> {
    let task = fetch_task(&pool, path.into_inner()).await?;
    let actor = load_actor(&pool, auth.user_id).await?;
    if !task.can_view(actor.user_id, actor.is_admin()) {
        return Err(AppError::Forbidden("You cannot view this task".into()));
    }
    Ok(HttpResponse::Ok().json(task))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}/status",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = UpdateTaskStatus,
    responses(
        (status = 200, description = "Status updated", body = Task),
        (status = 403, description = "Not assignee or admin", body = ErrorBody),
        (status = 404, description = "Task not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn update_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateTaskStatus>,
) -> AppResult<HttpResponse> {
    let task = fetch_task(&pool, path.into_inner()).await?;
    let actor = load_actor(&pool, auth.user_id).await?;
    if !task.can_update_status(actor.user_id, actor.is_admin()) {
        return Err(AppError::Forbidden("Only the assignee can update this task".into()));
    }

    let completed_at = completion_stamp(task.status, payload.status, task.completed_at);

    sqlx::query("UPDATE tasks SET status = ?, completed_at = ? WHERE id = ?")
        .bind(payload.status.as_ref())
        .bind(completed_at)
        .bind(task.id)
        .execute(pool.get_ref())
        .await?;

    info!(task_id = task.id, from = %task.status, to = %payload.status, "Task status updated");
    Ok(HttpResponse::Ok().json(fetch_task(&pool, task.id).await?))
}

/// Completing stamps the time once, leaving completion clears it.
fn completion_stamp(
    from: TaskStatus,
    to: TaskStatus,
    previous: Option<chrono::DateTime<Utc>>,
) -> Option<chrono::DateTime<Utc>> {
    match (from, to) {
        (TaskStatus::Completed, TaskStatus::Completed) => previous,
        (_, TaskStatus::Completed) => Some(Utc::now()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_stamped_once() {
        assert!(completion_stamp(TaskStatus::InProgress, TaskStatus::Completed, None).is_some());
        let earlier = Utc::now() - chrono::Duration::days(1);
        assert_eq!(
            completion_stamp(TaskStatus::Completed, TaskStatus::Completed, Some(earlier)),
            Some(earlier)
        );
        assert_eq!(completion_stamp(TaskStatus::Completed, TaskStatus::Pending, Some(earlier)), None);
    }

    #[test]
    fn priority_defaults_to_medium() {
        let task: CreateTask = serde_json::from_value(serde_json::json!({
            "title": "Write report",
            "assigned_to_id": 3
        }))
        .unwrap();
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(task.validate().is_ok());
    }
}
