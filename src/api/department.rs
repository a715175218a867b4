use crate::{
    api::require_admin,
    auth::{auth::AuthUser, handlers::is_duplicate_key},
    error::{AppError, AppResult, ErrorBody},
    model::department::Department,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateDepartment {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    #[schema(example = "Human Resources")]
    pub name: String,
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/departments",
    responses(
        (status = 200, description = "All departments by name", body = [Department]),
        (status = 403, description = "Admin only", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn list_departments(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;

    let departments =
        sqlx::query_as::<_, Department>("SELECT id, name, description, created_at FROM departments ORDER BY name")
            .fetch_all(pool.get_ref())
            .await?;
    Ok(HttpResponse::Ok().json(departments))
}

#[utoipa::path(
    post,
    path = "/api/departments",
    request_body = CreateDepartment,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 409, description = "Name already used", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDepartment>,
) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;
    payload.validate()?;

    let name = payload.name.trim();
    let result = sqlx::query("INSERT INTO departments (name, description, created_at) VALUES (?, ?, UTC_TIMESTAMP())")
        .bind(name)
        .bind(&payload.description)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::Conflict(format!("Department '{name}' already exists"))
            } else {
                e.into()
            }
        })?;

    let department = sqlx::query_as::<_, Department>("SELECT id, name, description, created_at FROM departments WHERE id = ?")
        .bind(result.last_insert_id())
        .fetch_one(pool.get_ref())
        .await?;

    info!(department_id = department.id, name = %department.name, "Department created");
    Ok(HttpResponse::Created().json(department))
}
