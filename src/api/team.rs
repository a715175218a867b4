use crate::{
    api::require_admin,
    auth::{auth::AuthUser, handlers::is_duplicate_key},
    error::{AppError, AppResult, ErrorBody, FieldErrors, MessageBody},
    model::team::{Team, TeamMember},
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

const TEAM_COLUMNS: &str = "id, name, description, department_id, lead_id, created_at";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTeam {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    #[schema(example = "Platform")]
    pub name: String,
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
    pub department_id: Option<u64>,
    /// Employee id of the lead
    pub lead_id: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMember {
    #[schema(example = 7)]
    pub user_id: u64,
}

async fn fetch_team(pool: &MySqlPool, id: u64) -> AppResult<Team> {
    sqlx::query_as::<_, Team>(&format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Team not found".into()))
}

async fn exists(pool: &MySqlPool, table: &'static str, id: u64) -> AppResult<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?)");
    Ok(sqlx::query_scalar::<_, bool>(&sql).bind(id).fetch_one(pool).await?)
}

#[utoipa::path(
    get,
    path = "/api/teams",
    responses(
        (status = 200, description = "All teams by name", body = [Team]),
        (status = 403, description = "Admin only", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn list_teams(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;

    let teams = sqlx::query_as::<_, Team>(&format!("SELECT {TEAM_COLUMNS} FROM teams ORDER BY name"))
        .fetch_all(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(teams))
}

#[utoipa::path(
    post,
    path = "/api/teams",
    request_body = CreateTeam,
    responses(
        (status = 201, description = "Team created", body = Team),
        (status = 409, description = "Name already used", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn create_team(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTeam>,
) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;

    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(e) => e.into(),
    };
    if let Some(id) = payload.department_id {
        if !exists(&pool, "departments", id).await? {
            errors.add("department_id", "Department not found");
        }
    }
    if let Some(id) = payload.lead_id {
        if !exists(&pool, "employees", id).await? {
            errors.add("lead_id", "Employee not found");
        }
    }
    errors.into_result()?;

    let result = sqlx::query(
        "INSERT INTO teams (name, description, department_id, lead_id, created_at) VALUES (?, ?, ?, ?, UTC_TIMESTAMP())",
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.department_id)
    .bind(payload.lead_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_duplicate_key(&e) {
            AppError::Conflict("Team name already exists".into())
        } else {
            e.into()
        }
    })?;

    let team = fetch_team(&pool, result.last_insert_id()).await?;
    info!(team_id = team.id, "Team created");
    Ok(HttpResponse::Created().json(team))
}

#[utoipa::path(
    get,
    path = "/api/teams/{team_id}/members",
    params(("team_id" = u64, Path, description = "Team ID")),
    responses(
        (status = 200, description = "Team members", body = [TeamMember]),
        (status = 404, description = "Team not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn list_members(_auth: AuthUser, pool: web::Data<MySqlPool>, path: web::Path<u64>) -> AppResult<HttpResponse> {
    let team = fetch_team(&pool, path.into_inner()).await?;

    let members = sqlx::query_as::<_, TeamMember>(
        r#"
        SELECT u.id AS user_id, u.username, e.first_name, e.last_name
        FROM team_members tm
        JOIN users u ON u.id = tm.user_id
        LEFT JOIN employees e ON e.user_id = u.id
        WHERE tm.team_id = ?
        ORDER BY u.username
        "#,
    )
    .bind(team.id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(members))
}

#[utoipa::path(
    post,
    path = "/api/teams/{team_id}/members",
    params(("team_id" = u64, Path, description = "Team ID")),
    request_body = AddMember,
    responses(
        (status = 201, description = "Member added", body = MessageBody),
        (status = 404, description = "Team or user not found", body = ErrorBody),
        (status = 409, description = "Already a member", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn add_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AddMember>,
) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;
    let team = fetch_team(&pool, path.into_inner()).await?;
    if !exists(&pool, "users", payload.user_id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    sqlx::query("INSERT INTO team_members (team_id, user_id) VALUES (?, ?)")
        .bind(team.id)
        .bind(payload.user_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::Conflict("User is already a member of this team".into())
            } else {
                e.into()
            }
        })?;

    info!(team_id = team.id, user_id = payload.user_id, "Team member added");
    Ok(HttpResponse::Created().json(MessageBody::new("Member added")))
}

#[utoipa::path(
    delete,
    path = "/api/teams/{team_id}/members/{user_id}",
    params(
        ("team_id" = u64, Path, description = "Team ID"),
        ("user_id" = u64, Path, description = "Member user ID")
    ),
    responses(
        (status = 200, description = "Member removed", body = MessageBody),
        (status = 404, description = "Not a member", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn remove_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;
    let (team_id, user_id) = path.into_inner();

    let result = sqlx::query("DELETE FROM team_members WHERE team_id = ? AND user_id = ?")
        .bind(team_id)
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User is not a member of this team".into()));
    }
    Ok(HttpResponse::Ok().json(MessageBody::new("Member removed")))
}
