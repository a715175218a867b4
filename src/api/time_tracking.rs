use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult, ErrorBody},
    model::time_entry::TimeEntry,
};
use actix_web::{HttpResponse, web};
use sqlx::MySqlPool;
use tracing::info;

const ENTRY_COLUMNS: &str = "id, user_id, clock_in, clock_out";

async fn open_entry<'e, E>(executor: E, user_id: u64) -> AppResult<Option<TimeEntry>>
where
    E: sqlx::Executor<'e, Database = sqlx::MySql>,
{
    Ok(sqlx::query_as::<_, TimeEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE user_id = ? AND clock_out IS NULL ORDER BY clock_in DESC LIMIT 1"
    ))
    .bind(user_id)
    .fetch_optional(executor)
    .await?)
}

async fn fetch_entry(pool: &MySqlPool, id: u64) -> AppResult<TimeEntry> {
    Ok(
        sqlx::query_as::<_, TimeEntry>(&format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE id = ?"))
            .bind(id)
            .fetch_one(pool)
            .await?,
    )
}

#[utoipa::path(
    post,
    path = "/api/time/clock-in",
    responses(
        (status = 201, description = "Clocked in", body = TimeEntry),
        (status = 409, description = "An entry is already open", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Time Tracking"
)]
pub async fn clock_in(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT id FROM users WHERE id = ? FOR UPDATE")
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;
    if open_entry(&mut *tx, auth.user_id).await?.is_some() {
        tx.rollback().await?;
        return Err(AppError::Conflict("You are already clocked in".into()));
    }

    let result = sqlx::query("INSERT INTO time_entries (user_id, clock_in) VALUES (?, UTC_TIMESTAMP())")
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(user_id = auth.user_id, "Clocked in");
    Ok(HttpResponse::Created().json(fetch_entry(&pool, result.last_insert_id()).await?))
}

#[utoipa::path(
    post,
    path = "/api/time/clock-out",
    responses(
        (status = 200, description = "Clocked out", body = TimeEntry),
        (status = 409, description = "No open entry", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Time Tracking"
)]
pub async fn clock_out(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let entry = open_entry(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| AppError::Conflict("You are not clocked in".into()))?;

    let result = sqlx::query("UPDATE time_entries SET clock_out = UTC_TIMESTAMP() WHERE id = ? AND clock_out IS NULL")
        .bind(entry.id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("You are not clocked in".into()));
    }

    let entry = fetch_entry(&pool, entry.id).await?;
    info!(user_id = auth.user_id, minutes = ?entry.worked_minutes(), "Clocked out");
    Ok(HttpResponse::Ok().json(entry))
}

#[utoipa::path(
    get,
    path = "/api/time",
    responses((status = 200, description = "Last 50 own entries, newest first", body = [TimeEntry])),
    security(("bearer_auth" = [])),
    tag = "Time Tracking"
)]
pub async fn my_entries(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let entries = sqlx::query_as::<_, TimeEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE user_id = ? ORDER BY clock_in DESC LIMIT 50"
    ))
    .bind(auth.user_id)
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(entries))
}
