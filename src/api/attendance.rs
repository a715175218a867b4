use crate::{
    api::require_reviewer,
    auth::auth::AuthUser,
    error::{AppResult, ErrorBody},
    model::attendance::{ATTENDANCE_COLUMNS, Attendance, AttendanceRow, AttendanceStatus},
    workflow::member::subordinate_user_ids,
};
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MarkAttendance {
    #[serde(default)]
    pub status: AttendanceStatus,
    #[validate(length(max = 255, message = "Note must be at most 255 characters"))]
    pub note: Option<String>,
}

fn into_records(rows: Vec<AttendanceRow>) -> AppResult<Vec<Attendance>> {
    rows.into_iter().map(Attendance::try_from).collect()
}

/// Records today's status, replacing an earlier mark of the same day
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = MarkAttendance,
    responses(
        (status = 200, description = "Today's record", body = Attendance),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn mark_today(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<MarkAttendance>,
) -> AppResult<HttpResponse> {
    payload.validate()?;
    let today = Utc::now().date_naive();

    sqlx::query(
        r#"
        INSERT INTO attendances (user_id, date, status, note, updated_at)
        VALUES (?, ?, ?, ?, UTC_TIMESTAMP())
        ON DUPLICATE KEY UPDATE status = VALUES(status), note = VALUES(note), updated_at = VALUES(updated_at)
        "#,
    )
    .bind(auth.user_id)
    .bind(today)
    .bind(payload.status.as_ref())
    .bind(&payload.note)
    .execute(pool.get_ref())
    .await?;

    let row = sqlx::query_as::<_, AttendanceRow>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE user_id = ? AND date = ?"
    ))
    .bind(auth.user_id)
    .bind(today)
    .fetch_one(pool.get_ref())
    .await?;

    info!(user_id = auth.user_id, status = %payload.status, "Attendance marked");
    Ok(HttpResponse::Ok().json(Attendance::try_from(row)?))
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    responses((status = 200, description = "Last 30 own records, newest first", body = [Attendance])),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_attendance(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE user_id = ? ORDER BY date DESC LIMIT 30"
    ))
    .bind(auth.user_id)
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(into_records(rows)?))
}

/// Admins get the latest 200 records, managers their reports' records.
#[utoipa::path(
    get,
    path = "/api/attendance/team",
    responses(
        (status = 200, description = "Team records, newest first", body = [Attendance]),
        (status = 403, description = "Managers and admins only", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn team_attendance(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let actor = require_reviewer(&pool, &auth).await?;

    if actor.is_admin() {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances ORDER BY date DESC, id DESC LIMIT 200"
        ))
        .fetch_all(pool.get_ref())
        .await?;
        return Ok(HttpResponse::Ok().json(into_records(rows)?));
    }

    let user_ids = match actor.employee_id {
        Some(employee_id) => subordinate_user_ids(&pool, employee_id).await?,
        None => Vec::new(),
    };
    if user_ids.is_empty() {
        return Ok(HttpResponse::Ok().json(Vec::<Attendance>::new()));
    }

    let placeholders = vec!["?"; user_ids.len()].join(", ");
    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE user_id IN ({placeholders}) ORDER BY date DESC, id DESC"
    );
    let mut query = sqlx::query_as::<_, AttendanceRow>(&sql);
    for id in user_ids {
        query = query.bind(id);
    }
    Ok(HttpResponse::Ok().json(into_records(query.fetch_all(pool.get_ref()).await?)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_defaults_to_present() {
        let mark: MarkAttendance = serde_json::from_str("{}").unwrap();
        assert_eq!(mark.status, AttendanceStatus::Present);
        assert!(mark.validate().is_ok());
    }

    #[test]
    fn long_notes_are_rejected() {
        let mark = MarkAttendance {
            status: AttendanceStatus::Late,
            note: Some("x".repeat(256)),
        };
        assert!(mark.validate().is_err());
    }
}
