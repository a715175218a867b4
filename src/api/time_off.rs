use crate::{
    api::message::insert_message,
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult, ErrorBody, FieldErrors},
    model::time_off::{
        TIME_OFF_COLUMNS, TimeOffRequest, TimeOffRow, TimeOffStatus, TimeOffType, validate_date_range,
    },
    workflow::{
        Decision, Member, Stage, Transition, cancel, decide,
        member::{find_member, load_actor, subordinate_user_ids},
    },
};
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, MySql, MySqlPool};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTimeOff {
    #[serde(rename = "type")]
    #[schema(example = "vacation")]
    pub kind: TimeOffType,
    #[schema(example = "2026-01-05", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-09", value_type = String)]
    pub end_date: NaiveDate,
    #[validate(length(max = 2000, message = "Reason must be at most 2000 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct TimeOffFilter {
    /// Filter by workflow status
    pub status: Option<TimeOffStatus>,
}

#[derive(Serialize, ToSchema)]
pub struct TimeOffActionResponse {
    #[schema(example = "Request sent to HR for approval")]
    pub message: String,
    pub request: TimeOffRequest,
}

const OPEN_STATUSES: &str = "'pending', 'manager_approved', 'approved'";

async fn fetch_request<'e, E>(executor: E, id: u64) -> AppResult<Option<TimeOffRequest>>
where
    E: Executor<'e, Database = MySql>,
{
    let row = sqlx::query_as::<_, TimeOffRow>(&format!(
        "SELECT {TIME_OFF_COLUMNS} FROM time_off_requests WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;
    row.map(TimeOffRequest::try_from).transpose()
}

fn into_requests(rows: Vec<TimeOffRow>) -> AppResult<Vec<TimeOffRequest>> {
    rows.into_iter().map(TimeOffRequest::try_from).collect()
}

/// Rejects ranges that collide with the requester's own live requests.
fn check_overlap(existing: &[TimeOffRequest], start: NaiveDate, end: NaiveDate) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if let Some(clash) = existing
        .iter()
        .find(|r| r.status.blocks_calendar() && r.overlaps(start, end))
    {
        errors.add(
            "start_date",
            format!(
                "Overlaps your {} request from {} to {}",
                clash.status, clash.start_date, clash.end_date
            ),
        );
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Who besides the requester may read a request.
fn can_view(request: &TimeOffRequest, requester: &Member, actor: &Member, hr_department: &str) -> bool {
    request.user_id == actor.user_id
        || request.manager_id == Some(actor.user_id)
        || actor.manages(requester)
        || actor.is_hr_or_admin(hr_department)
}

#[utoipa::path(
    post,
    path = "/api/time-off",
    request_body = CreateTimeOff,
    responses(
        (status = 201, description = "Request submitted as pending", body = TimeOffRequest),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 403, description = "Account disabled", body = ErrorBody),
        (status = 422, description = "Invalid dates or overlapping request", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Time Off"
)]
#[instrument(name = "time_off_create", skip(pool, payload), fields(user_id = auth.user_id))]
pub async fn create_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTimeOff>,
) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();

    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(e) => e.into(),
    };
    if let Err(e) = validate_date_range(payload.start_date, payload.end_date) {
        errors.merge(e);
    }
    errors.into_result()?;

    let requester = load_actor(&pool, auth.user_id).await?;

    // snapshot the current manager's user id
    let manager_user_id = match requester.manager_id {
        Some(manager_employee_id) => {
            sqlx::query_scalar::<_, u64>("SELECT user_id FROM employees WHERE id = ?")
                .bind(manager_employee_id)
                .fetch_optional(pool.get_ref())
                .await?
        }
        None => None,
    };

    let mut tx = pool.begin().await?;

    // serialize concurrent submissions of the same requester
    sqlx::query("SELECT id FROM users WHERE id = ? FOR UPDATE")
        .bind(requester.user_id)
        .execute(&mut *tx)
        .await?;

    let existing = sqlx::query_as::<_, TimeOffRow>(&format!(
        "SELECT {TIME_OFF_COLUMNS} FROM time_off_requests \
         WHERE user_id = ? AND status IN ({OPEN_STATUSES}) AND start_date <= ? AND end_date >= ?"
    ))
    .bind(requester.user_id)
    .bind(payload.end_date)
    .bind(payload.start_date)
    .fetch_all(&mut *tx)
    .await?;
    check_overlap(&into_requests(existing)?, payload.start_date, payload.end_date).map_err(AppError::Validation)?;

    let reason = payload.reason.filter(|r| !r.trim().is_empty());
    let result = sqlx::query(
        r#"
        INSERT INTO time_off_requests
            (user_id, manager_id, kind, status, start_date, end_date, reason, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, UTC_TIMESTAMP(), UTC_TIMESTAMP())
        "#,
    )
    .bind(requester.user_id)
    .bind(manager_user_id)
    .bind(payload.kind.as_ref())
    .bind(TimeOffStatus::Pending.as_ref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(reason)
    .execute(&mut *tx)
    .await?;

    let request = fetch_request(&mut *tx, result.last_insert_id())
        .await?
        .ok_or_else(|| AppError::Internal("inserted time-off request vanished".into()))?;
    tx.commit().await?;

    if manager_user_id.is_none() {
        warn!(request_id = request.id, "Requester has no manager, request cannot be reviewed yet");
    }
    info!(request_id = request.id, days = request.duration_days, "Time-off request submitted");
    Ok(HttpResponse::Created().json(request))
}

#[utoipa::path(
    get,
    path = "/api/time-off",
    params(TimeOffFilter),
    responses((status = 200, description = "Own requests, newest first", body = [TimeOffRequest])),
    security(("bearer_auth" = [])),
    tag = "Time Off"
)]
pub async fn my_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    filter: web::Query<TimeOffFilter>,
) -> AppResult<HttpResponse> {
    let mut sql = format!("SELECT {TIME_OFF_COLUMNS} FROM time_off_requests WHERE user_id = ?");
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC");

    let mut query = sqlx::query_as::<_, TimeOffRow>(&sql).bind(auth.user_id);
    if let Some(status) = &filter.status {
        query = query.bind(status.as_ref());
    }
    let rows = query.fetch_all(pool.get_ref()).await?;

    Ok(HttpResponse::Ok().json(into_requests(rows)?))
}

/// HR and admins see every request, managers their direct reports'.
#[utoipa::path(
    get,
    path = "/api/time-off/team",
    params(TimeOffFilter),
    responses(
        (status = 200, description = "Team requests, newest first", body = [TimeOffRequest]),
        (status = 403, description = "Managers, HR and admins only", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Time Off"
)]
pub async fn team_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    filter: web::Query<TimeOffFilter>,
) -> AppResult<HttpResponse> {
    let actor = load_actor(&pool, auth.user_id).await?;
    if !actor.is_reviewer() {
        return Err(AppError::Forbidden("Managers, HR and admins only".into()));
    }

    let mut conditions: Vec<String> = Vec::new();
    let mut user_ids: Vec<u64> = Vec::new();

    if !actor.is_hr_or_admin(&config.hr_department) {
        user_ids = match actor.employee_id {
            Some(employee_id) => subordinate_user_ids(&pool, employee_id).await?,
            None => Vec::new(),
        };
        if user_ids.is_empty() {
            return Ok(HttpResponse::Ok().json(Vec::<TimeOffRequest>::new()));
        }
        let placeholders = vec!["?"; user_ids.len()].join(", ");
        conditions.push(format!("user_id IN ({placeholders})"));
    }
    if filter.status.is_some() {
        conditions.push("status = ?".to_string());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT {TIME_OFF_COLUMNS} FROM time_off_requests {where_clause} ORDER BY created_at DESC, id DESC"
    );

    let mut query = sqlx::query_as::<_, TimeOffRow>(&sql);
    for id in &user_ids {
        query = query.bind(*id);
    }
    if let Some(status) = &filter.status {
        query = query.bind(status.as_ref());
    }
    let rows = query.fetch_all(pool.get_ref()).await?;

    Ok(HttpResponse::Ok().json(into_requests(rows)?))
}

#[utoipa::path(
    get,
    path = "/api/time-off/hr-queue",
    responses(
        (status = 200, description = "Requests awaiting the HR decision, oldest first", body = [TimeOffRequest]),
        (status = 403, description = "Access denied. HR only", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Time Off"
)]
pub async fn hr_queue(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let actor = load_actor(&pool, auth.user_id).await?;
    if !actor.is_hr_or_admin(&config.hr_department) {
        return Err(AppError::Forbidden("Access denied. HR only".into()));
    }

    let rows = sqlx::query_as::<_, TimeOffRow>(&format!(
        "SELECT {TIME_OFF_COLUMNS} FROM time_off_requests WHERE status = ? ORDER BY manager_decision_at ASC, id ASC"
    ))
    .bind(TimeOffStatus::ManagerApproved.as_ref())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(into_requests(rows)?))
}

#[utoipa::path(
    get,
    path = "/api/time-off/{request_id}",
    params(("request_id" = u64, Path, description = "Time-off request ID")),
    responses(
        (status = 200, description = "Request", body = TimeOffRequest),
        (status = 403, description = "Not visible to the caller", body = ErrorBody),
        (status = 404, description = "Request not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Time Off"
)]
pub async fn get_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let request = fetch_request(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Time-off request not found".into()))?;

    if request.user_id != auth.user_id {
        let actor = load_actor(&pool, auth.user_id).await?;
        let requester = find_member(&pool, request.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Requester not found".into()))?;
        if !can_view(&request, &requester, &actor, &config.hr_department) {
            return Err(AppError::Forbidden("You cannot view this request".into()));
        }
    }

    Ok(HttpResponse::Ok().json(request))
}

/// Stage-specific UPDATE, guarded by the status the decision was computed from.
fn transition_sql(stage: Stage) -> &'static str {
    match stage {
        Stage::Manager => {
            "UPDATE time_off_requests SET status = ?, updated_at = ?, manager_id = ?, manager_decision_at = ? \
             WHERE id = ? AND status = ?"
        }
        Stage::Hr => {
            "UPDATE time_off_requests SET status = ?, updated_at = ?, hr_id = ?, hr_decision_at = ? \
             WHERE id = ? AND status = ?"
        }
        Stage::Requester => {
            "UPDATE time_off_requests SET status = ?, updated_at = ? WHERE id = ? AND status = ?"
        }
    }
}

/// Persists the new state and its notifications as one unit of work.
async fn persist_transition(pool: &MySqlPool, request_id: u64, transition: &Transition) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let mut query = sqlx::query(transition_sql(transition.stage))
        .bind(transition.to.as_ref())
        .bind(transition.decided_at);
    if transition.stage != Stage::Requester {
        query = query.bind(transition.actor_user_id).bind(transition.decided_at);
    }
    let updated = query
        .bind(request_id)
        .bind(transition.from.as_ref())
        .execute(&mut *tx)
        .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        warn!(request_id, from = %transition.from, "Concurrent decision detected, rolled back");
        return Err(AppError::Conflict("Request was changed by someone else, reload and retry".into()));
    }

    for notification in &transition.notifications {
        insert_message(&mut *tx, notification).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn respond(
    mut request: TimeOffRequest,
    transition: Transition,
    pool: &MySqlPool,
) -> AppResult<HttpResponse> {
    persist_transition(pool, request.id, &transition).await?;
    transition.apply(&mut request);

    info!(
        request_id = request.id,
        actor_user_id = transition.actor_user_id,
        from = %transition.from,
        to = %transition.to,
        notifications = transition.notifications.len(),
        "Time-off request transitioned"
    );

    Ok(HttpResponse::Ok().json(TimeOffActionResponse {
        message: transition.summary().to_string(),
        request,
    }))
}

/// Manager or HR decision. `action` is `approve` or `deny`.
#[utoipa::path(
    post,
    path = "/api/time-off/{request_id}/{action}",
    params(
        ("request_id" = u64, Path, description = "Time-off request ID"),
        ("action" = Decision, Path, description = "approve or deny")
    ),
    responses(
        (status = 200, description = "Decision recorded", body = TimeOffActionResponse),
        (status = 400, description = "Unknown action", body = ErrorBody),
        (status = 403, description = "Actor may not decide at this stage", body = ErrorBody),
        (status = 404, description = "Request not found", body = ErrorBody),
        (status = 409, description = "Request is not in a decidable state", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Time Off"
)]
#[instrument(name = "time_off_decide", skip(pool, config, path), fields(user_id = auth.user_id))]
pub async fn decide_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<(u64, String)>,
) -> AppResult<HttpResponse> {
    let (request_id, action) = path.into_inner();
    let decision: Decision = action
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid action '{action}', expected approve or deny")))?;

    let actor = load_actor(&pool, auth.user_id).await?;
    let request = fetch_request(pool.get_ref(), request_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Time-off request not found".into()))?;
    let requester = find_member(&pool, request.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Requester not found".into()))?;

    let transition = decide(&request, &requester, &actor, decision, &config.hr_department, Utc::now())?;
    respond(request, transition, &pool).await
}

#[utoipa::path(
    post,
    path = "/api/time-off/{request_id}/cancel",
    params(("request_id" = u64, Path, description = "Time-off request ID")),
    responses(
        (status = 200, description = "Request cancelled", body = TimeOffActionResponse),
        (status = 403, description = "Only the requester can cancel", body = ErrorBody),
        (status = 404, description = "Request not found", body = ErrorBody),
        (status = 409, description = "Request already decided", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Time Off"
)]
pub async fn cancel_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let actor = load_actor(&pool, auth.user_id).await?;
    let request = fetch_request(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Time-off request not found".into()))?;

    let transition = cancel(&request, actor.user_id, Utc::now())?;
    respond(request, transition, &pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::role::Role, workflow::member::fixtures::member};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn existing(status: TimeOffStatus, start: NaiveDate, end: NaiveDate) -> TimeOffRequest {
        let now = Utc::now();
        TimeOffRequest {
            id: 1,
            user_id: 2,
            manager_id: Some(1),
            hr_id: None,
            kind: TimeOffType::Vacation,
            status,
            start_date: start,
            end_date: end,
            reason: None,
            duration_days: 0,
            manager_decision_at: None,
            hr_decision_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn inverted_range_is_rejected_on_end_date() {
        let payload: CreateTimeOff = serde_json::from_value(serde_json::json!({
            "type": "vacation",
            "start_date": "2025-01-10",
            "end_date": "2025-01-05"
        }))
        .unwrap();
        let errors = validate_date_range(payload.start_date, payload.end_date).unwrap_err();
        assert!(errors.contains("end_date"));
    }

    #[test]
    fn overlapping_live_request_is_rejected() {
        let live = [existing(TimeOffStatus::ManagerApproved, date(2025, 3, 1), date(2025, 3, 5))];
        let errors = check_overlap(&live, date(2025, 3, 5), date(2025, 3, 8)).unwrap_err();
        assert!(errors.contains("start_date"));
        assert!(check_overlap(&live, date(2025, 3, 6), date(2025, 3, 8)).is_ok());
    }

    #[test]
    fn finished_requests_do_not_block() {
        let done = [
            existing(TimeOffStatus::Denied, date(2025, 3, 1), date(2025, 3, 5)),
            existing(TimeOffStatus::Cancelled, date(2025, 3, 1), date(2025, 3, 5)),
        ];
        assert!(check_overlap(&done, date(2025, 3, 2), date(2025, 3, 3)).is_ok());
    }

    #[test]
    fn visibility_covers_requester_manager_and_hr() {
        let request = existing(TimeOffStatus::Pending, date(2025, 3, 1), date(2025, 3, 5));
        let requester = member(2, 20, Role::Employee, Some(10), "Engineering");
        let manager = member(1, 10, Role::Manager, None, "Engineering");
        let hr = member(3, 30, Role::Manager, None, "Human Resources");
        let peer = member(5, 50, Role::Employee, Some(10), "Engineering");

        assert!(can_view(&request, &requester, &requester, "Human Resources"));
        assert!(can_view(&request, &requester, &manager, "Human Resources"));
        assert!(can_view(&request, &requester, &hr, "Human Resources"));
        assert!(!can_view(&request, &requester, &peer, "Human Resources"));
    }

    #[test]
    fn guarded_updates_check_prior_status() {
        for stage in [Stage::Manager, Stage::Hr, Stage::Requester] {
            assert!(transition_sql(stage).ends_with("WHERE id = ? AND status = ?"));
        }
        assert!(transition_sql(Stage::Hr).contains("hr_id = ?"));
    }

    #[test]
    fn unknown_actions_do_not_parse() {
        assert!("approve".parse::<Decision>().is_ok());
        assert!("escalate".parse::<Decision>().is_err());
    }
}
