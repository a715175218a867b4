use crate::{
    api::require_admin,
    auth::auth::AuthUser,
    error::{AppError, AppResult, ErrorBody, FieldErrors},
    model::paystub::{PAYSTUB_COLUMNS, Paystub, net_pay, round_cents, validate_paystub},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePaystub {
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = "2026-01-01", value_type = String)]
    pub pay_period_start: NaiveDate,
    #[schema(example = "2026-01-31", value_type = String)]
    pub pay_period_end: NaiveDate,
    #[schema(example = 5000.0)]
    pub gross_pay: f64,
    #[serde(default)]
    #[schema(example = 900.0)]
    pub taxes: f64,
    #[serde(default)]
    #[schema(example = 150.0)]
    pub deductions: f64,
    #[validate(length(max = 500, message = "Notes must be at most 500 characters"))]
    pub notes: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/paystubs",
    responses((status = 200, description = "Own paystubs, newest period first", body = [Paystub])),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn my_paystubs(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let stubs = sqlx::query_as::<_, Paystub>(&format!(
        "SELECT {PAYSTUB_COLUMNS} FROM paystubs WHERE user_id = ? ORDER BY pay_period_end DESC, id DESC"
    ))
    .bind(auth.user_id)
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(stubs))
}

#[utoipa::path(
    post,
    path = "/api/paystubs",
    request_body = CreatePaystub,
    responses(
        (status = 201, description = "Paystub issued with computed net pay", body = Paystub),
        (status = 403, description = "Admin only", body = ErrorBody),
        (status = 422, description = "Invalid amounts or period", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn create_paystub(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePaystub>,
) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;

    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(e) => e.into(),
    };
    if let Err(e) = validate_paystub(
        payload.pay_period_start,
        payload.pay_period_end,
        payload.gross_pay,
        payload.taxes,
        payload.deductions,
    ) {
        errors.merge(e);
    }
    let user_exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
        .bind(payload.user_id)
        .fetch_one(pool.get_ref())
        .await?;
    if !user_exists {
        errors.add("user_id", "User not found");
    }
    errors.into_result()?;

    let net = net_pay(payload.gross_pay, payload.taxes, payload.deductions);
    let result = sqlx::query(
        r#"
        INSERT INTO paystubs
            (user_id, pay_period_start, pay_period_end, gross_pay, taxes, deductions, net_pay, notes, issued_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, UTC_TIMESTAMP())
        "#,
    )
    .bind(payload.user_id)
    .bind(payload.pay_period_start)
    .bind(payload.pay_period_end)
    .bind(round_cents(payload.gross_pay))
    .bind(round_cents(payload.taxes))
    .bind(round_cents(payload.deductions))
    .bind(net)
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?;

    let stub = sqlx::query_as::<_, Paystub>(&format!("SELECT {PAYSTUB_COLUMNS} FROM paystubs WHERE id = ?"))
        .bind(result.last_insert_id())
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::Internal("inserted paystub vanished".into()))?;

    info!(paystub_id = stub.id, user_id = stub.user_id, net_pay = stub.net_pay, "Paystub issued");
    Ok(HttpResponse::Created().json(stub))
}
