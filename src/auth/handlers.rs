use crate::{
    auth::{
        auth::bearer_token,
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{AppError, AppResult, ErrorBody, MessageBody},
    model::{parse_column, role::Role},
    models::{Claims, LoginRequest, LoginRow, RegisterRequest, TokenPair, TokenType},
    utils::{IdentityKind, identity_cache, identity_filter},
};
use actix_web::{HttpRequest, HttpResponse, web};
use sqlx::MySqlPool;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// MySQL reports unique key violations with SQLSTATE 23000.
pub(crate) fn is_duplicate_key(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000"))
}

/// Ok(true) => AVAILABLE, Ok(false) => TAKEN
pub async fn is_available(kind: IdentityKind, value: &str, pool: &MySqlPool) -> AppResult<bool> {
    // 1. Cuckoo filter, fast negative
    if !identity_filter::might_exist(kind, value) {
        return Ok(true);
    }

    // 2. Moka cache, fast positive
    if identity_cache::is_taken(kind, value).await {
        return Ok(false);
    }

    // 3. Database fallback
    let sql = format!("SELECT EXISTS(SELECT 1 FROM users WHERE LOWER({}) = ? LIMIT 1)", kind.column());
    let exists = sqlx::query_scalar::<_, bool>(&sql)
        .bind(value.trim().to_lowercase())
        .fetch_one(pool)
        .await?;

    if exists {
        identity_cache::mark_taken(kind, value).await;
    }
    Ok(!exists)
}

/// Records a new identifier in the filter and the cache.
pub async fn remember_identity(kind: IdentityKind, value: &str) {
    identity_filter::insert(kind, value);
    identity_cache::mark_taken(kind, value).await;
}

/// Drops a released identifier from the cache. The filter keeps it, a
/// stale positive only costs one database lookup.
pub async fn release_identity(kind: IdentityKind, value: &str) {
    identity_cache::forget(kind, value).await;
}

fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    AppError::Internal(format!("token encoding failed: {e}"))
}

async fn issue_tokens(subject: &TokenSubject, pool: &MySqlPool, config: &Config) -> AppResult<TokenPair> {
    let access_token =
        generate_access_token(subject, &config.jwt_secret, config.access_token_ttl).map_err(token_error)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl).map_err(token_error)?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");
    store_refresh_token(pool, &refresh_claims).await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

async fn store_refresh_token<'e, E>(executor: E, claims: &Claims) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::MySql>,
{
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(claims.user_id)
    .bind(&claims.jti)
    .bind(claims.exp as i64)
    .execute(executor)
    .await?;
    Ok(())
}

fn role_id(role: Option<&str>) -> AppResult<Option<u8>> {
    role.map(|r| parse_column::<Role>(r, "employees.role").map(Role::id))
        .transpose()
}

const LOGIN_SQL: &str = r#"
    SELECT u.id, u.username, u.password_hash, u.is_active, e.id AS employee_id, e.role
    FROM users u
    LEFT JOIN employees e ON e.user_id = u.id
"#;

/// User registration handler
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = MessageBody),
        (status = 409, description = "Username or email already taken", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(pool, payload), fields(username = %payload.username))]
pub async fn register(payload: web::Json<RegisterRequest>, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();
    payload.validate()?;

    let username = payload.username.trim();
    let email = payload.email.trim();

    if !is_available(IdentityKind::Username, username, &pool).await? {
        return Err(AppError::Conflict("Username already taken".into()));
    }
    if !is_available(IdentityKind::Email, email, &pool).await? {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let hashed = hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

    let result = sqlx::query("INSERT INTO users (username, email, password_hash, is_active) VALUES (?, ?, ?, TRUE)")
        .bind(username)
        .bind(email)
        .bind(&hashed)
        .execute(pool.get_ref())
        .await;

    match result {
        Ok(_) => {
            remember_identity(IdentityKind::Username, username).await;
            remember_identity(IdentityKind::Email, email).await;
            info!("User registered");
            Ok(HttpResponse::Created().json(MessageBody::new("User registered successfully")))
        }
        // lost a race with a concurrent registration
        Err(e) if is_duplicate_key(&e) => Err(AppError::Conflict("Username or email already taken".into())),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Account disabled", body = ErrorBody)
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(pool, config, payload), fields(login = %payload.login))]
pub async fn login(
    payload: web::Json<LoginRequest>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    let login = payload.login.trim();
    if login.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("Username or password required".into()));
    }

    let by = if login.contains('@') { "u.email" } else { "u.username" };
    let sql = format!("{LOGIN_SQL} WHERE {by} = ?");
    let user = sqlx::query_as::<_, LoginRow>(&sql)
        .bind(login)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| {
            info!("Invalid credentials: user not found");
            AppError::Unauthorized("Invalid credentials".into())
        })?;

    if let Err(e) = verify_password(&payload.password, &user.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if !user.is_active {
        info!(user_id = user.id, "Login refused: account disabled");
        return Err(AppError::Forbidden("Account is disabled".into()));
    }

    let subject = TokenSubject {
        user_id: user.id,
        username: user.username.clone(),
        role: role_id(user.role.as_deref())?,
        employee_id: user.employee_id,
    };
    let tokens = issue_tokens(&subject, &pool, &config).await?;

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(user.id)
        .execute(pool.get_ref())
        .await
    {
        // not fatal for the login itself
        warn!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = user.id, "Login successful");
    Ok(HttpResponse::Ok().json(tokens))
}

/// Rotates a refresh token sent as `Authorization: Bearer <refresh token>`.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Invalid, expired or revoked refresh token", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let token = bearer_token(&req)?;
    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }

    // Current role and active flag, not the ones frozen in the old token
    let user = sqlx::query_as::<_, LoginRow>(&format!("{LOGIN_SQL} WHERE u.id = ?"))
        .bind(claims.user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account not found".into()))?;
    if !user.is_active {
        return Err(AppError::Forbidden("Account is disabled".into()));
    }

    let subject = TokenSubject {
        user_id: user.id,
        username: user.username,
        role: role_id(user.role.as_deref())?,
        employee_id: user.employee_id,
    };
    let access_token =
        generate_access_token(&subject, &config.jwt_secret, config.access_token_ttl).map_err(token_error)?;
    let (new_refresh_token, new_claims) =
        generate_refresh_token(&subject, &config.jwt_secret, config.refresh_token_ttl).map_err(token_error)?;

    let mut tx = pool.begin().await?;

    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE jti = ? AND user_id = ? AND revoked = FALSE AND expires_at > NOW()
        "#,
    )
    .bind(&claims.jti)
    .bind(claims.user_id)
    .execute(&mut *tx)
    .await?;

    if revoked.rows_affected() == 0 {
        tx.rollback().await?;
        warn!(user_id = claims.user_id, jti = %claims.jti, "Refresh with unknown or revoked token");
        return Err(AppError::Unauthorized("Invalid or revoked refresh token".into()));
    }

    store_refresh_token(&mut *tx, &new_claims).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(TokenPair {
        access_token,
        refresh_token: new_refresh_token,
    }))
}

/// Revokes the refresh token. Always answers 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(req: HttpRequest, pool: web::Data<MySqlPool>, config: web::Data<Config>) -> HttpResponse {
    let Ok(token) = bearer_token(&req) else {
        return HttpResponse::NoContent().finish();
    };
    let Ok(claims) = verify_token(token, &config.jwt_secret) else {
        return HttpResponse::NoContent().finish();
    };

    // only refresh tokens can logout
    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        warn!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_roles_map_to_claim_ids() {
        assert_eq!(role_id(Some("manager")).unwrap(), Some(2));
        assert_eq!(role_id(None).unwrap(), None);
        assert!(role_id(Some("hr")).is_err());
    }

    #[test]
    fn non_database_errors_are_not_duplicates() {
        assert!(!is_duplicate_key(&sqlx::Error::RowNotFound));
    }
}
