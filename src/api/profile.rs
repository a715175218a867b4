use std::collections::{HashMap, HashSet};

use crate::{
    api::require_admin,
    auth::{
        auth::AuthUser,
        handlers::{is_available, is_duplicate_key, release_identity, remember_identity},
        password::hash_password,
    },
    error::{AppError, AppResult, ErrorBody, FieldErrors},
    model::{
        employee::{EMPLOYEE_COLUMNS, Employee, EmployeeRow},
        user::{User, UserSummary},
    },
    policy::{
        EditContext, ProfileField,
        profile::{FormField, ProfileChanges, ProfileSnapshot, ProfileSubmission, build_form, validate_submission},
    },
    utils::{
        IdentityKind,
        db_utils::{SqlValue, build_update_sql, execute_update},
    },
    workflow::{
        Member,
        member::{find_member, load_actor},
    },
};
use actix_web::{HttpResponse, web};
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ProfileForm {
    #[schema(example = 7)]
    pub user_id: u64,
    pub self_edit: bool,
    pub fields: Vec<FormField>,
}

async fn load_snapshot(pool: &MySqlPool, user_id: u64) -> AppResult<ProfileSnapshot> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, bio, is_active, last_login_at, created_at FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let employee = sqlx::query_as::<_, EmployeeRow>(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE user_id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .map(Employee::try_from)
        .transpose()?;

    Ok(ProfileSnapshot {
        user_id: user.id,
        username: user.username,
        email: user.email,
        bio: user.bio,
        is_active: user.is_active,
        employee,
    })
}

/// Resolves actor and target. Non-admins may only open their own profile.
async fn edit_session(pool: &MySqlPool, auth: &AuthUser, target_id: u64) -> AppResult<(Member, Member)> {
    let actor = load_actor(pool, auth.user_id).await?;
    if !actor.is_admin() && actor.user_id != target_id {
        return Err(AppError::Forbidden("You can only edit your own profile".into()));
    }
    let target = find_member(pool, target_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok((actor, target))
}

/// True when making `new_manager` the manager of `employee` closes a loop.
fn creates_cycle(employee: u64, new_manager: u64, managers: &HashMap<u64, Option<u64>>) -> bool {
    let mut seen = HashSet::new();
    let mut cursor = Some(new_manager);
    while let Some(id) = cursor {
        if id == employee {
            return true;
        }
        if !seen.insert(id) {
            // pre-existing loop that does not involve this employee
            return false;
        }
        cursor = managers.get(&id).copied().flatten();
    }
    false
}

/// Why `new_manager` cannot manage `employee`, if it cannot.
pub(crate) async fn manager_assignment_error(
    pool: &MySqlPool,
    employee: u64,
    new_manager: u64,
) -> AppResult<Option<&'static str>> {
    if employee == new_manager {
        return Ok(Some("An employee cannot manage themselves"));
    }
    let managers: HashMap<u64, Option<u64>> =
        sqlx::query_as::<_, (u64, Option<u64>)>("SELECT id, manager_id FROM employees")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();
    if !managers.contains_key(&new_manager) {
        Ok(Some("Manager not found"))
    } else if creates_cycle(employee, new_manager, &managers) {
        Ok(Some("This would create a management cycle"))
    } else {
        Ok(None)
    }
}

/// Checks that need the database: uniqueness, references and the hierarchy.
async fn check_against_store(
    pool: &MySqlPool,
    current: &ProfileSnapshot,
    changes: &ProfileChanges,
) -> AppResult<FieldErrors> {
    let mut errors = FieldErrors::new();

    for (column, value) in &changes.user {
        let kind = match *column {
            "username" => IdentityKind::Username,
            "email" => IdentityKind::Email,
            _ => continue,
        };
        if let SqlValue::Text(Some(value)) = value {
            let unchanged_case = match kind {
                IdentityKind::Username => value.eq_ignore_ascii_case(&current.username),
                IdentityKind::Email => value.eq_ignore_ascii_case(&current.email),
            };
            if !unchanged_case && !is_available(kind, value, pool).await? {
                errors.add(kind.column(), format!("This {kind} is already taken"));
            }
        }
    }

    for (column, value) in &changes.employee {
        if let (&"department_id", SqlValue::Int(Some(department_id))) = (column, value) {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM departments WHERE id = ?)")
                .bind(*department_id)
                .fetch_one(pool)
                .await?;
            if !exists {
                errors.add("department_id", "Department not found");
            }
        }
    }

    if let (Some(new_manager), Some(employee)) = (changes.manager_change(), current.employee.as_ref()) {
        if let Some(message) = manager_assignment_error(pool, employee.id, new_manager).await? {
            errors.add("manager_id", message);
        }
    }

    Ok(errors)
}

async fn apply_changes(
    pool: &MySqlPool,
    current: &ProfileSnapshot,
    mut changes: ProfileChanges,
) -> AppResult<()> {
    if let Some(password) = changes.password.take() {
        let hashed =
            hash_password(&password).map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;
        changes.user.push((ProfileField::Password.column(), hashed.into()));
    }

    let mut tx = pool.begin().await?;

    if !changes.user.is_empty() {
        let update = build_update_sql("users", changes.user.clone(), "id", current.user_id)?;
        execute_update(&mut *tx, update).await.map_err(duplicate_as_conflict)?;
    }
    if let (false, Some(employee)) = (changes.employee.is_empty(), current.employee.as_ref()) {
        let update = build_update_sql("employees", changes.employee.clone(), "id", employee.id)?;
        execute_update(&mut *tx, update).await.map_err(duplicate_as_conflict)?;
    }

    tx.commit().await?;

    for (column, value) in &changes.user {
        let (kind, old) = match *column {
            "username" => (IdentityKind::Username, &current.username),
            "email" => (IdentityKind::Email, &current.email),
            _ => continue,
        };
        if let SqlValue::Text(Some(new)) = value {
            release_identity(kind, old).await;
            remember_identity(kind, new).await;
        }
    }
    Ok(())
}

fn duplicate_as_conflict(e: sqlx::Error) -> AppError {
    if is_duplicate_key(&e) {
        AppError::Conflict("Username, email or employee code already in use".into())
    } else {
        e.into()
    }
}

#[utoipa::path(
    get,
    path = "/api/profile/{user_id}",
    params(("user_id" = u64, Path, description = "User whose profile is opened")),
    responses(
        (status = 200, description = "Visible fields with access and current value", body = ProfileForm),
        (status = 403, description = "Non-admins may only open their own profile", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn profile_form(auth: AuthUser, pool: web::Data<MySqlPool>, path: web::Path<u64>) -> AppResult<HttpResponse> {
    let (actor, target) = edit_session(&pool, &auth, path.into_inner()).await?;
    let ctx = EditContext::new(&actor, &target);
    let current = load_snapshot(&pool, target.user_id).await?;

    Ok(HttpResponse::Ok().json(ProfileForm {
        user_id: target.user_id,
        self_edit: ctx.self_edit,
        fields: build_form(&ctx, &current),
    }))
}

#[utoipa::path(
    put,
    path = "/api/profile/{user_id}",
    params(("user_id" = u64, Path, description = "User being edited")),
    request_body = ProfileSubmission,
    responses(
        (status = 200, description = "Profile saved, refreshed form returned", body = ProfileForm),
        (status = 403, description = "Non-admins may only edit their own profile", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
        (status = 409, description = "Unique value already in use", body = ErrorBody),
        (status = 422, description = "Disallowed or invalid field changes", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
#[instrument(name = "profile_update", skip(pool, path, payload), fields(actor = auth.user_id))]
pub async fn update_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ProfileSubmission>,
) -> AppResult<HttpResponse> {
    let (actor, target) = edit_session(&pool, &auth, path.into_inner()).await?;
    let ctx = EditContext::new(&actor, &target);
    let current = load_snapshot(&pool, target.user_id).await?;

    let changes = validate_submission(&ctx, &current, &payload).map_err(AppError::Validation)?;
    check_against_store(&pool, &current, &changes).await?.into_result()?;

    if !changes.is_empty() {
        let touched: Vec<String> = changes.touched.iter().map(ToString::to_string).collect();
        apply_changes(&pool, &current, changes).await?;
        info!(target_user = target.user_id, fields = ?touched, "Profile updated");
    }

    let current = load_snapshot(&pool, target.user_id).await?;
    Ok(HttpResponse::Ok().json(ProfileForm {
        user_id: target.user_id,
        self_edit: ctx.self_edit,
        fields: build_form(&ctx, &current),
    }))
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All accounts", body = [UserSummary]),
        (status = 403, description = "Admin only", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn list_users(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    require_admin(&pool, &auth).await?;

    let users = sqlx::query_as::<_, UserSummary>(
        "SELECT id, username, email, is_active, last_login_at FROM users ORDER BY username",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(users))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(pairs: &[(u64, Option<u64>)]) -> HashMap<u64, Option<u64>> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn reporting_to_own_subordinate_is_a_cycle() {
        // 3 reports to 2, 2 reports to 1
        let managers = chain(&[(1, None), (2, Some(1)), (3, Some(2))]);
        assert!(creates_cycle(1, 3, &managers));
        assert!(creates_cycle(2, 2, &managers));
    }

    #[test]
    fn moving_under_unrelated_manager_is_fine() {
        let managers = chain(&[(1, None), (2, Some(1)), (3, Some(2)), (4, None)]);
        assert!(!creates_cycle(3, 4, &managers));
        assert!(!creates_cycle(3, 1, &managers));
    }

    #[test]
    fn existing_loops_elsewhere_terminate() {
        let managers = chain(&[(5, Some(6)), (6, Some(5))]);
        assert!(!creates_cycle(1, 5, &managers));
    }

    #[test]
    fn duplicate_keys_map_to_conflict_only() {
        assert!(matches!(duplicate_as_conflict(sqlx::Error::RowNotFound), AppError::Database(_)));
    }
}
