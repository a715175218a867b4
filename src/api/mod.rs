pub mod attendance;
pub mod dashboard;
pub mod department;
pub mod employee;
pub mod message;
pub mod paystub;
pub mod profile;
pub mod task;
pub mod team;
pub mod time_off;
pub mod time_tracking;

use sqlx::MySqlPool;

use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    workflow::{Member, member::load_actor},
};

/// Reloads the caller and insists on the admin role.
pub(crate) async fn require_admin(pool: &MySqlPool, auth: &AuthUser) -> AppResult<Member> {
    let actor = load_actor(pool, auth.user_id).await?;
    if actor.is_admin() {
        Ok(actor)
    } else {
        Err(AppError::Forbidden("Admin only".into()))
    }
}

/// Reloads the caller and insists on a manager or admin role.
pub(crate) async fn require_reviewer(pool: &MySqlPool, auth: &AuthUser) -> AppResult<Member> {
    let actor = load_actor(pool, auth.user_id).await?;
    if actor.is_reviewer() {
        Ok(actor)
    } else {
        Err(AppError::Forbidden("Managers and admins only".into()))
    }
}
