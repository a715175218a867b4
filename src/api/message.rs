use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult, ErrorBody},
    model::message::{MESSAGE_COLUMNS, Message, NewMessage},
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, MySql, MySqlPool};
use tracing::{debug, info};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ComposeMessage {
    #[schema(example = 7)]
    pub recipient_id: u64,
    #[validate(length(max = 200, message = "Subject must be at most 200 characters"))]
    pub subject: Option<String>,
    #[validate(length(min = 1, max = 5000, message = "Message body must be between 1 and 5000 characters"))]
    pub body: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReplyMessage {
    #[validate(length(min = 1, max = 5000, message = "Message body must be between 1 and 5000 characters"))]
    pub body: String,
}

#[derive(Serialize, ToSchema)]
pub struct InboxResponse {
    pub data: Vec<Message>,
    #[schema(example = 2)]
    pub unread: i64,
}

/// Writes one message with whatever executor the caller holds, so workflow
/// notifications can share the decision's transaction.
pub(crate) async fn insert_message<'e, E>(executor: E, message: &NewMessage) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO messages (sender_id, recipient_id, subject, body, is_read, created_at)
        VALUES (?, ?, ?, ?, FALSE, UTC_TIMESTAMP())
        "#,
    )
    .bind(message.sender_id)
    .bind(message.recipient_id)
    .bind(&message.subject)
    .bind(&message.body)
    .execute(executor)
    .await?;
    Ok(result.last_insert_id())
}

async fn fetch_message(pool: &MySqlPool, id: u64) -> AppResult<Message> {
    sqlx::query_as::<_, Message>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))
}

async fn require_active_recipient(pool: &MySqlPool, user_id: u64) -> AppResult<()> {
    let active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    match active {
        Some(true) => Ok(()),
        _ => Err(AppError::NotFound("Recipient not found".into())),
    }
}

#[utoipa::path(
    get,
    path = "/api/messages/inbox",
    responses(
        (status = 200, description = "Received messages, newest first", body = InboxResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Messages"
)]
pub async fn inbox(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let data = sqlx::query_as::<_, Message>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE recipient_id = ? ORDER BY created_at DESC, id DESC"
    ))
    .bind(auth.user_id)
    .fetch_all(pool.get_ref())
    .await?;

    let unread = data.iter().filter(|m| !m.is_read).count() as i64;
    Ok(HttpResponse::Ok().json(InboxResponse { data, unread }))
}

#[utoipa::path(
    get,
    path = "/api/messages/sent",
    responses((status = 200, description = "Sent messages, newest first", body = [Message])),
    security(("bearer_auth" = [])),
    tag = "Messages"
)]
pub async fn sent(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let data = sqlx::query_as::<_, Message>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE sender_id = ? ORDER BY created_at DESC, id DESC"
    ))
    .bind(auth.user_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(data))
}

#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = ComposeMessage,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 400, description = "Cannot message yourself", body = ErrorBody),
        (status = 404, description = "Recipient not found", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Messages"
)]
pub async fn compose(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ComposeMessage>,
) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();
    payload.validate()?;

    if payload.recipient_id == auth.user_id {
        return Err(AppError::BadRequest("You cannot message yourself".into()));
    }
    require_active_recipient(&pool, payload.recipient_id).await?;

    let id = insert_message(
        pool.get_ref(),
        &NewMessage {
            sender_id: auth.user_id,
            recipient_id: payload.recipient_id,
            subject: payload.subject.filter(|s| !s.trim().is_empty()),
            body: payload.body,
        },
    )
    .await?;

    info!(message_id = id, sender_id = auth.user_id, "Message sent");
    Ok(HttpResponse::Created().json(fetch_message(&pool, id).await?))
}

/// Only participants may view. The recipient's first view marks it read.
#[utoipa::path(
    get,
    path = "/api/messages/{message_id}",
    params(("message_id" = u64, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Message", body = Message),
        (status = 403, description = "Not a participant", body = ErrorBody),
        (status = 404, description = "Message not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Messages"
)]
pub async fn view(auth: AuthUser, pool: web::Data<MySqlPool>, path: web::Path<u64>) -> AppResult<HttpResponse> {
    let mut message = fetch_message(&pool, path.into_inner()).await?;

    if !message.is_participant(auth.user_id) {
        return Err(AppError::Forbidden("You cannot view this message".into()));
    }

    if message.recipient_id == auth.user_id && !message.is_read {
        sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = ?")
            .bind(message.id)
            .execute(pool.get_ref())
            .await?;
        message.is_read = true;
        debug!(message_id = message.id, "Message marked read");
    }

    Ok(HttpResponse::Ok().json(message))
}

#[utoipa::path(
    post,
    path = "/api/messages/{message_id}/reply",
    params(("message_id" = u64, Path, description = "Message being answered")),
    request_body = ReplyMessage,
    responses(
        (status = 201, description = "Reply sent to the original sender", body = Message),
        (status = 403, description = "Only the recipient can reply", body = ErrorBody),
        (status = 404, description = "Message not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Messages"
)]
pub async fn reply(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ReplyMessage>,
) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();
    payload.validate()?;

    let original = fetch_message(&pool, path.into_inner()).await?;
    if original.recipient_id != auth.user_id {
        return Err(AppError::Forbidden("Only the recipient can reply".into()));
    }
    require_active_recipient(&pool, original.sender_id).await?;

    let id = insert_message(
        pool.get_ref(),
        &NewMessage {
            sender_id: auth.user_id,
            recipient_id: original.sender_id,
            subject: Some(reply_subject(original.subject.as_deref())),
            body: payload.body,
        },
    )
    .await?;

    Ok(HttpResponse::Created().json(fetch_message(&pool, id).await?))
}

fn reply_subject(subject: Option<&str>) -> String {
    match subject.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) if s.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) => s.to_string(),
        Some(s) => format!("Re: {s}"),
        None => "Re:".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_subject_is_prefixed_once() {
        assert_eq!(reply_subject(Some("Lunch")), "Re: Lunch");
        assert_eq!(reply_subject(Some("RE: Lunch")), "RE: Lunch");
        assert_eq!(reply_subject(None), "Re:");
    }

    #[test]
    fn empty_body_is_rejected() {
        let msg = ComposeMessage {
            recipient_id: 2,
            subject: None,
            body: String::new(),
        };
        assert!(msg.validate().is_err());
    }
}
