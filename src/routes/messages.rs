/**
 * Message Routes
 * Public contact-form submissions and the admin inbox. Reading a message
 * through the admin endpoint marks it as read.
 */
use axum::{extract::Path, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db::{self, models::Message};
use crate::error::ApiError;
use crate::response;
use crate::routes::parse_id;
use crate::validate::{self, FieldErrors};

const COLUMNS: &str = "id, name, email, message, is_read, created_at, updated_at";

#[derive(Debug, Serialize)]
pub struct MessageResource {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Message> for MessageResource {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            name: message.name,
            email: message.email,
            message: message.message,
            is_read: message.is_read,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagePayload {
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageUpdatePayload {
    pub is_read: Option<bool>,
}

async fn fetch_message(pool: &PgPool, id: i64) -> Result<Option<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(&format!("SELECT {} FROM messages WHERE id = $1", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// POST /api/v1/messages - public contact form
pub async fn store(Json(payload): Json<MessagePayload>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let mut errors = FieldErrors::new();
    let name = validate::required_str(&mut errors, "name", payload.name.as_deref(), Some(255));
    let email = validate::required_email(&mut errors, "email", payload.email.as_deref(), 255);
    let message =
        validate::required_str(&mut errors, "message", payload.message.as_deref(), None);

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let message = sqlx::query_as::<_, Message>(&format!(
        r#"INSERT INTO messages (name, email, message)
           VALUES ($1, $2, $3)
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(name.unwrap_or_default())
    .bind(email.unwrap_or_default())
    .bind(message.unwrap_or_default())
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::created_with_message(
        MessageResource::from(message),
        "Message sent successfully!",
    ))
}

/// GET /api/v1/admin/messages - unread first, newest first
pub async fn admin_index() -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let messages = sqlx::query_as::<_, Message>(&format!(
        "SELECT {} FROM messages ORDER BY created_at DESC, is_read ASC",
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<MessageResource> = messages.into_iter().map(Into::into).collect();
    Ok(response::ok(data))
}

/// GET /api/v1/admin/messages/{id} - marks the message as read
pub async fn show(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Message")?;

    let message = sqlx::query_as::<_, Message>(&format!(
        "UPDATE messages SET is_read = true, updated_at = now() WHERE id = $1 RETURNING {}",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or(ApiError::NotFound("Message"))?;

    Ok(response::ok(MessageResource::from(message)))
}

/// PUT /api/v1/admin/messages/{id} - only the read flag is mutable
pub async fn update(
    Path(id): Path<String>,
    Json(payload): Json<MessageUpdatePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Message")?;

    let existing = fetch_message(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Message"))?;

    let message = sqlx::query_as::<_, Message>(&format!(
        "UPDATE messages SET is_read = $1, updated_at = now() WHERE id = $2 RETURNING {}",
        COLUMNS
    ))
    .bind(payload.is_read.unwrap_or(existing.is_read))
    .bind(id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::ok(MessageResource::from(message)))
}

/// DELETE /api/v1/admin/messages/{id}
pub async fn destroy(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Message")?;

    fetch_message(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Message"))?;

    sqlx::query("DELETE FROM messages WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    Ok(response::ok_message("Message deleted successfully"))
}
