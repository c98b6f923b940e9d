/**
 * Technology Routes
 * CRUD API endpoints for the technology catalog (referenced by projects)
 */
use axum::{
    extract::{Multipart, Path},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{self, models::Technology};
use crate::error::ApiError;
use crate::forms::FormData;
use crate::response;
use crate::routes::parse_id;
use crate::storage::{self, BaseUrl};
use crate::validate::{self, FieldErrors};

const COLUMNS: &str = r#"id, name, icon, "order", is_active, created_at, updated_at"#;

#[derive(Debug, Serialize)]
pub struct TechnologyResource {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TechnologyResource {
    pub fn new(technology: Technology, base: &BaseUrl) -> Self {
        Self {
            id: technology.id,
            name: technology.name,
            icon: technology.icon.map(|path| storage::public_url(base, &path)),
            order: technology.order,
            is_active: technology.is_active,
            created_at: technology.created_at,
            updated_at: technology.updated_at,
        }
    }
}

/// GET /api/v1/technologies - active technologies, fixed ordering
pub async fn index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let technologies = sqlx::query_as::<_, Technology>(&format!(
        r#"SELECT {} FROM technologies WHERE is_active = true
           ORDER BY "order" ASC, created_at DESC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<TechnologyResource> = technologies
        .into_iter()
        .map(|t| TechnologyResource::new(t, &base))
        .collect();

    Ok(response::ok(data))
}

/// GET /api/v1/admin/technologies - all technologies, same ordering
pub async fn admin_index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let technologies = sqlx::query_as::<_, Technology>(&format!(
        r#"SELECT {} FROM technologies ORDER BY "order" ASC, created_at DESC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<TechnologyResource> = technologies
        .into_iter()
        .map(|t| TechnologyResource::new(t, &base))
        .collect();

    Ok(response::ok(data))
}

/// GET /api/v1/technologies/{id}
pub async fn show(base: BaseUrl, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Technology")?;

    let technology = sqlx::query_as::<_, Technology>(&format!(
        "SELECT {} FROM technologies WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or(ApiError::NotFound("Technology"))?;

    Ok(response::ok(TechnologyResource::new(technology, &base)))
}

/// POST /api/v1/admin/technologies
pub async fn store(base: BaseUrl, multipart: Multipart) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let form = FormData::read(multipart).await?;

    let mut errors = FieldErrors::new();
    let name = validate::required_str(&mut errors, "name", form.first("name"), Some(255));
    let order = validate::parse_int32(&mut errors, "order", form.first("order"));
    storage::validate_image(&mut errors, "icon", form.file("icon"), true);

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let icon = match form.file("icon") {
        Some(file) => Some(storage::store_image("technologies", file, true).await?),
        None => None,
    };

    let technology = sqlx::query_as::<_, Technology>(&format!(
        r#"INSERT INTO technologies (name, icon, "order")
           VALUES ($1, $2, $3)
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(name.unwrap_or_default())
    .bind(&icon)
    .bind(order.unwrap_or(0))
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::created(TechnologyResource::new(technology, &base)))
}

/// PUT /api/v1/admin/technologies/{id} - partial update
pub async fn update(
    base: BaseUrl,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Technology")?;
    let form = FormData::read(multipart).await?;

    let existing = sqlx::query_as::<_, Technology>(&format!(
        "SELECT {} FROM technologies WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or(ApiError::NotFound("Technology"))?;

    let mut errors = FieldErrors::new();
    let name = if form.has("name") {
        validate::required_str(&mut errors, "name", form.first("name"), Some(255))
    } else {
        None
    };
    let order = validate::parse_int32(&mut errors, "order", form.first("order"));
    let is_active = validate::parse_bool(&mut errors, "is_active", form.first("is_active"));
    storage::validate_image(&mut errors, "icon", form.file("icon"), true);

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    // Replacement deletes the old blob first; not transactional with the row
    // write below.
    let icon = match form.file("icon") {
        Some(file) => {
            if let Some(old) = &existing.icon {
                storage::delete_blob(old).await;
            }
            Some(storage::store_image("technologies", file, true).await?)
        }
        None => existing.icon,
    };

    let technology = sqlx::query_as::<_, Technology>(&format!(
        r#"UPDATE technologies
           SET name = $1, icon = $2, "order" = $3, is_active = $4, updated_at = now()
           WHERE id = $5
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(name.unwrap_or(existing.name))
    .bind(&icon)
    .bind(order.unwrap_or(existing.order))
    .bind(is_active.unwrap_or(existing.is_active))
    .bind(id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::ok(TechnologyResource::new(technology, &base)))
}

/// DELETE /api/v1/admin/technologies/{id}
pub async fn destroy(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Technology")?;

    let technology = sqlx::query_as::<_, Technology>(&format!(
        "SELECT {} FROM technologies WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or(ApiError::NotFound("Technology"))?;

    if let Some(icon) = &technology.icon {
        storage::delete_blob(icon).await;
    }

    sqlx::query("DELETE FROM technologies WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    Ok(response::ok_message("Technology deleted successfully"))
}
