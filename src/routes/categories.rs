/**
 * Category Routes
 * CRUD API endpoints for certificate categories. Deleting a category that
 * still has certificates referencing it is rejected with a conflict.
 */
use axum::{extract::Path, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db::{self, models::Category};
use crate::error::ApiError;
use crate::response;
use crate::routes::parse_id;
use crate::validate::{self, FieldErrors};

const COLUMNS: &str =
    r#"id, name, description, color, "order", is_active, created_at, updated_at"#;

const DEFAULT_COLOR: &str = "#3b82f6";

#[derive(Debug, Serialize)]
pub struct CategoryResource {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Category> for CategoryResource {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
            description: category.description,
            color: category.color,
            order: category.order,
            is_active: category.is_active,
            created_at: category.created_at,
            updated_at: category.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub order: Option<i64>,
    pub is_active: Option<bool>,
}

async fn fetch_category(pool: &PgPool, id: i64) -> Result<Option<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(&format!("SELECT {} FROM categories WHERE id = $1", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Category names are unique; `exclude` skips the record being updated.
async fn check_name_unique(
    pool: &PgPool,
    errors: &mut FieldErrors,
    name: Option<&str>,
    exclude: Option<i64>,
) -> Result<(), sqlx::Error> {
    let Some(name) = name else { return Ok(()) };
    let (taken,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE name = $1 AND ($2::bigint IS NULL OR id <> $2))",
    )
    .bind(name)
    .bind(exclude)
    .fetch_one(pool)
    .await?;
    if taken {
        validate::push(errors, "name", "The name has already been taken.");
    }
    Ok(())
}

/// GET /api/v1/categories - active categories
pub async fn index() -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let categories = sqlx::query_as::<_, Category>(&format!(
        r#"SELECT {} FROM categories WHERE is_active = true
           ORDER BY "order" ASC, name ASC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<CategoryResource> = categories.into_iter().map(Into::into).collect();
    Ok(response::ok(data))
}

/// GET /api/v1/admin/categories
pub async fn admin_index() -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let categories = sqlx::query_as::<_, Category>(&format!(
        r#"SELECT {} FROM categories ORDER BY "order" ASC, name ASC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<CategoryResource> = categories.into_iter().map(Into::into).collect();
    Ok(response::ok(data))
}

/// GET /api/v1/categories/{id}
pub async fn show(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Category")?;

    let category = fetch_category(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Category"))?;

    Ok(response::ok(CategoryResource::from(category)))
}

/// POST /api/v1/admin/categories
pub async fn store(Json(payload): Json<CategoryPayload>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let mut errors = FieldErrors::new();
    let name = validate::required_str(&mut errors, "name", payload.name.as_deref(), Some(255));
    let description =
        validate::optional_str(&mut errors, "description", payload.description.as_deref(), None);
    let color = validate::optional_str(&mut errors, "color", payload.color.as_deref(), Some(50));
    let order = validate::check_int32(&mut errors, "order", payload.order);
    check_name_unique(pool.as_ref(), &mut errors, name.as_deref(), None).await?;

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let category = sqlx::query_as::<_, Category>(&format!(
        r#"INSERT INTO categories (name, description, color, "order")
           VALUES ($1, $2, $3, $4)
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(name.unwrap_or_default())
    .bind(&description)
    .bind(color.unwrap_or_else(|| DEFAULT_COLOR.to_string()))
    .bind(order.unwrap_or(0))
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::created(CategoryResource::from(category)))
}

/// PUT /api/v1/admin/categories/{id} - partial update
pub async fn update(
    Path(id): Path<String>,
    Json(payload): Json<CategoryPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Category")?;

    let existing = fetch_category(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Category"))?;

    let mut errors = FieldErrors::new();
    let name = if payload.name.is_some() {
        validate::required_str(&mut errors, "name", payload.name.as_deref(), Some(255))
    } else {
        None
    };
    let description =
        validate::optional_str(&mut errors, "description", payload.description.as_deref(), None);
    let color = validate::optional_str(&mut errors, "color", payload.color.as_deref(), Some(50));
    let order = validate::check_int32(&mut errors, "order", payload.order);
    check_name_unique(pool.as_ref(), &mut errors, name.as_deref(), Some(id)).await?;

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let category = sqlx::query_as::<_, Category>(&format!(
        r#"UPDATE categories
           SET name = $1, description = $2, color = $3, "order" = $4,
               is_active = $5, updated_at = now()
           WHERE id = $6
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(name.unwrap_or(existing.name))
    .bind(description.or(existing.description))
    .bind(color.unwrap_or(existing.color))
    .bind(order.unwrap_or(existing.order))
    .bind(payload.is_active.unwrap_or(existing.is_active))
    .bind(id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::ok(CategoryResource::from(category)))
}

/// DELETE /api/v1/admin/categories/{id} - rejected while certificates still
/// reference the category; no state changes on rejection
pub async fn destroy(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Category")?;

    let category = fetch_category(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Category"))?;

    let (in_use,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM certificates WHERE category_id = $1")
            .bind(category.id)
            .fetch_one(pool.as_ref())
            .await?;

    if in_use > 0 {
        return Err(ApiError::Conflict(
            "Cannot delete category that is being used by certificates!".to_string(),
        ));
    }

    sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    Ok(response::ok_message("Category deleted successfully"))
}
