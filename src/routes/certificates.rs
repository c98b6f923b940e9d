/**
 * Certificate Routes
 * CRUD API endpoints for certificates; each certificate may reference a
 * category (nullable, set-null on category delete)
 */
use axum::{
    extract::{Multipart, Path},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::db::{self, models::Certificate};
use crate::error::ApiError;
use crate::forms::FormData;
use crate::response;
use crate::routes::parse_id;
use crate::storage::{self, BaseUrl};
use crate::validate::{self, FieldErrors};

const COLUMNS: &str = r#"
    c.id, c.title, c.platform, c.category_id, c.image, c."order", c.is_active,
    c.created_at, c.updated_at, cat.name AS category_name, cat.color AS category_color
"#;

const FROM: &str = "FROM certificates c LEFT JOIN categories cat ON cat.id = c.category_id";

#[derive(Debug, Serialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct CertificateResource {
    pub id: i64,
    pub title: String,
    pub platform: String,
    pub category: Option<CategoryRef>,
    pub image: Option<String>,
    pub order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CertificateResource {
    fn new(certificate: Certificate, base: &BaseUrl) -> Self {
        let category = match (certificate.category_id, certificate.category_name) {
            (Some(id), Some(name)) => Some(CategoryRef {
                id,
                name,
                color: certificate
                    .category_color
                    .unwrap_or_else(|| "#3b82f6".to_string()),
            }),
            _ => None,
        };

        Self {
            id: certificate.id,
            title: certificate.title,
            platform: certificate.platform,
            category,
            image: certificate
                .image
                .map(|path| storage::public_url(base, &path)),
            order: certificate.order,
            is_active: certificate.is_active,
            created_at: certificate.created_at,
            updated_at: certificate.updated_at,
        }
    }
}

async fn fetch_certificate(pool: &PgPool, id: i64) -> Result<Option<Certificate>, sqlx::Error> {
    sqlx::query_as::<_, Certificate>(&format!("SELECT {} {} WHERE c.id = $1", COLUMNS, FROM))
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn check_category_exists(
    pool: &PgPool,
    errors: &mut FieldErrors,
    category_id: Option<i64>,
) -> Result<(), sqlx::Error> {
    let Some(category_id) = category_id else {
        return Ok(());
    };
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
            .bind(category_id)
            .fetch_one(pool)
            .await?;
    if !exists {
        validate::push(errors, "category_id", "The selected category_id is invalid.");
    }
    Ok(())
}

/// GET /api/v1/certificates - active certificates with category loaded
pub async fn index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let certificates = sqlx::query_as::<_, Certificate>(&format!(
        r#"SELECT {} {} WHERE c.is_active = true
           ORDER BY c."order" ASC, c.created_at DESC"#,
        COLUMNS, FROM
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<CertificateResource> = certificates
        .into_iter()
        .map(|c| CertificateResource::new(c, &base))
        .collect();

    Ok(response::ok(data))
}

/// GET /api/v1/admin/certificates
pub async fn admin_index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let certificates = sqlx::query_as::<_, Certificate>(&format!(
        r#"SELECT {} {} ORDER BY c."order" ASC, c.created_at DESC"#,
        COLUMNS, FROM
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<CertificateResource> = certificates
        .into_iter()
        .map(|c| CertificateResource::new(c, &base))
        .collect();

    Ok(response::ok(data))
}

/// GET /api/v1/certificates/{id}
pub async fn show(base: BaseUrl, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Certificate")?;

    let certificate = fetch_certificate(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Certificate"))?;

    Ok(response::ok(CertificateResource::new(certificate, &base)))
}

/// POST /api/v1/admin/certificates
pub async fn store(base: BaseUrl, multipart: Multipart) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let form = FormData::read(multipart).await?;

    let mut errors = FieldErrors::new();
    let title = validate::required_str(&mut errors, "title", form.first("title"), Some(255));
    let platform =
        validate::required_str(&mut errors, "platform", form.first("platform"), Some(255));
    let category_id = validate::parse_int(&mut errors, "category_id", form.first("category_id"));
    let order = validate::parse_int32(&mut errors, "order", form.first("order"));
    storage::validate_image(&mut errors, "image", form.file("image"), false);
    check_category_exists(pool.as_ref(), &mut errors, category_id).await?;

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let image = match form.file("image") {
        Some(file) => Some(storage::store_image("certificates", file, false).await?),
        None => None,
    };

    let (id,): (i64,) = sqlx::query_as(
        r#"INSERT INTO certificates (title, platform, category_id, image, "order")
           VALUES ($1, $2, $3, $4, $5)
           RETURNING id"#,
    )
    .bind(title.unwrap_or_default())
    .bind(platform.unwrap_or_default())
    .bind(category_id)
    .bind(&image)
    .bind(order.unwrap_or(0))
    .fetch_one(pool.as_ref())
    .await?;

    let certificate = fetch_certificate(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Certificate"))?;

    Ok(response::created(CertificateResource::new(certificate, &base)))
}

/// PUT /api/v1/admin/certificates/{id} - partial update
pub async fn update(
    base: BaseUrl,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Certificate")?;
    let form = FormData::read(multipart).await?;

    let existing = fetch_certificate(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Certificate"))?;

    let mut errors = FieldErrors::new();
    let title = if form.has("title") {
        validate::required_str(&mut errors, "title", form.first("title"), Some(255))
    } else {
        None
    };
    let platform = if form.has("platform") {
        validate::required_str(&mut errors, "platform", form.first("platform"), Some(255))
    } else {
        None
    };
    let category_id = validate::parse_int(&mut errors, "category_id", form.first("category_id"));
    let order = validate::parse_int32(&mut errors, "order", form.first("order"));
    let is_active = validate::parse_bool(&mut errors, "is_active", form.first("is_active"));
    storage::validate_image(&mut errors, "image", form.file("image"), false);
    check_category_exists(pool.as_ref(), &mut errors, category_id).await?;

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let image = match form.file("image") {
        Some(file) => {
            if let Some(old) = &existing.image {
                storage::delete_blob(old).await;
            }
            Some(storage::store_image("certificates", file, false).await?)
        }
        None => existing.image,
    };

    sqlx::query(
        r#"UPDATE certificates
           SET title = $1, platform = $2, category_id = $3, image = $4,
               "order" = $5, is_active = $6, updated_at = now()
           WHERE id = $7"#,
    )
    .bind(title.unwrap_or(existing.title))
    .bind(platform.unwrap_or(existing.platform))
    .bind(category_id.or(existing.category_id))
    .bind(&image)
    .bind(order.unwrap_or(existing.order))
    .bind(is_active.unwrap_or(existing.is_active))
    .bind(id)
    .execute(pool.as_ref())
    .await?;

    let certificate = fetch_certificate(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Certificate"))?;

    Ok(response::ok(CertificateResource::new(certificate, &base)))
}

/// DELETE /api/v1/admin/certificates/{id}
pub async fn destroy(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Certificate")?;

    let certificate = fetch_certificate(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Certificate"))?;

    if let Some(image) = &certificate.image {
        storage::delete_blob(image).await;
    }

    sqlx::query("DELETE FROM certificates WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    Ok(response::ok_message("Certificate deleted successfully"))
}
