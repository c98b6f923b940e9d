/**
 * Testimonial Routes
 * CRUD API endpoints for testimonials. Visitors may submit one through the
 * public endpoint; those land inactive until an admin approves them.
 */
use axum::{
    extract::{Multipart, Path},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::db::{self, models::Testimonial};
use crate::error::ApiError;
use crate::forms::FormData;
use crate::response;
use crate::routes::parse_id;
use crate::storage::{self, BaseUrl};
use crate::validate::{self, FieldErrors};

const COLUMNS: &str =
    "id, name, position, company, content, image, rating, is_active, created_at, updated_at";

#[derive(Debug, Serialize)]
pub struct TestimonialResource {
    pub id: i64,
    pub name: String,
    pub position: Option<String>,
    pub company: Option<String>,
    pub content: String,
    pub image: Option<String>,
    pub rating: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestimonialResource {
    fn new(testimonial: Testimonial, base: &BaseUrl) -> Self {
        Self {
            id: testimonial.id,
            name: testimonial.name,
            position: testimonial.position,
            company: testimonial.company,
            content: testimonial.content,
            image: testimonial
                .image
                .map(|path| storage::public_url(base, &path)),
            rating: testimonial.rating,
            is_active: testimonial.is_active,
            created_at: testimonial.created_at,
            updated_at: testimonial.updated_at,
        }
    }
}

#[derive(Debug)]
struct ValidatedTestimonial {
    name: String,
    position: Option<String>,
    company: Option<String>,
    content: String,
    rating: Option<i32>,
}

fn validate_payload(form: &FormData) -> Result<ValidatedTestimonial, ApiError> {
    let mut errors = FieldErrors::new();
    let name = validate::required_str(&mut errors, "name", form.first("name"), Some(255));
    let position =
        validate::optional_str(&mut errors, "position", form.first("position"), Some(255));
    let company = validate::optional_str(&mut errors, "company", form.first("company"), Some(255));
    let content = validate::required_str(&mut errors, "content", form.first("content"), None);
    let rating_raw = validate::parse_int(&mut errors, "rating", form.first("rating"));
    let rating = validate::check_rating(&mut errors, "rating", rating_raw);
    storage::validate_image(&mut errors, "image", form.file("image"), false);

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    Ok(ValidatedTestimonial {
        name: name.unwrap_or_default(),
        position,
        company,
        content: content.unwrap_or_default(),
        rating,
    })
}

/// Public submissions are always held for review no matter what the payload
/// says; admin creates honor the requested flag and default to active.
fn activation_for(is_admin: bool, requested: Option<bool>) -> bool {
    if is_admin {
        requested.unwrap_or(true)
    } else {
        false
    }
}

async fn fetch_testimonial(pool: &PgPool, id: i64) -> Result<Option<Testimonial>, sqlx::Error> {
    sqlx::query_as::<_, Testimonial>(&format!(
        "SELECT {} FROM testimonials WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

async fn insert(
    pool: &PgPool,
    payload: ValidatedTestimonial,
    image: Option<String>,
    is_active: bool,
) -> Result<Testimonial, sqlx::Error> {
    sqlx::query_as::<_, Testimonial>(&format!(
        r#"INSERT INTO testimonials (name, position, company, content, image, rating, is_active)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(&payload.name)
    .bind(&payload.position)
    .bind(&payload.company)
    .bind(&payload.content)
    .bind(&image)
    .bind(payload.rating)
    .bind(is_active)
    .fetch_one(pool)
    .await
}

/// GET /api/v1/testimonials - approved testimonials, newest first
pub async fn index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let testimonials = sqlx::query_as::<_, Testimonial>(&format!(
        "SELECT {} FROM testimonials WHERE is_active = true ORDER BY created_at DESC",
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<TestimonialResource> = testimonials
        .into_iter()
        .map(|t| TestimonialResource::new(t, &base))
        .collect();

    Ok(response::ok(data))
}

/// GET /api/v1/admin/testimonials
pub async fn admin_index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let testimonials = sqlx::query_as::<_, Testimonial>(&format!(
        "SELECT {} FROM testimonials ORDER BY created_at DESC",
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<TestimonialResource> = testimonials
        .into_iter()
        .map(|t| TestimonialResource::new(t, &base))
        .collect();

    Ok(response::ok(data))
}

/// GET /api/v1/testimonials/{id}
pub async fn show(base: BaseUrl, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Testimonial")?;

    let testimonial = fetch_testimonial(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Testimonial"))?;

    Ok(response::ok(TestimonialResource::new(testimonial, &base)))
}

/// POST /api/v1/testimonials - public submission, always inactive
pub async fn store_public(
    base: BaseUrl,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let form = FormData::read(multipart).await?;
    let payload = validate_payload(&form)?;

    let image = match form.file("image") {
        Some(file) => Some(storage::store_image("testimonials", file, false).await?),
        None => None,
    };

    let requested = form.first("is_active").and_then(|v| match v {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    });
    let testimonial =
        insert(pool.as_ref(), payload, image, activation_for(false, requested)).await?;

    Ok(response::created_with_message(
        TestimonialResource::new(testimonial, &base),
        "Testimonial submitted successfully! It will be reviewed before publishing.",
    ))
}

/// POST /api/v1/admin/testimonials - honors is_active, defaults to true
pub async fn store(base: BaseUrl, multipart: Multipart) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let form = FormData::read(multipart).await?;
    let payload = validate_payload(&form)?;

    let mut errors = FieldErrors::new();
    let is_active = validate::parse_bool(&mut errors, "is_active", form.first("is_active"));
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let image = match form.file("image") {
        Some(file) => Some(storage::store_image("testimonials", file, false).await?),
        None => None,
    };

    let testimonial =
        insert(pool.as_ref(), payload, image, activation_for(true, is_active)).await?;

    Ok(response::created(TestimonialResource::new(testimonial, &base)))
}

/// PUT /api/v1/admin/testimonials/{id} - partial update
pub async fn update(
    base: BaseUrl,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Testimonial")?;
    let form = FormData::read(multipart).await?;

    let existing = fetch_testimonial(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Testimonial"))?;

    let mut errors = FieldErrors::new();
    let name = if form.has("name") {
        validate::required_str(&mut errors, "name", form.first("name"), Some(255))
    } else {
        None
    };
    let position =
        validate::optional_str(&mut errors, "position", form.first("position"), Some(255));
    let company = validate::optional_str(&mut errors, "company", form.first("company"), Some(255));
    let content = if form.has("content") {
        validate::required_str(&mut errors, "content", form.first("content"), None)
    } else {
        None
    };
    let rating_raw = validate::parse_int(&mut errors, "rating", form.first("rating"));
    let rating = validate::check_rating(&mut errors, "rating", rating_raw);
    let is_active = validate::parse_bool(&mut errors, "is_active", form.first("is_active"));
    storage::validate_image(&mut errors, "image", form.file("image"), false);

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let image = match form.file("image") {
        Some(file) => {
            if let Some(old) = &existing.image {
                storage::delete_blob(old).await;
            }
            Some(storage::store_image("testimonials", file, false).await?)
        }
        None => existing.image,
    };

    let testimonial = sqlx::query_as::<_, Testimonial>(&format!(
        r#"UPDATE testimonials
           SET name = $1, position = $2, company = $3, content = $4, image = $5,
               rating = $6, is_active = $7, updated_at = now()
           WHERE id = $8
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(name.unwrap_or(existing.name))
    .bind(position.or(existing.position))
    .bind(company.or(existing.company))
    .bind(content.unwrap_or(existing.content))
    .bind(&image)
    .bind(rating.or(existing.rating))
    .bind(is_active.unwrap_or(existing.is_active))
    .bind(id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::ok(TestimonialResource::new(testimonial, &base)))
}

/// DELETE /api/v1/admin/testimonials/{id}
pub async fn destroy(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Testimonial")?;

    let testimonial = fetch_testimonial(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Testimonial"))?;

    if let Some(image) = &testimonial.image {
        storage::delete_blob(image).await;
    }

    sqlx::query("DELETE FROM testimonials WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    Ok(response::ok_message("Testimonial deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_payload_requires_name_and_content() {
        let form = FormData::with_fields(&[("position", "CTO")]);
        let err = validate_payload(&form).unwrap_err();
        match err {
            ApiError::Validation(errors) => {
                assert!(errors.contains_key("name"));
                assert!(errors.contains_key("content"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_payload_checks_rating_range() {
        let form = FormData::with_fields(&[
            ("name", "Jane"),
            ("content", "Great work"),
            ("rating", "6"),
        ]);
        let err = validate_payload(&form).unwrap_err();
        match err {
            ApiError::Validation(errors) => assert!(errors.contains_key("rating")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_payload_accepts_minimal_submission() {
        let form = FormData::with_fields(&[("name", "Jane"), ("content", "Great work")]);
        let validated = validate_payload(&form).unwrap();
        assert_eq!(validated.name, "Jane");
        assert_eq!(validated.rating, None);
    }

    #[test]
    fn test_public_submissions_are_held_for_review() {
        assert!(!activation_for(false, Some(true)));
        assert!(!activation_for(false, Some(false)));
        assert!(!activation_for(false, None));
    }

    #[test]
    fn test_admin_creates_default_to_active() {
        assert!(activation_for(true, None));
        assert!(activation_for(true, Some(true)));
        assert!(!activation_for(true, Some(false)));
    }
}
