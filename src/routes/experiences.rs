/**
 * Experience Routes
 * CRUD API endpoints for work experience entries. A null end date means
 * "current position".
 */
use axum::{extract::Path, response::IntoResponse, Json};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db::{self, models::Experience};
use crate::error::ApiError;
use crate::response;
use crate::routes::parse_id;
use crate::validate::{self, FieldErrors};

const COLUMNS: &str = r#"id, company, position, description, start_date, end_date, location,
    "order", is_active, created_at, updated_at"#;

#[derive(Debug, Serialize)]
pub struct ExperienceResource {
    pub id: i64,
    pub company: String,
    pub position: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_current: bool,
    pub location: Option<String>,
    pub order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Experience> for ExperienceResource {
    fn from(experience: Experience) -> Self {
        Self {
            id: experience.id,
            company: experience.company,
            position: experience.position,
            description: experience.description,
            start_date: experience.start_date,
            is_current: experience.end_date.is_none(),
            end_date: experience.end_date,
            location: experience.location,
            order: experience.order,
            is_active: experience.is_active,
            created_at: experience.created_at,
            updated_at: experience.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExperiencePayload {
    pub company: Option<String>,
    pub position: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub order: Option<i64>,
    pub is_active: Option<bool>,
}

fn check_date_range(errors: &mut FieldErrors, start: Option<NaiveDate>, end: Option<NaiveDate>) {
    if let (Some(start), Some(end)) = (start, end) {
        if end <= start {
            validate::push(
                errors,
                "end_date",
                "The end_date must be a date after start_date.",
            );
        }
    }
}

async fn fetch_experience(pool: &PgPool, id: i64) -> Result<Option<Experience>, sqlx::Error> {
    sqlx::query_as::<_, Experience>(&format!("SELECT {} FROM experiences WHERE id = $1", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// GET /api/v1/experiences - active experiences
pub async fn index() -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let experiences = sqlx::query_as::<_, Experience>(&format!(
        r#"SELECT {} FROM experiences WHERE is_active = true
           ORDER BY "order" ASC, start_date DESC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<ExperienceResource> = experiences.into_iter().map(Into::into).collect();
    Ok(response::ok(data))
}

/// GET /api/v1/admin/experiences
pub async fn admin_index() -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let experiences = sqlx::query_as::<_, Experience>(&format!(
        r#"SELECT {} FROM experiences ORDER BY "order" ASC, start_date DESC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<ExperienceResource> = experiences.into_iter().map(Into::into).collect();
    Ok(response::ok(data))
}

/// GET /api/v1/experiences/{id}
pub async fn show(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Experience")?;

    let experience = fetch_experience(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Experience"))?;

    Ok(response::ok(ExperienceResource::from(experience)))
}

/// POST /api/v1/admin/experiences
pub async fn store(Json(payload): Json<ExperiencePayload>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let mut errors = FieldErrors::new();
    let company =
        validate::required_str(&mut errors, "company", payload.company.as_deref(), Some(255));
    let position =
        validate::required_str(&mut errors, "position", payload.position.as_deref(), Some(255));
    let description =
        validate::optional_str(&mut errors, "description", payload.description.as_deref(), None);
    let start_date = match payload.start_date.as_deref() {
        Some(_) => validate::parse_date(&mut errors, "start_date", payload.start_date.as_deref()),
        None => {
            validate::push(&mut errors, "start_date", "The start_date field is required.");
            None
        }
    };
    let end_date = validate::parse_date(&mut errors, "end_date", payload.end_date.as_deref());
    let location =
        validate::optional_str(&mut errors, "location", payload.location.as_deref(), Some(255));
    let order = validate::check_int32(&mut errors, "order", payload.order);
    check_date_range(&mut errors, start_date, end_date);

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let Some(start_date) = start_date else {
        return Err(ApiError::Internal("validated start_date missing".to_string()));
    };

    let experience = sqlx::query_as::<_, Experience>(&format!(
        r#"INSERT INTO experiences (company, position, description, start_date, end_date,
                                    location, "order")
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(company.unwrap_or_default())
    .bind(position.unwrap_or_default())
    .bind(&description)
    .bind(start_date)
    .bind(end_date)
    .bind(&location)
    .bind(order.unwrap_or(0))
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::created(ExperienceResource::from(experience)))
}

/// PUT /api/v1/admin/experiences/{id} - partial update; the date-range rule
/// is checked against the merged values
pub async fn update(
    Path(id): Path<String>,
    Json(payload): Json<ExperiencePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Experience")?;

    let existing = fetch_experience(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Experience"))?;

    let mut errors = FieldErrors::new();
    let company = if payload.company.is_some() {
        validate::required_str(&mut errors, "company", payload.company.as_deref(), Some(255))
    } else {
        None
    };
    let position = if payload.position.is_some() {
        validate::required_str(&mut errors, "position", payload.position.as_deref(), Some(255))
    } else {
        None
    };
    let description =
        validate::optional_str(&mut errors, "description", payload.description.as_deref(), None);
    let start_date =
        validate::parse_date(&mut errors, "start_date", payload.start_date.as_deref());
    let end_date = validate::parse_date(&mut errors, "end_date", payload.end_date.as_deref());
    let location =
        validate::optional_str(&mut errors, "location", payload.location.as_deref(), Some(255));
    let order = validate::check_int32(&mut errors, "order", payload.order);

    let merged_start = start_date.unwrap_or(existing.start_date);
    let merged_end = end_date.or(existing.end_date);
    check_date_range(&mut errors, Some(merged_start), merged_end);

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let experience = sqlx::query_as::<_, Experience>(&format!(
        r#"UPDATE experiences
           SET company = $1, position = $2, description = $3, start_date = $4,
               end_date = $5, location = $6, "order" = $7, is_active = $8,
               updated_at = now()
           WHERE id = $9
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(company.unwrap_or(existing.company))
    .bind(position.unwrap_or(existing.position))
    .bind(description.or(existing.description))
    .bind(merged_start)
    .bind(merged_end)
    .bind(location.or(existing.location))
    .bind(order.unwrap_or(existing.order))
    .bind(payload.is_active.unwrap_or(existing.is_active))
    .bind(id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::ok(ExperienceResource::from(experience)))
}

/// DELETE /api/v1/admin/experiences/{id}
pub async fn destroy(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Experience")?;

    fetch_experience(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Experience"))?;

    sqlx::query("DELETE FROM experiences WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    Ok(response::ok_message("Experience deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_date_must_follow_start_date() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();

        let mut errors = FieldErrors::new();
        check_date_range(&mut errors, Some(start), Some(start));
        assert!(errors.contains_key("end_date"));

        let mut errors = FieldErrors::new();
        let end = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        check_date_range(&mut errors, Some(start), Some(end));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_open_ended_range_is_current_position() {
        let mut errors = FieldErrors::new();
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        check_date_range(&mut errors, Some(start), None);
        assert!(errors.is_empty());
    }
}
