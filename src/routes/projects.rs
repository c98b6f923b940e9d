/**
 * Project Routes
 * CRUD API endpoints for portfolio projects, including the
 * project <-> technology association (replace-in-full on every sync)
 */
use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::db::{self, models::Project};
use crate::error::ApiError;
use crate::forms::FormData;
use crate::response;
use crate::routes::parse_id;
use crate::routes::technologies::TechnologyResource;
use crate::storage::{self, BaseUrl};
use crate::validate::{self, FieldErrors};

const COLUMNS: &str =
    r#"id, name, descriptions, tipe, library, image, link, "order", is_active, created_at, updated_at"#;

#[derive(Debug, Serialize)]
pub struct ProjectResource {
    pub id: i64,
    pub name: String,
    pub descriptions: String,
    pub tipe: String,
    pub library: serde_json::Value,
    pub image: Option<String>,
    pub link: Option<String>,
    pub order: i32,
    pub is_active: bool,
    pub technologies: Vec<TechnologyResource>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectResource {
    fn new(project: Project, technologies: Vec<TechnologyResource>, base: &BaseUrl) -> Self {
        Self {
            id: project.id,
            name: project.name,
            descriptions: project.descriptions,
            tipe: project.tipe,
            library: project.library,
            image: project.image.map(|path| storage::public_url(base, &path)),
            link: project.link,
            order: project.order,
            is_active: project.is_active,
            technologies,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

/// Flat row for the join-table load.
#[derive(Debug, FromRow)]
struct LinkedTechnology {
    project_id: i64,
    id: i64,
    name: String,
    icon: Option<String>,
    order: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Load the technology association for a set of projects in one query.
async fn technologies_for(
    pool: &PgPool,
    project_ids: &[i64],
    base: &BaseUrl,
) -> Result<HashMap<i64, Vec<TechnologyResource>>, sqlx::Error> {
    let mut grouped: HashMap<i64, Vec<TechnologyResource>> = HashMap::new();
    if project_ids.is_empty() {
        return Ok(grouped);
    }

    let rows = sqlx::query_as::<_, LinkedTechnology>(
        r#"
        SELECT pt.project_id, t.id, t.name, t.icon, t."order", t.is_active,
               t.created_at, t.updated_at
        FROM project_technology pt
        JOIN technologies t ON t.id = pt.technology_id
        WHERE pt.project_id = ANY($1)
        ORDER BY t."order" ASC, t.created_at DESC
        "#,
    )
    .bind(project_ids.to_vec())
    .fetch_all(pool)
    .await?;

    for row in rows {
        grouped
            .entry(row.project_id)
            .or_default()
            .push(TechnologyResource {
                id: row.id,
                name: row.name,
                icon: row.icon.map(|path| storage::public_url(base, &path)),
                order: row.order,
                is_active: row.is_active,
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
    }

    Ok(grouped)
}

async fn shape_all(
    pool: &PgPool,
    projects: Vec<Project>,
    base: &BaseUrl,
) -> Result<Vec<ProjectResource>, sqlx::Error> {
    let ids: Vec<i64> = projects.iter().map(|p| p.id).collect();
    let mut linked = technologies_for(pool, &ids, base).await?;

    Ok(projects
        .into_iter()
        .map(|p| {
            let technologies = linked.remove(&p.id).unwrap_or_default();
            ProjectResource::new(p, technologies, base)
        })
        .collect())
}

async fn shape_one(
    pool: &PgPool,
    project: Project,
    base: &BaseUrl,
) -> Result<ProjectResource, sqlx::Error> {
    let mut linked = technologies_for(pool, &[project.id], base).await?;
    let technologies = linked.remove(&project.id).unwrap_or_default();
    Ok(ProjectResource::new(project, technologies, base))
}

async fn fetch_project(pool: &PgPool, id: i64) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(&format!("SELECT {} FROM projects WHERE id = $1", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

// ============================================================================
// Validation
// ============================================================================

fn parse_technology_ids(errors: &mut FieldErrors, form: &FormData) -> Option<Vec<i64>> {
    let raw = form.list("technology_ids")?;
    let mut ids = Vec::with_capacity(raw.len());
    for value in &raw {
        match value.trim().parse::<i64>() {
            Ok(id) => ids.push(id),
            Err(_) => {
                validate::push(
                    errors,
                    "technology_ids",
                    "The selected technology_ids is invalid.",
                );
                return None;
            }
        }
    }
    Some(ids)
}

/// Every referenced technology id must exist; one bad id fails the request.
async fn check_technologies_exist(
    pool: &PgPool,
    errors: &mut FieldErrors,
    ids: &[i64],
) -> Result<(), sqlx::Error> {
    if ids.is_empty() {
        return Ok(());
    }
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(DISTINCT id) FROM technologies WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .fetch_one(pool)
            .await?;

    let distinct: std::collections::HashSet<i64> = ids.iter().copied().collect();
    if count != distinct.len() as i64 {
        validate::push(
            errors,
            "technology_ids",
            "The selected technology_ids is invalid.",
        );
    }
    Ok(())
}

fn required_library(errors: &mut FieldErrors, form: &FormData) -> Option<Vec<String>> {
    match form.list("library") {
        Some(list) if !list.is_empty() && list.iter().any(|v| !v.trim().is_empty()) => Some(
            list.into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
        ),
        _ => {
            validate::push(errors, "library", "The library field is required.");
            None
        }
    }
}

/// Replace-in-full association sync, in one transaction.
async fn sync_technologies(pool: &PgPool, project_id: i64, ids: &[i64]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM project_technology WHERE project_id = $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    for technology_id in ids {
        sqlx::query(
            "INSERT INTO project_technology (project_id, technology_id)
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(project_id)
        .bind(technology_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/projects - active projects with technologies loaded
pub async fn index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let projects = sqlx::query_as::<_, Project>(&format!(
        r#"SELECT {} FROM projects WHERE is_active = true
           ORDER BY "order" ASC, created_at DESC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data = shape_all(pool.as_ref(), projects, &base).await?;
    Ok(response::ok(data))
}

/// GET /api/v1/admin/projects - all projects, same ordering
pub async fn admin_index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let projects = sqlx::query_as::<_, Project>(&format!(
        r#"SELECT {} FROM projects ORDER BY "order" ASC, created_at DESC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data = shape_all(pool.as_ref(), projects, &base).await?;
    Ok(response::ok(data))
}

/// GET /api/v1/projects/{id}
pub async fn show(base: BaseUrl, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Project")?;

    let project = fetch_project(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Project"))?;

    let data = shape_one(pool.as_ref(), project, &base).await?;
    Ok(response::ok(data))
}

/// POST /api/v1/admin/projects
pub async fn store(base: BaseUrl, multipart: Multipart) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let form = FormData::read(multipart).await?;

    let mut errors = FieldErrors::new();
    let name = validate::required_str(&mut errors, "name", form.first("name"), Some(255));
    let descriptions =
        validate::required_str(&mut errors, "descriptions", form.first("descriptions"), None);
    let tipe = validate::required_str(&mut errors, "tipe", form.first("tipe"), Some(255));
    let library = required_library(&mut errors, &form);
    let link = validate::optional_url(&mut errors, "link", form.first("link"), 500);
    let order = validate::parse_int32(&mut errors, "order", form.first("order"));
    storage::validate_image(&mut errors, "image", form.file("image"), false);
    let technology_ids = parse_technology_ids(&mut errors, &form);
    if let Some(ids) = &technology_ids {
        check_technologies_exist(pool.as_ref(), &mut errors, ids).await?;
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let image = match form.file("image") {
        Some(file) => Some(storage::store_image("projects", file, false).await?),
        None => None,
    };

    let project = sqlx::query_as::<_, Project>(&format!(
        r#"INSERT INTO projects (name, descriptions, tipe, library, image, link, "order")
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(name.unwrap_or_default())
    .bind(descriptions.unwrap_or_default())
    .bind(tipe.unwrap_or_default())
    .bind(serde_json::json!(library.unwrap_or_default()))
    .bind(&image)
    .bind(&link)
    .bind(order.unwrap_or(0))
    .fetch_one(pool.as_ref())
    .await?;

    if let Some(ids) = &technology_ids {
        sync_technologies(pool.as_ref(), project.id, ids).await?;
    }

    let data = shape_one(pool.as_ref(), project, &base).await?;
    Ok(response::created(data))
}

/// PUT /api/v1/admin/projects/{id} - partial update; the technology
/// association is replaced in full whenever `technology_ids` is present
pub async fn update(
    base: BaseUrl,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Project")?;
    let form = FormData::read(multipart).await?;

    let existing = fetch_project(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Project"))?;

    let mut errors = FieldErrors::new();
    let name = if form.has("name") {
        validate::required_str(&mut errors, "name", form.first("name"), Some(255))
    } else {
        None
    };
    let descriptions = if form.has("descriptions") {
        validate::required_str(&mut errors, "descriptions", form.first("descriptions"), None)
    } else {
        None
    };
    let tipe = if form.has("tipe") {
        validate::required_str(&mut errors, "tipe", form.first("tipe"), Some(255))
    } else {
        None
    };
    let library = if form.has("library") {
        required_library(&mut errors, &form)
    } else {
        None
    };
    let link = validate::optional_url(&mut errors, "link", form.first("link"), 500);
    let order = validate::parse_int32(&mut errors, "order", form.first("order"));
    let is_active = validate::parse_bool(&mut errors, "is_active", form.first("is_active"));
    storage::validate_image(&mut errors, "image", form.file("image"), false);
    let technology_ids = parse_technology_ids(&mut errors, &form);
    if let Some(ids) = &technology_ids {
        check_technologies_exist(pool.as_ref(), &mut errors, ids).await?;
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    // Delete-old-then-store-new; not transactional with the row write.
    let image = match form.file("image") {
        Some(file) => {
            if let Some(old) = &existing.image {
                storage::delete_blob(old).await;
            }
            Some(storage::store_image("projects", file, false).await?)
        }
        None => existing.image,
    };

    let library_json = library
        .map(|l| serde_json::json!(l))
        .unwrap_or(existing.library);

    let project = sqlx::query_as::<_, Project>(&format!(
        r#"UPDATE projects
           SET name = $1, descriptions = $2, tipe = $3, library = $4, image = $5,
               link = $6, "order" = $7, is_active = $8, updated_at = now()
           WHERE id = $9
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(name.unwrap_or(existing.name))
    .bind(descriptions.unwrap_or(existing.descriptions))
    .bind(tipe.unwrap_or(existing.tipe))
    .bind(library_json)
    .bind(&image)
    .bind(link.or(existing.link))
    .bind(order.unwrap_or(existing.order))
    .bind(is_active.unwrap_or(existing.is_active))
    .bind(id)
    .fetch_one(pool.as_ref())
    .await?;

    if let Some(ids) = &technology_ids {
        sync_technologies(pool.as_ref(), project.id, ids).await?;
    }

    let data = shape_one(pool.as_ref(), project, &base).await?;
    Ok(response::ok(data))
}

/// DELETE /api/v1/admin/projects/{id} - blob first (best effort), then row
pub async fn destroy(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Project")?;

    let project = fetch_project(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Project"))?;

    if let Some(image) = &project.image {
        storage::delete_blob(image).await;
    }

    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    Ok(response::ok_message("Project deleted successfully"))
}
