/**
 * Article Routes
 * Blog article CRUD with slug-or-id lookup, view counting and SEO metadata.
 * `published_at` is stamped automatically on the unpublished -> published
 * transition when no explicit value is supplied.
 */
use axum::{
    extract::{Multipart, Path},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use sqlx::PgPool;

use crate::db::{self, models::Article};
use crate::error::ApiError;
use crate::forms::FormData;
use crate::response;
use crate::routes::parse_id;
use crate::storage::{self, BaseUrl};
use crate::validate::{self, FieldErrors};

const COLUMNS: &str = "id, title, slug, excerpt, content, featured_image, meta_title, \
    meta_description, meta_keywords, is_published, published_at, views, created_at, updated_at";

lazy_static! {
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$")
        .unwrap_or_else(|e| panic!("invalid slug regex: {}", e));
}

#[derive(Debug, Serialize)]
pub struct ArticleResource {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub featured_image: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArticleResource {
    fn new(article: Article, base: &BaseUrl) -> Self {
        Self {
            id: article.id,
            title: article.title,
            slug: article.slug,
            excerpt: article.excerpt,
            content: article.content,
            featured_image: article
                .featured_image
                .map(|path| storage::public_url(base, &path)),
            meta_title: article.meta_title,
            meta_description: article.meta_description,
            meta_keywords: article.meta_keywords,
            is_published: article.is_published,
            published_at: article.published_at,
            views: article.views,
            created_at: article.created_at,
            updated_at: article.updated_at,
        }
    }
}

fn check_slug_format(errors: &mut FieldErrors, slug: Option<&str>) {
    if let Some(slug) = slug {
        if !SLUG_REGEX.is_match(slug) {
            validate::push(
                errors,
                "slug",
                "The slug may only contain lowercase letters, numbers, and dashes.",
            );
        }
    }
}

/// Slugs are unique; `exclude` skips the record being updated.
async fn check_slug_unique(
    pool: &PgPool,
    errors: &mut FieldErrors,
    slug: Option<&str>,
    exclude: Option<i64>,
) -> Result<(), sqlx::Error> {
    let Some(slug) = slug else { return Ok(()) };
    let (taken,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM articles WHERE slug = $1 AND ($2::bigint IS NULL OR id <> $2))",
    )
    .bind(slug)
    .bind(exclude)
    .fetch_one(pool)
    .await?;
    if taken {
        validate::push(errors, "slug", "The slug has already been taken.");
    }
    Ok(())
}

fn parse_datetime(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    match value.parse::<DateTime<Utc>>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            validate::push(
                errors,
                field,
                &format!("The {} is not a valid date.", field),
            );
            None
        }
    }
}

async fn fetch_article(pool: &PgPool, id: i64) -> Result<Option<Article>, sqlx::Error> {
    sqlx::query_as::<_, Article>(&format!("SELECT {} FROM articles WHERE id = $1", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// GET /api/v1/articles - published articles, newest publication first
pub async fn index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let articles = sqlx::query_as::<_, Article>(&format!(
        "SELECT {} FROM articles WHERE is_published = true \
         ORDER BY published_at DESC, created_at DESC",
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<ArticleResource> = articles
        .into_iter()
        .map(|a| ArticleResource::new(a, &base))
        .collect();

    Ok(response::ok(data))
}

/// GET /api/v1/admin/articles - drafts included
pub async fn admin_index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let articles = sqlx::query_as::<_, Article>(&format!(
        "SELECT {} FROM articles ORDER BY created_at DESC",
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<ArticleResource> = articles
        .into_iter()
        .map(|a| ArticleResource::new(a, &base))
        .collect();

    Ok(response::ok(data))
}

/// GET /api/v1/articles/{slug_or_id} - slug tried first, then numeric id;
/// every successful read bumps the view counter
pub async fn show(
    base: BaseUrl,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let by_slug = sqlx::query_as::<_, Article>(&format!(
        "UPDATE articles SET views = views + 1 WHERE slug = $1 RETURNING {}",
        COLUMNS
    ))
    .bind(&key)
    .fetch_optional(pool.as_ref())
    .await?;

    let article = match by_slug {
        Some(article) => article,
        None => {
            let id = parse_id(&key, "Article")?;
            sqlx::query_as::<_, Article>(&format!(
                "UPDATE articles SET views = views + 1 WHERE id = $1 RETURNING {}",
                COLUMNS
            ))
            .bind(id)
            .fetch_optional(pool.as_ref())
            .await?
            .ok_or(ApiError::NotFound("Article"))?
        }
    };

    Ok(response::ok(ArticleResource::new(article, &base)))
}

/// POST /api/v1/admin/articles
pub async fn store(base: BaseUrl, multipart: Multipart) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let form = FormData::read(multipart).await?;

    let mut errors = FieldErrors::new();
    let title = validate::required_str(&mut errors, "title", form.first("title"), Some(255));
    let slug = validate::required_str(&mut errors, "slug", form.first("slug"), Some(255));
    check_slug_format(&mut errors, slug.as_deref());
    let excerpt = validate::optional_str(&mut errors, "excerpt", form.first("excerpt"), Some(500));
    let content = validate::required_str(&mut errors, "content", form.first("content"), None);
    let meta_title =
        validate::optional_str(&mut errors, "meta_title", form.first("meta_title"), Some(255));
    let meta_description = validate::optional_str(
        &mut errors,
        "meta_description",
        form.first("meta_description"),
        Some(500),
    );
    let meta_keywords = validate::optional_str(
        &mut errors,
        "meta_keywords",
        form.first("meta_keywords"),
        Some(255),
    );
    let is_published = validate::parse_bool(&mut errors, "is_published", form.first("is_published"));
    let published_at = parse_datetime(&mut errors, "published_at", form.first("published_at"));
    storage::validate_image(&mut errors, "featured_image", form.file("featured_image"), false);
    check_slug_unique(pool.as_ref(), &mut errors, slug.as_deref(), None).await?;

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let featured_image = match form.file("featured_image") {
        Some(file) => Some(storage::store_image("articles", file, false).await?),
        None => None,
    };

    let is_published = is_published.unwrap_or(false);
    let published_at = match (is_published, published_at) {
        (true, None) => Some(Utc::now()),
        (_, explicit) => explicit,
    };

    let article = sqlx::query_as::<_, Article>(&format!(
        r#"INSERT INTO articles (title, slug, excerpt, content, featured_image, meta_title,
                                 meta_description, meta_keywords, is_published, published_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(title.unwrap_or_default())
    .bind(slug.unwrap_or_default())
    .bind(&excerpt)
    .bind(content.unwrap_or_default())
    .bind(&featured_image)
    .bind(&meta_title)
    .bind(&meta_description)
    .bind(&meta_keywords)
    .bind(is_published)
    .bind(published_at)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::created(ArticleResource::new(article, &base)))
}

/// PUT /api/v1/admin/articles/{id} - partial update
pub async fn update(
    base: BaseUrl,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Article")?;
    let form = FormData::read(multipart).await?;

    let existing = fetch_article(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Article"))?;

    let mut errors = FieldErrors::new();
    let title = if form.has("title") {
        validate::required_str(&mut errors, "title", form.first("title"), Some(255))
    } else {
        None
    };
    let slug = if form.has("slug") {
        validate::required_str(&mut errors, "slug", form.first("slug"), Some(255))
    } else {
        None
    };
    check_slug_format(&mut errors, slug.as_deref());
    let excerpt = validate::optional_str(&mut errors, "excerpt", form.first("excerpt"), Some(500));
    let content = if form.has("content") {
        validate::required_str(&mut errors, "content", form.first("content"), None)
    } else {
        None
    };
    let meta_title =
        validate::optional_str(&mut errors, "meta_title", form.first("meta_title"), Some(255));
    let meta_description = validate::optional_str(
        &mut errors,
        "meta_description",
        form.first("meta_description"),
        Some(500),
    );
    let meta_keywords = validate::optional_str(
        &mut errors,
        "meta_keywords",
        form.first("meta_keywords"),
        Some(255),
    );
    let is_published = validate::parse_bool(&mut errors, "is_published", form.first("is_published"));
    let published_at = parse_datetime(&mut errors, "published_at", form.first("published_at"));
    storage::validate_image(&mut errors, "featured_image", form.file("featured_image"), false);
    check_slug_unique(pool.as_ref(), &mut errors, slug.as_deref(), Some(id)).await?;

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let featured_image = match form.file("featured_image") {
        Some(file) => {
            if let Some(old) = &existing.featured_image {
                storage::delete_blob(old).await;
            }
            Some(storage::store_image("articles", file, false).await?)
        }
        None => existing.featured_image,
    };

    let new_published = is_published.unwrap_or(existing.is_published);
    let published_at = match published_at {
        Some(explicit) => Some(explicit),
        None if new_published && !existing.is_published => Some(Utc::now()),
        None => existing.published_at,
    };

    let article = sqlx::query_as::<_, Article>(&format!(
        r#"UPDATE articles
           SET title = $1, slug = $2, excerpt = $3, content = $4, featured_image = $5,
               meta_title = $6, meta_description = $7, meta_keywords = $8,
               is_published = $9, published_at = $10, updated_at = now()
           WHERE id = $11
           RETURNING {}"#,
        COLUMNS
    ))
    .bind(title.unwrap_or(existing.title))
    .bind(slug.unwrap_or(existing.slug))
    .bind(excerpt.or(existing.excerpt))
    .bind(content.unwrap_or(existing.content))
    .bind(&featured_image)
    .bind(meta_title.or(existing.meta_title))
    .bind(meta_description.or(existing.meta_description))
    .bind(meta_keywords.or(existing.meta_keywords))
    .bind(new_published)
    .bind(published_at)
    .bind(id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::ok(ArticleResource::new(article, &base)))
}

/// DELETE /api/v1/admin/articles/{id}
pub async fn destroy(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let id = parse_id(&id, "Article")?;

    let article = fetch_article(pool.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound("Article"))?;

    if let Some(image) = &article.featured_image {
        storage::delete_blob(image).await;
    }

    sqlx::query("DELETE FROM articles WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    Ok(response::ok_message("Article deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_format_accepts_kebab_case() {
        for slug in ["hello", "hello-world", "rust-2024-review", "a1-b2"] {
            let mut errors = FieldErrors::new();
            check_slug_format(&mut errors, Some(slug));
            assert!(errors.is_empty(), "slug {:?} should be valid", slug);
        }
    }

    #[test]
    fn test_slug_format_rejects_bad_shapes() {
        for slug in ["Hello", "hello world", "-leading", "trailing-", "double--dash", ""] {
            let mut errors = FieldErrors::new();
            check_slug_format(&mut errors, Some(slug));
            assert!(errors.contains_key("slug"), "slug {:?} should be rejected", slug);
        }
    }

    #[test]
    fn test_parse_datetime_rfc3339() {
        let mut errors = FieldErrors::new();
        let parsed = parse_datetime(&mut errors, "published_at", Some("2024-05-01T10:00:00Z"));
        assert!(parsed.is_some());
        assert!(errors.is_empty());

        let parsed = parse_datetime(&mut errors, "published_at", Some("not-a-date"));
        assert!(parsed.is_none());
        assert!(errors.contains_key("published_at"));
    }

    /// Needs a reachable DATABASE_URL; skipped otherwise.
    #[tokio::test]
    async fn test_show_bumps_view_counter_per_read() {
        if std::env::var("DATABASE_URL").is_err() {
            return;
        }
        let Ok(pool) = crate::db::init_pool(None).await else {
            return;
        };
        if crate::db::run_migrations(pool.as_ref()).await.is_err() {
            return;
        }

        let slug = format!("view-counter-{}", uuid::Uuid::new_v4());
        sqlx::query(
            "INSERT INTO articles (title, slug, content, is_published)
             VALUES ($1, $2, $3, true)",
        )
        .bind("View counter")
        .bind(&slug)
        .bind("body")
        .execute(pool.as_ref())
        .await
        .unwrap();

        let base = BaseUrl("http://localhost:8000".to_string());
        for _ in 0..3 {
            show(base.clone(), Path(slug.clone())).await.unwrap();
        }

        let (views,): (i64,) = sqlx::query_as("SELECT views FROM articles WHERE slug = $1")
            .bind(&slug)
            .fetch_one(pool.as_ref())
            .await
            .unwrap();

        sqlx::query("DELETE FROM articles WHERE slug = $1")
            .bind(&slug)
            .execute(pool.as_ref())
            .await
            .unwrap();

        assert_eq!(views, 3);
    }
}
