/**
 * Setting Routes
 * Key/value site settings. The public surface exposes a flat key -> shaped
 * value map; admins replace entries in bulk through a single multipart PUT.
 */
use axum::{extract::Multipart, extract::Path, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::db::{self, models::Setting};
use crate::error::ApiError;
use crate::forms::FormData;
use crate::response;
use crate::storage::{self, BaseUrl};
use crate::validate::{self, FieldErrors};

const COLUMNS: &str =
    r#"id, key, value, type, "group", description, created_at, updated_at"#;

const KINDS: &[&str] = &["text", "textarea", "image", "file", "json"];

#[derive(Debug, Serialize)]
pub struct SettingResource {
    pub id: i64,
    pub key: String,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub group: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettingResource {
    fn new(setting: Setting, base: &BaseUrl) -> Self {
        let value = shape_value(&setting.kind, setting.value, base);
        Self {
            id: setting.id,
            key: setting.key,
            value,
            kind: setting.kind,
            group: setting.group,
            description: setting.description,
            created_at: setting.created_at,
            updated_at: setting.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub group: Option<String>,
}

/// image/file values are stored as relative paths and exposed as URLs;
/// json values pass through as the raw string.
fn shape_value(kind: &str, value: Option<String>, base: &BaseUrl) -> Option<String> {
    match kind {
        "image" | "file" => value.map(|path| storage::public_url(base, &path)),
        _ => value,
    }
}

/// GET /api/v1/settings - flat map of every setting, grouped ordering
pub async fn index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let settings = sqlx::query_as::<_, Setting>(&format!(
        r#"SELECT {} FROM settings ORDER BY "group" ASC, key ASC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let mut map = Map::new();
    for setting in settings {
        let value = shape_value(&setting.kind, setting.value, &base);
        map.insert(
            setting.key,
            value.map(Value::String).unwrap_or(Value::Null),
        );
    }

    Ok(response::ok(Value::Object(map)))
}

/// GET /api/v1/settings/{key}
pub async fn show(base: BaseUrl, Path(key): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let setting = sqlx::query_as::<_, Setting>(&format!(
        "SELECT {} FROM settings WHERE key = $1",
        COLUMNS
    ))
    .bind(&key)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or(ApiError::NotFound("Setting"))?;

    Ok(response::ok(SettingResource::new(setting, &base)))
}

/// GET /api/v1/admin/settings - full rows for the admin panel
pub async fn admin_index(base: BaseUrl) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;

    let settings = sqlx::query_as::<_, Setting>(&format!(
        r#"SELECT {} FROM settings ORDER BY "group" ASC, key ASC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<SettingResource> = settings
        .into_iter()
        .map(|s| SettingResource::new(s, &base))
        .collect();

    Ok(response::ok(data))
}

fn parse_entries(raw: Option<&str>) -> Result<Vec<SettingEntry>, ApiError> {
    let mut errors = FieldErrors::new();
    let Some(raw) = raw else {
        validate::push(&mut errors, "settings", "The settings field is required.");
        return Err(ApiError::Validation(errors));
    };
    match serde_json::from_str::<Vec<SettingEntry>>(raw) {
        Ok(entries) => Ok(entries),
        Err(_) => {
            validate::push(
                &mut errors,
                "settings",
                "The settings field must be a JSON array of objects.",
            );
            Err(ApiError::Validation(errors))
        }
    }
}

/// Per-entry checks short of file validation: key present, known type, and
/// json values must parse. The batch stops at the first failure, leaving
/// earlier upserts applied.
fn validate_entry(entry: &SettingEntry) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if entry.key.trim().is_empty() {
        validate::push(&mut errors, "settings", "Every setting entry needs a key.");
    }
    if let Some(kind) = &entry.kind {
        if !KINDS.contains(&kind.as_str()) {
            validate::push(
                &mut errors,
                &format!("settings.{}", entry.key),
                "The selected type is invalid.",
            );
        }
    }
    if entry.kind.as_deref() == Some("json") {
        if let Some(value) = entry.value.as_deref() {
            if serde_json::from_str::<Value>(value).is_err() {
                validate::push(
                    &mut errors,
                    &format!("settings.{}", entry.key),
                    "The value must be valid JSON.",
                );
            }
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok(())
}

async fn current_value(pool: &PgPool, key: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(value,)| value))
}

async fn upsert(pool: &PgPool, entry: &SettingEntry, value: Option<&str>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO settings (key, value, type, "group")
           VALUES ($1, $2, $3, $4)
           ON CONFLICT (key) DO UPDATE
           SET value = EXCLUDED.value, type = EXCLUDED.type,
               "group" = EXCLUDED."group", updated_at = now()"#,
    )
    .bind(&entry.key)
    .bind(value)
    .bind(entry.kind.as_deref().unwrap_or("text"))
    .bind(entry.group.as_deref().unwrap_or("general"))
    .execute(pool)
    .await?;
    Ok(())
}

/// PUT /api/v1/admin/settings - bulk upsert. Entries are applied in order;
/// a bad entry stops the batch but earlier upserts stay applied.
pub async fn update(base: BaseUrl, multipart: Multipart) -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let form = FormData::read(multipart).await?;

    let entries = parse_entries(form.first("settings"))?;

    for entry in &entries {
        validate_entry(entry)?;
        let kind = entry.kind.as_deref().unwrap_or("text");

        match kind {
            "image" | "file" => {
                let part_name = format!("settings.{}", entry.key);
                if let Some(file) = form.file(&part_name) {
                    let mut errors = FieldErrors::new();
                    if kind == "image" {
                        storage::validate_image(&mut errors, &part_name, Some(file), true);
                    } else {
                        storage::validate_file(&mut errors, &part_name, Some(file));
                    }
                    if !errors.is_empty() {
                        return Err(ApiError::Validation(errors));
                    }

                    if let Some(old) = current_value(pool.as_ref(), &entry.key).await? {
                        storage::delete_blob(&old).await;
                    }
                    let stored = storage::store_blob("settings", file).await?;
                    upsert(pool.as_ref(), entry, Some(&stored)).await?;
                } else {
                    upsert(pool.as_ref(), entry, entry.value.as_deref()).await?;
                }
            }
            _ => upsert(pool.as_ref(), entry, entry.value.as_deref()).await?,
        }
    }

    let settings = sqlx::query_as::<_, Setting>(&format!(
        r#"SELECT {} FROM settings ORDER BY "group" ASC, key ASC"#,
        COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    let data: Vec<SettingResource> = settings
        .into_iter()
        .map(|s| SettingResource::new(s, &base))
        .collect();

    Ok(response::ok_with_message(data, "Settings updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BaseUrl {
        BaseUrl("http://localhost:8000".to_string())
    }

    #[test]
    fn test_shape_value_per_kind() {
        let shaped = shape_value("image", Some("settings/logo.png".to_string()), &base());
        assert_eq!(
            shaped.as_deref(),
            Some("http://localhost:8000/storage/settings/logo.png")
        );

        let raw = r#"{"a":1}"#;
        let shaped = shape_value("json", Some(raw.to_string()), &base());
        assert_eq!(shaped.as_deref(), Some(raw));

        let shaped = shape_value("text", Some("hello".to_string()), &base());
        assert_eq!(shaped.as_deref(), Some("hello"));

        assert_eq!(shape_value("image", None, &base()), None);
    }

    #[test]
    fn test_parse_entries_rejects_non_array() {
        assert!(parse_entries(None).is_err());
        assert!(parse_entries(Some("not json")).is_err());
        assert!(parse_entries(Some(r#"{"key":"a"}"#)).is_err());

        let entries =
            parse_entries(Some(r#"[{"key":"site_name","value":"Portfolio"}]"#)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "site_name");
    }

    #[test]
    fn test_validate_entry_rejects_unknown_kind() {
        let entry = SettingEntry {
            key: "site_name".to_string(),
            value: None,
            kind: Some("blob".to_string()),
            group: None,
        };
        assert!(validate_entry(&entry).is_err());

        let entry = SettingEntry {
            key: "site_name".to_string(),
            value: None,
            kind: Some("textarea".to_string()),
            group: None,
        };
        assert!(validate_entry(&entry).is_ok());
    }

    #[test]
    fn test_validate_entry_requires_parseable_json_value() {
        let entry = SettingEntry {
            key: "social_links".to_string(),
            value: Some("{not json".to_string()),
            kind: Some("json".to_string()),
            group: None,
        };
        assert!(validate_entry(&entry).is_err());

        let entry = SettingEntry {
            key: "social_links".to_string(),
            value: Some(r#"{"github":"https://github.com/x"}"#.to_string()),
            kind: Some("json".to_string()),
            group: None,
        };
        assert!(validate_entry(&entry).is_ok());
    }

    /// Entries are applied one at a time in order; a bad entry stops the
    /// batch and everything before it stays applied.
    #[test]
    fn test_batch_stops_at_first_invalid_entry() {
        let entries = parse_entries(Some(
            r#"[
                {"key": "site_name", "value": "Portfolio"},
                {"key": "social_links", "value": "{\"github\": \"x\"}", "type": "json"},
                {"key": "broken", "value": "{not json", "type": "json"},
                {"key": "never_reached", "value": "skipped"}
            ]"#,
        ))
        .unwrap();

        let mut applied = Vec::new();
        let mut failure = None;
        for entry in &entries {
            match validate_entry(entry) {
                Ok(()) => applied.push(entry.key.as_str()),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        assert_eq!(applied, ["site_name", "social_links"]);
        match failure {
            Some(ApiError::Validation(errors)) => {
                assert!(errors.contains_key("settings.broken"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }
}
