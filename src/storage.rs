//! Local blob store for uploaded files, plus the public `/storage/{path}`
//! serving route and the one place where stored relative paths become
//! absolute URLs.
//!
//! Writes are intentionally not transactional with the owning record:
//! replacement deletes the old blob, stores the new one, then the record is
//! written. A crash in between can orphan a blob or leave a record pointing
//! at a missing file; callers must not rely on atomicity here.

use std::path::{Component, Path as FsPath, PathBuf};

use axum::{
    extract::{FromRequestParts, Path},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::forms::UploadedFile;
use crate::validate::{self, FieldErrors};

const STORAGE_DIR: &str = "storage";
pub const MAX_UPLOAD_SIZE: usize = 2 * 1024 * 1024; // 2MB

/// Sniff the upload's real content type from its leading bytes. Extensions
/// and client-supplied content types are not trusted.
pub fn sniff_image(bytes: &[u8], allow_svg: bool) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ if allow_svg => {
            let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
            let head = head.trim_start();
            if head.starts_with("<svg") || head.starts_with("<?xml") {
                Some("image/svg+xml")
            } else {
                None
            }
        }
        _ => None,
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}

fn content_type_for(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn is_safe_path(path: &str) -> bool {
    if path.contains('\0') || path.contains('\\') {
        return false;
    }
    FsPath::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

/// Validate an optional image upload: must sniff as an allowed image type
/// and fit the size cap. Errors land in the field map.
pub fn validate_image(
    errors: &mut FieldErrors,
    field: &str,
    file: Option<&UploadedFile>,
    allow_svg: bool,
) {
    let Some(file) = file else { return };
    if sniff_image(&file.bytes, allow_svg).is_none() {
        validate::push(errors, field, &format!("The {} must be an image.", field));
    }
    if file.bytes.len() > MAX_UPLOAD_SIZE {
        validate::push(
            errors,
            field,
            &format!("The {} may not be greater than 2048 kilobytes.", field),
        );
    }
}

/// Validate a generic file upload (settings `file` type): size cap only.
pub fn validate_file(errors: &mut FieldErrors, field: &str, file: Option<&UploadedFile>) {
    let Some(file) = file else { return };
    if file.bytes.len() > MAX_UPLOAD_SIZE {
        validate::push(
            errors,
            field,
            &format!("The {} may not be greater than 2048 kilobytes.", field),
        );
    }
}

/// Store an image upload under `{prefix}/`, returning the relative path
/// recorded on the owning row. The extension comes from the sniffed type.
pub async fn store_image(
    prefix: &str,
    file: &UploadedFile,
    allow_svg: bool,
) -> Result<String, ApiError> {
    let mime = sniff_image(&file.bytes, allow_svg)
        .ok_or_else(|| ApiError::Internal("upload is not a recognized image".to_string()))?;
    store_bytes(prefix, &file.bytes, extension_for(mime)).await
}

/// Store an arbitrary file upload, keeping its original extension when it is
/// a plain alphanumeric one.
pub async fn store_blob(prefix: &str, file: &UploadedFile) -> Result<String, ApiError> {
    let ext = file
        .filename
        .rsplit('.')
        .next()
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    store_bytes(prefix, &file.bytes, &ext).await
}

async fn store_bytes(prefix: &str, bytes: &[u8], ext: &str) -> Result<String, ApiError> {
    let dir = PathBuf::from(STORAGE_DIR).join(prefix);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to create upload directory: {}", e)))?;

    let relative = format!("{}/{}.{}", prefix, Uuid::new_v4(), ext);
    let full = PathBuf::from(STORAGE_DIR).join(&relative);
    tokio::fs::write(&full, bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to save upload: {}", e)))?;

    tracing::info!("Stored upload {} ({} bytes)", relative, bytes.len());
    Ok(relative)
}

/// Best-effort blob removal. Record deletes and upload replacements call
/// this first; a failure is logged, never propagated.
pub async fn delete_blob(path: &str) {
    if !is_safe_path(path) {
        tracing::warn!("Refusing to delete suspicious blob path: {}", path);
        return;
    }
    let full = PathBuf::from(STORAGE_DIR).join(path);
    if let Err(e) = tokio::fs::remove_file(&full).await {
        tracing::warn!("Failed to delete blob {}: {}", path, e);
    }
}

// ============================================================================
// URL shaping
// ============================================================================

/// Origin of the inbound request (scheme + authority), with the configured
/// `APP_URL` as fallback when it cannot be determined. Handlers take this as
/// an extractor and pass it into shaping; nothing reads ambient request
/// state from helper code.
#[derive(Debug, Clone)]
pub struct BaseUrl(pub String);

impl BaseUrl {
    fn from_parts(parts: &Parts) -> Self {
        let scheme = parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("http");

        let host = parts
            .headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match host {
            Some(host) => BaseUrl(format!("{}://{}", scheme, host)),
            None => BaseUrl(fallback_origin()),
        }
    }
}

fn fallback_origin() -> String {
    std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

impl<S> FromRequestParts<S> for BaseUrl
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(BaseUrl::from_parts(parts))
    }
}

/// The single place a stored relative path becomes an externally visible
/// URL. Every entity's shaping goes through here so the URL shape is
/// identical across all endpoints.
pub fn public_url(base: &BaseUrl, path: &str) -> String {
    format!("{}/storage/{}", base.0.trim_end_matches('/'), path)
}

// ============================================================================
// /storage/{path} serving
// ============================================================================

const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "GET, OPTIONS"),
    ("access-control-allow-headers", "Content-Type"),
];

/// GET /storage/{*path} - serve a stored blob with permissive CORS and a
/// long-lived cache header.
pub async fn serve(Path(path): Path<String>) -> Response {
    if !is_safe_path(&path) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let full = PathBuf::from(STORAGE_DIR).join(&path);
    match tokio::fs::read(&full).await {
        Ok(bytes) => (
            CORS_HEADERS,
            [
                ("content-type", content_type_for(&path)),
                ("cache-control", "public, max-age=31536000"),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// OPTIONS /storage/{*path} - CORS preflight.
pub async fn preflight() -> Response {
    (
        CORS_HEADERS,
        [("access-control-max-age", "86400")],
        StatusCode::OK,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    fn file(bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            bytes: Bytes::copy_from_slice(bytes),
            filename: "upload.png".to_string(),
        }
    }

    #[test]
    fn test_sniff_image_known_types() {
        assert_eq!(
            sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0], false),
            Some("image/jpeg")
        );
        assert_eq!(
            sniff_image(&[0x89, 0x50, 0x4E, 0x47, 0x0D], false),
            Some("image/png")
        );
        assert_eq!(
            sniff_image(b"GIF89a-data-here", false),
            Some("image/gif")
        );
        assert_eq!(
            sniff_image(b"RIFF\x00\x00\x00\x00WEBPVP8 ", false),
            Some("image/webp")
        );
    }

    #[test]
    fn test_sniff_image_svg_only_when_allowed() {
        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>";
        assert_eq!(sniff_image(svg, true), Some("image/svg+xml"));
        assert_eq!(sniff_image(svg, false), None);
        assert_eq!(sniff_image(b"plain text file", true), None);
    }

    #[test]
    fn test_validate_image_rejects_oversize_and_non_image() {
        let mut errors = FieldErrors::new();
        validate_image(&mut errors, "image", Some(&file(b"not an image")), false);
        assert!(errors.contains_key("image"));

        let mut errors = FieldErrors::new();
        let mut big = vec![0xFF, 0xD8, 0xFF, 0xE0];
        big.resize(MAX_UPLOAD_SIZE + 1, 0);
        validate_image(&mut errors, "image", Some(&file(&big)), false);
        assert_eq!(errors["image"].len(), 1);

        let mut errors = FieldErrors::new();
        validate_image(&mut errors, "image", None, false);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_is_safe_path() {
        assert!(is_safe_path("projects/abc.png"));
        assert!(!is_safe_path("../secrets"));
        assert!(!is_safe_path("/etc/passwd"));
        assert!(!is_safe_path("a\\b"));
    }

    #[test]
    fn test_public_url_shape() {
        let base = BaseUrl("http://localhost:8000".to_string());
        assert_eq!(
            public_url(&base, "projects/abc.png"),
            "http://localhost:8000/storage/projects/abc.png"
        );
        let base = BaseUrl("https://example.com/".to_string());
        assert_eq!(
            public_url(&base, "settings/cv.pdf"),
            "https://example.com/storage/settings/cv.pdf"
        );
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("projects/a.PNG"), "image/png");
        assert_eq!(content_type_for("settings/cv.pdf"), "application/pdf");
        assert_eq!(content_type_for("misc/raw"), "application/octet-stream");
    }
}
