//! Multipart form decoding for the upload-bearing admin endpoints.
//!
//! Text parts are collected by name (a trailing `[]` is stripped so repeated
//! array fields group together); file parts keep their bytes and original
//! filename. Handlers read from the resulting [`FormData`] so the multipart
//! plumbing lives in exactly one place.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::Multipart;

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Bytes,
    pub filename: String,
}

#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = FormData::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Internal(format!("invalid multipart data: {}", e)))?
        {
            let name = match field.name() {
                Some(name) => name.trim_end_matches("[]").to_string(),
                None => continue,
            };

            if field.file_name().is_some() {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Internal(format!("failed to read upload: {}", e)))?;
                form.files.insert(name, UploadedFile { bytes, filename });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Internal(format!("invalid form field: {}", e)))?;
                form.fields.entry(name).or_default().push(value);
            }
        }

        Ok(form)
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// First value of a text field.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values of a repeated field. A single value that parses as a JSON
    /// string array is expanded, so both `library[]=a&library[]=b` and
    /// `library=["a","b"]` arrive the same way.
    pub fn list(&self, name: &str) -> Option<Vec<String>> {
        let values = self.fields.get(name)?;
        if let [single] = values.as_slice() {
            if single.trim_start().starts_with('[') {
                if let Ok(parsed) = serde_json::from_str::<Vec<String>>(single) {
                    return Some(parsed);
                }
            }
        }
        Some(values.clone())
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    #[cfg(test)]
    pub fn with_fields(pairs: &[(&str, &str)]) -> Self {
        let mut form = FormData::default();
        for (name, value) in pairs {
            form.fields
                .entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
        form
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_expands_json_array() {
        let form = FormData::with_fields(&[("library", r#"["react","tailwind"]"#)]);
        assert_eq!(
            form.list("library"),
            Some(vec!["react".to_string(), "tailwind".to_string()])
        );
    }

    #[test]
    fn test_list_keeps_repeated_values() {
        let mut form = FormData::with_fields(&[("library", "react")]);
        form.fields
            .get_mut("library")
            .unwrap()
            .push("tailwind".to_string());
        assert_eq!(
            form.list("library"),
            Some(vec!["react".to_string(), "tailwind".to_string()])
        );
    }

    #[test]
    fn test_list_passes_non_json_value_through() {
        let form = FormData::with_fields(&[("library", "plain text")]);
        assert_eq!(form.list("library"), Some(vec!["plain text".to_string()]));
    }

    #[test]
    fn test_first_and_has() {
        let form = FormData::with_fields(&[("name", "Portfolio")]);
        assert_eq!(form.first("name"), Some("Portfolio"));
        assert!(form.has("name"));
        assert!(!form.has("order"));
        assert!(form.first("order").is_none());
    }
}
