//! Uniform success envelope: `{ "success": bool, "data"?, "message"? }`.

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn ok<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            data: Some(data),
            message: None,
        }),
    )
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (
        StatusCode::CREATED,
        Json(Envelope {
            success: true,
            data: Some(data),
            message: None,
        }),
    )
}

pub fn created_with_message<T: Serialize>(
    data: T,
    message: &str,
) -> (StatusCode, Json<Envelope<T>>) {
    (
        StatusCode::CREATED,
        Json(Envelope {
            success: true,
            data: Some(data),
            message: Some(message.to_string()),
        }),
    )
}

pub fn ok_with_message<T: Serialize>(data: T, message: &str) -> (StatusCode, Json<Envelope<T>>) {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            data: Some(data),
            message: Some(message.to_string()),
        }),
    )
}

pub fn ok_message(message: &str) -> (StatusCode, Json<Envelope<serde_json::Value>>) {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            data: None,
            message: Some(message.to_string()),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_shape() {
        let (status, Json(envelope)) = ok(serde_json::json!({ "id": 1 }));
        assert_eq!(status, StatusCode::OK);
        assert!(envelope.success);
        let text = serde_json::to_string(&envelope).unwrap();
        assert!(text.contains("\"data\""));
        assert!(!text.contains("\"message\""));
    }

    #[test]
    fn test_ok_message_skips_data() {
        let (status, Json(envelope)) = ok_message("Project deleted successfully");
        assert_eq!(status, StatusCode::OK);
        let text = serde_json::to_string(&envelope).unwrap();
        assert!(!text.contains("\"data\""));
        assert!(text.contains("Project deleted successfully"));
    }

    #[test]
    fn test_created_status() {
        let (status, _) = created(serde_json::json!([]));
        assert_eq!(status, StatusCode::CREATED);
    }
}
