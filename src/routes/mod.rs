/**
 * Routes Module
 * API route handlers
 */

pub mod articles;
pub mod categories;
pub mod certificates;
pub mod experiences;
pub mod guard;
pub mod health;
pub mod messages;
pub mod projects;
pub mod settings;
pub mod technologies;
pub mod testimonials;
pub mod visitors;

use crate::error::ApiError;

/// Path segments arrive as strings; anything that is not a positive integer
/// maps to the entity's 404 so the JSON envelope stays uniform.
pub fn parse_id(raw: &str, entity: &'static str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(ApiError::NotFound(entity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_accepts_positive_integers() {
        assert_eq!(parse_id("42", "Project").unwrap(), 42);
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        for raw in ["abc", "-1", "0", "1.5", ""] {
            assert!(parse_id(raw, "Project").is_err(), "{:?} should 404", raw);
        }
    }
}
