//! Field validation helpers.
//!
//! Each entity handler declares its constraints by calling these against an
//! accumulating [`FieldErrors`] map, then bails with
//! `ApiError::Validation(errors)` before touching storage. Messages follow
//! the "The {field} ..." wording the admin UI already displays.

use std::collections::BTreeMap;

use chrono::NaiveDate;

pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub fn push(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

fn check_max(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        push(
            errors,
            field,
            &format!("The {} may not be greater than {} characters.", field, max),
        );
    }
}

/// Required non-empty string, optionally length-capped.
pub fn required_str(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max: Option<usize>,
) -> Option<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => {
            if let Some(max) = max {
                check_max(errors, field, v, max);
            }
            Some(v.to_string())
        }
        _ => {
            push(errors, field, &format!("The {} field is required.", field));
            None
        }
    }
}

/// Optional string; empty input counts as absent.
pub fn optional_str(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max: Option<usize>,
) -> Option<String> {
    let v = value.map(str::trim).filter(|v| !v.is_empty())?;
    if let Some(max) = max {
        check_max(errors, field, v, max);
    }
    Some(v.to_string())
}

pub fn optional_url(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Option<String> {
    let v = optional_str(errors, field, value, Some(max))?;
    if !v.starts_with("http://") && !v.starts_with("https://") {
        push(errors, field, &format!("The {} format is invalid.", field));
        return None;
    }
    Some(v)
}

pub fn required_email(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Option<String> {
    let v = required_str(errors, field, value, Some(max))?;
    let valid = match v.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if !valid {
        push(
            errors,
            field,
            &format!("The {} must be a valid email address.", field),
        );
        return None;
    }
    Some(v)
}

/// Parse an optional integer from its form-field string.
pub fn parse_int(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<i64> {
    let v = value.map(str::trim).filter(|v| !v.is_empty())?;
    match v.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => {
            push(
                errors,
                field,
                &format!("The {} must be an integer.", field),
            );
            None
        }
    }
}

/// Parse an optional boolean from its form-field string ("1"/"0"/"true"/"false").
pub fn parse_bool(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<bool> {
    let v = value.map(str::trim).filter(|v| !v.is_empty())?;
    match v {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => {
            push(
                errors,
                field,
                &format!("The {} field must be true or false.", field),
            );
            None
        }
    }
}

pub fn parse_date(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<NaiveDate> {
    let v = value.map(str::trim).filter(|v| !v.is_empty())?;
    match NaiveDate::parse_from_str(v, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            push(
                errors,
                field,
                &format!("The {} is not a valid date.", field),
            );
            None
        }
    }
}

/// Reject values that do not fit the column's INTEGER range instead of
/// silently truncating them.
pub fn check_int32(errors: &mut FieldErrors, field: &str, value: Option<i64>) -> Option<i32> {
    let v = value?;
    match i32::try_from(v) {
        Ok(n) => Some(n),
        Err(_) => {
            push(
                errors,
                field,
                &format!(
                    "The {} must be between {} and {}.",
                    field,
                    i32::MIN,
                    i32::MAX
                ),
            );
            None
        }
    }
}

/// Parse an optional form-field integer that must fit an INTEGER column.
pub fn parse_int32(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<i32> {
    let v = parse_int(errors, field, value);
    check_int32(errors, field, v)
}

pub fn check_rating(errors: &mut FieldErrors, field: &str, value: Option<i64>) -> Option<i32> {
    let v = value?;
    if !(1..=5).contains(&v) {
        push(errors, field, "The rating must be between 1 and 5.");
        return None;
    }
    Some(v as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_str_rejects_missing_and_empty() {
        let mut errors = FieldErrors::new();
        assert!(required_str(&mut errors, "name", None, Some(255)).is_none());
        assert!(required_str(&mut errors, "tipe", Some("   "), Some(255)).is_none());
        assert_eq!(errors["name"], vec!["The name field is required."]);
        assert_eq!(errors["tipe"], vec!["The tipe field is required."]);
    }

    #[test]
    fn test_required_str_enforces_max() {
        let mut errors = FieldErrors::new();
        let long = "x".repeat(300);
        assert!(required_str(&mut errors, "name", Some(&long), Some(255)).is_some());
        assert_eq!(
            errors["name"],
            vec!["The name may not be greater than 255 characters."]
        );
    }

    #[test]
    fn test_optional_str_treats_empty_as_absent() {
        let mut errors = FieldErrors::new();
        assert!(optional_str(&mut errors, "location", Some(""), Some(255)).is_none());
        assert!(optional_str(&mut errors, "location", None, Some(255)).is_none());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_optional_url_requires_scheme() {
        let mut errors = FieldErrors::new();
        assert!(optional_url(&mut errors, "link", Some("example.com"), 500).is_none());
        assert_eq!(errors["link"], vec!["The link format is invalid."]);

        let mut errors = FieldErrors::new();
        assert_eq!(
            optional_url(&mut errors, "link", Some("https://example.com/x"), 500).as_deref(),
            Some("https://example.com/x")
        );
    }

    #[test]
    fn test_required_email() {
        let mut errors = FieldErrors::new();
        assert!(required_email(&mut errors, "email", Some("not-an-email"), 255).is_none());
        assert!(required_email(&mut errors, "email", Some("a@b"), 255).is_none());
        assert_eq!(
            required_email(&mut errors, "email", Some("a@b.co"), 255).as_deref(),
            Some("a@b.co")
        );
    }

    #[test]
    fn test_parse_int_and_bool() {
        let mut errors = FieldErrors::new();
        assert_eq!(parse_int(&mut errors, "order", Some("3")), Some(3));
        assert!(parse_int(&mut errors, "order", Some("three")).is_none());
        assert_eq!(parse_bool(&mut errors, "is_active", Some("1")), Some(true));
        assert_eq!(
            parse_bool(&mut errors, "is_active", Some("false")),
            Some(false)
        );
        assert!(parse_bool(&mut errors, "is_active", Some("yes")).is_none());
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_parse_date() {
        let mut errors = FieldErrors::new();
        assert!(parse_date(&mut errors, "start_date", Some("2024-02-30")).is_none());
        assert!(parse_date(&mut errors, "start_date", Some("2024-02-29")).is_some());
    }

    #[test]
    fn test_check_int32_rejects_out_of_range() {
        let mut errors = FieldErrors::new();
        assert_eq!(check_int32(&mut errors, "order", Some(7)), Some(7));
        assert_eq!(check_int32(&mut errors, "order", None), None);
        assert!(errors.is_empty());

        assert!(check_int32(&mut errors, "order", Some(i64::from(i32::MAX) + 1)).is_none());
        assert!(check_int32(&mut errors, "order", Some(i64::from(i32::MIN) - 1)).is_none());
        assert_eq!(errors["order"].len(), 2);
    }

    #[test]
    fn test_parse_int32_rejects_overflow_string() {
        let mut errors = FieldErrors::new();
        assert_eq!(parse_int32(&mut errors, "order", Some("12")), Some(12));
        assert!(parse_int32(&mut errors, "order", Some("9999999999")).is_none());
        assert!(errors.contains_key("order"));
    }

    #[test]
    fn test_check_rating_bounds() {
        let mut errors = FieldErrors::new();
        assert_eq!(check_rating(&mut errors, "rating", Some(5)), Some(5));
        assert!(check_rating(&mut errors, "rating", Some(0)).is_none());
        assert!(check_rating(&mut errors, "rating", Some(6)).is_none());
        assert_eq!(errors["rating"].len(), 2);
    }
}
