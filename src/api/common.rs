//! Common API utilities and shared types
//!
//! Query parameter parsing, JSON bodies and multipart form reading used across
//! endpoints. List endpoints take their query values as raw strings and parse
//! them here, so a malformed value produces the regular `VALIDATION_ERROR` body
//! instead of axum's plain-text rejection. JSON bodies go through [`JsonBody`]
//! for the same reason.

use axum::extract::{FromRequest, Multipart};
use std::collections::HashMap;
use std::str::FromStr;

use crate::api::middleware::ApiError;
use crate::models::{parse_id_list, IdSelector};

// ============================================================================
// Query parameters
// ============================================================================

/// Parse an `id=all|1,2,3` parameter. Absent means all.
pub fn id_selector(value: Option<&str>) -> Result<IdSelector, ApiError> {
    match value {
        None => Ok(IdSelector::All),
        Some(raw) => Ok(raw.parse::<IdSelector>()?),
    }
}

/// Parse an optional comma separated id list; `all` is rejected.
pub fn optional_id_list(value: Option<&str>) -> Result<Option<Vec<i64>>, ApiError> {
    value.map(parse_id_list).transpose().map_err(ApiError::from)
}

/// Parse an optional scalar query parameter.
pub fn optional_param<T: FromStr>(name: &str, value: Option<&str>) -> Result<Option<T>, ApiError> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ApiError::validation_error(format!("Invalid {} value: {:?}", name, raw))),
    }
}

/// Parse a scalar query parameter that must be present.
pub fn required_param<T: FromStr>(name: &str, value: Option<&str>) -> Result<T, ApiError> {
    optional_param(name, value)?
        .ok_or_else(|| ApiError::validation_error(format!("Missing {} parameter", name)))
}

// ============================================================================
// JSON bodies
// ============================================================================

/// `Json` extractor whose rejection is an [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

// ============================================================================
// Multipart forms
// ============================================================================

/// A fully buffered multipart form.
///
/// Parts with a file name are kept as bytes; everything else as text.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
}

impl FormData {
    /// Read every part of `multipart`, rejecting files above `max_file_size`.
    pub async fn read(mut multipart: Multipart, max_file_size: usize) -> Result<Self, ApiError> {
        let mut form = FormData::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name.is_empty() {
                continue;
            }

            if field.file_name().is_some() {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;
                if data.len() > max_file_size {
                    return Err(ApiError::validation_error(format!(
                        "File too large. Maximum size: {} bytes ({} MB)",
                        max_file_size,
                        max_file_size / 1024 / 1024
                    )));
                }
                // Empty file inputs are sent by browsers when nothing was picked.
                if !data.is_empty() {
                    form.files.insert(name, data.to_vec());
                }
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("Failed to read field: {}", e)))?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    /// A text field, `None` when absent or blank.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// A text field that may legitimately be empty.
    pub fn text_or_empty(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    pub fn required_text(&self, name: &str) -> Result<String, ApiError> {
        self.text(name)
            .ok_or_else(|| ApiError::validation_error(format!("{} is required", name)))
    }

    pub fn required_number<T: FromStr>(&self, name: &str) -> Result<T, ApiError> {
        required_param(name, self.text(name).as_deref())
    }

    pub fn optional_number<T: FromStr>(&self, name: &str) -> Result<Option<T>, ApiError> {
        optional_param(name, self.text(name).as_deref())
    }

    pub fn take_file(&mut self, name: &str) -> Option<Vec<u8>> {
        self.files.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_selector_defaults_to_all() {
        assert_eq!(id_selector(None).unwrap(), IdSelector::All);
        assert_eq!(id_selector(Some("3,4")).unwrap(), IdSelector::Ids(vec![3, 4]));
        assert_eq!(id_selector(Some("x")).unwrap_err().status().as_u16(), 400);
    }

    #[test]
    fn test_optional_param() {
        assert_eq!(optional_param::<i64>("level_id", None).unwrap(), None);
        assert_eq!(optional_param::<i64>("level_id", Some(" 2 ")).unwrap(), Some(2));
        assert_eq!(optional_param::<bool>("has_certificate", Some("true")).unwrap(), Some(true));

        let err = optional_param::<i64>("level_id", Some("two")).unwrap_err();
        assert_eq!(err.error.code, "VALIDATION_ERROR");
        assert!(err.error.message.contains("level_id"));
    }

    #[test]
    fn test_required_param_missing() {
        let err = required_param::<i64>("course_id", None).unwrap_err();
        assert!(err.error.message.contains("course_id"));
    }

    #[test]
    fn test_optional_id_list_rejects_all() {
        assert_eq!(optional_id_list(None).unwrap(), None);
        assert_eq!(optional_id_list(Some("1,2")).unwrap(), Some(vec![1, 2]));
        assert!(optional_id_list(Some("all")).is_err());
    }

    #[test]
    fn test_form_text_accessors() {
        let mut form = FormData::default();
        form.fields.insert("Title".to_string(), "  Rust  ".to_string());
        form.fields.insert("Blank".to_string(), "   ".to_string());
        form.fields.insert("Price".to_string(), "12".to_string());

        assert_eq!(form.text("Title").as_deref(), Some("Rust"));
        assert_eq!(form.text("Blank"), None);
        assert_eq!(form.text_or_empty("Blank"), "   ");
        assert_eq!(form.required_number::<i64>("Price").unwrap(), 12);
        assert!(form.required_text("Missing").is_err());
        assert_eq!(form.optional_number::<i64>("Missing").unwrap(), None);
    }
}
