/// Field-level validation for content bodies arriving at the API.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::kind::ContentType;
use super::model::{parse_date, Fields};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationError(pub Vec<FieldError>);

impl ValidationError {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Every required field must be present.
    Create,
    /// Only the fields present in the patch are checked.
    Update,
}

/// Validate a create body or update patch for `content_type`.
pub fn validate_fields(
    content_type: ContentType,
    fields: &Fields,
    mode: ValidationMode,
) -> Result<(), ValidationError> {
    let mut errors = Vec::new();

    for &field in content_type.required_fields() {
        match fields.get(field) {
            None | Some(Value::Null) if mode == ValidationMode::Create => {
                errors.push(FieldError::new(field, format!("{field} is required")));
            }
            Some(Value::Null) => {
                errors.push(FieldError::new(field, format!("{field} cannot be removed")));
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                errors.push(FieldError::new(field, format!("{field} cannot be empty")));
            }
            _ => {}
        }
    }

    for &field in content_type.text_fields() {
        if let Some(value) = fields.get(field) {
            if !value.is_string() && !value.is_null() {
                errors.push(FieldError::new(field, format!("{field} must be a string")));
            }
        }
    }

    for &field in content_type.date_fields() {
        if let Some(Value::String(raw)) = fields.get(field) {
            if !raw.trim().is_empty() && parse_date(raw).is_none() {
                errors.push(FieldError::new(field, format!("{field} must be an ISO-8601 date")));
            }
        }
    }

    for &field in content_type.media_fields() {
        if let Some(value) = fields.get(field) {
            if !value.is_string() && !value.is_null() {
                errors.push(FieldError::new(field, format!("{field} must be a url or path")));
            }
        }
    }

    if let Some(status) = fields.get("status") {
        if !matches!(status.as_str(), Some("draft") | Some("published")) {
            errors.push(FieldError::new("status", "status must be 'draft' or 'published'"));
        }
    }

    if content_type == ContentType::Blogs {
        if let Some(comments) = fields.get("comments") {
            if comments.as_u64().is_none() {
                errors.push(FieldError::new("comments", "comments must be a non-negative integer"));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError(errors))
    }
}

/// Check the typed columns a patch may touch (`title`, `status`), for any
/// content type. Type-specific fields stay free-form.
pub fn validate_patch(patch: &Fields) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    match patch.get("title") {
        Some(Value::Null) => errors.push(FieldError::new("title", "title cannot be removed")),
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(FieldError::new("title", "title cannot be empty"));
        }
        Some(Value::String(_)) | None => {}
        Some(_) => errors.push(FieldError::new("title", "title must be a string")),
    }
    if let Some(status) = patch.get("status") {
        if !matches!(status.as_str(), Some("draft") | Some("published")) {
            errors.push(FieldError::new("status", "status must be 'draft' or 'published'"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_check_covers_typed_columns() {
        assert!(validate_patch(&fields(json!({"status": "published", "speaker": null}))).is_ok());

        let err = validate_patch(&fields(json!({"title": null, "status": "archived"}))).unwrap_err();
        assert_eq!(field_names(&err), vec!["title", "status"]);
        assert_eq!(err.errors()[0].message, "title cannot be removed");

        let err = validate_patch(&fields(json!({"title": 7}))).unwrap_err();
        assert_eq!(err.errors()[0].message, "title must be a string");
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn field_names(err: &ValidationError) -> Vec<&str> {
        err.errors().iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn create_requires_type_specific_fields() {
        let err = validate_fields(
            ContentType::Events,
            &fields(json!({"title": "Picnic"})),
            ValidationMode::Create,
        )
        .unwrap_err();
        assert_eq!(field_names(&err), vec!["date", "location"]);
    }

    #[test]
    fn empty_title_rejected() {
        let err = validate_fields(
            ContentType::Blogs,
            &fields(json!({"title": "  ", "content": "<p>hi</p>"})),
            ValidationMode::Create,
        )
        .unwrap_err();
        assert_eq!(err.errors()[0].message, "title cannot be empty");
    }

    #[test]
    fn update_checks_only_present_fields() {
        assert!(validate_fields(
            ContentType::Sermons,
            &fields(json!({"status": "published"})),
            ValidationMode::Update,
        )
        .is_ok());

        let err = validate_fields(
            ContentType::Sermons,
            &fields(json!({"speaker": null, "status": "live"})),
            ValidationMode::Update,
        )
        .unwrap_err();
        assert_eq!(field_names(&err), vec!["speaker", "status"]);
    }

    #[test]
    fn dates_and_counts_are_checked() {
        let err = validate_fields(
            ContentType::Events,
            &fields(json!({"title": "Picnic", "date": "next sunday", "location": "Hall"})),
            ValidationMode::Create,
        )
        .unwrap_err();
        assert_eq!(field_names(&err), vec!["date"]);

        let err = validate_fields(
            ContentType::Blogs,
            &fields(json!({"title": "T", "content": "C", "comments": -1})),
            ValidationMode::Create,
        )
        .unwrap_err();
        assert_eq!(field_names(&err), vec!["comments"]);
    }

    #[test]
    fn valid_sermon_passes() {
        let body = fields(json!({
            "title": "Grace",
            "speaker": "Pastor Lee",
            "date": "2024-03-03",
            "status": "published",
            "videoUrl": "https://video.example/grace"
        }));
        assert!(validate_fields(ContentType::Sermons, &body, ValidationMode::Create).is_ok());
    }
}
