use serde::{Deserialize, Serialize};

use crate::content::validate::FieldError;

/// Response body shared by every content API endpoint:
/// `{ success, message?, data?, errors? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok(data)
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<FieldError>) -> Self {
        self.errors = errors;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_omits_data() {
        let env: ApiEnvelope<()> = ApiEnvelope::failure("Blog not found");
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"success": false, "message": "Blog not found"})
        );
    }

    #[test]
    fn parses_minimal_success() {
        let env: ApiEnvelope<Vec<u32>> = serde_json::from_value(json!({"success": true, "data": [1, 2]})).unwrap();
        assert!(env.success);
        assert_eq!(env.data, Some(vec![1, 2]));
        assert!(env.message.is_none());
    }
}
