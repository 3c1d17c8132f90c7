use mongodb::bson::oid::ObjectId;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::store::StoreError;

/// Failure kinds surfaced by the booking, payment, review and catalog services.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    /// Payment gateway or other upstream failure; the caller may retry.
    #[error("{0}")]
    Downstream(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(describe_validation_errors(&errors))
    }
}

/// Names the first failing field, descending into nested structs
/// (`customer_info.phone`).
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    first_invalid_field(errors, "")
        .unwrap_or_else(|| "Invalid request".to_string())
}

fn first_invalid_field(errors: &ValidationErrors, prefix: &str) -> Option<String> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by_key(|(name, _)| **name);

    for (name, kind) in fields {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", prefix, name)
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let message = field_errors
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is required".to_string());
                return Some(format!("{} {}", path, message));
            }
            ValidationErrorsKind::Struct(nested) => {
                if let Some(found) = first_invalid_field(nested, &path) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    if let Some(found) = first_invalid_field(nested, &format!("{}[{}]", path, index)) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

pub fn parse_object_id(value: &str, field: &str) -> AppResult<ObjectId> {
    ObjectId::parse_str(value.trim())
        .map_err(|_| AppError::Validation(format!("Invalid {}", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Inner {
        #[validate(length(min = 1, message = "is required"))]
        phone: String,
    }

    #[derive(Validate)]
    struct Outer {
        #[validate(range(min = 1, message = "must be at least 1"))]
        travelers: i32,
        #[validate]
        inner: Inner,
    }

    #[test]
    fn names_the_failing_field() {
        let outer = Outer { travelers: 2, inner: Inner { phone: String::new() } };
        let err = AppError::from(outer.validate().unwrap_err());
        assert_eq!(err.to_string(), "inner.phone is required");
    }

    #[test]
    fn reports_top_level_fields() {
        let outer = Outer { travelers: 0, inner: Inner { phone: "0712345678".into() } };
        let message = describe_validation_errors(&outer.validate().unwrap_err());
        assert_eq!(message, "travelers must be at least 1");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(matches!(parse_object_id("nope", "booking_id"), Err(AppError::Validation(m)) if m == "Invalid booking_id"));
        assert!(parse_object_id(&ObjectId::new().to_hex(), "booking_id").is_ok());
    }
}
