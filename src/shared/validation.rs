//! Validation Utilities

use validator::{Validate, ValidationErrors};

use super::error::AppError;

/// Convert validation errors to AppError, reporting the first failing field.
pub fn validation_error(errors: ValidationErrors) -> AppError {
    let message = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let reason = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{field}: {reason}")
            })
        })
        .next()
        .unwrap_or_else(|| "Validation failed".into());

    AppError::Validation(message)
}

/// Validate a request body.
pub fn validated<T: Validate>(body: T) -> Result<T, AppError> {
    body.validate().map_err(validation_error)?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "must not be empty"))]
        title: String,
    }

    #[test]
    fn test_first_field_error_is_reported() {
        let err = validated(Probe { title: String::new() }).unwrap_err();
        match err {
            AppError::Validation(msg) => assert_eq!(msg, "title: must not be empty"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_valid_body_passes_through() {
        let body = validated(Probe { title: "ok".into() }).unwrap();
        assert_eq!(body.title, "ok");
    }
}
