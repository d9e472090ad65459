//! Submission validation, independent of any transport.

use serde::Serialize;

use super::models::{BookForm, NewBook};
use crate::utils::file_extension;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_AUTHOR_LEN: usize = 128;
pub const MAX_TRANSLATOR_LEN: usize = 128;
pub const MAX_TRANSLATION_DATE_LEN: usize = 8;
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// A problem with one submitted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub error: String,
}

impl FieldError {
    pub fn new(field: &'static str, error: impl Into<String>) -> Self {
        Self {
            field,
            error: error.into(),
        }
    }
}

/// Check a submission and normalise it into a `NewBook`.
///
/// Required text is trimmed; blank optional text becomes `None`. The image
/// reference is left unset, the caller fills it in once a cover is stored.
pub fn validate(form: &BookForm) -> Result<NewBook, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = required(&mut errors, "name", &form.name, MAX_NAME_LEN);
    let author = required(&mut errors, "author", &form.author, MAX_AUTHOR_LEN);
    let translator = optional(&mut errors, "translator", form.translator.as_deref(), MAX_TRANSLATOR_LEN);
    let translation_date = optional(
        &mut errors,
        "translation_date",
        form.translation_date.as_deref(),
        MAX_TRANSLATION_DATE_LEN,
    );

    if let Some(upload) = &form.image {
        let allowed = file_extension(&upload.file_name)
            .map(|ext| ALLOWED_IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !allowed {
            errors.push(FieldError::new(
                "image",
                format!(
                    "File does not have an approved extension: {}",
                    ALLOWED_IMAGE_EXTENSIONS.join(", ")
                ),
            ));
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NewBook {
        name,
        author,
        translator,
        translation_date,
        image: None,
    })
}

fn required(errors: &mut Vec<FieldError>, field: &'static str, value: &str, max: usize) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.push(FieldError::new(field, "This field is required."));
    } else if value.chars().count() > max {
        errors.push(FieldError::new(field, format!("Must be at most {} characters.", max)));
    }
    value.to_string()
}

fn optional(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    if value.chars().count() > max {
        errors.push(FieldError::new(field, format!("Must be at most {} characters.", max)));
    }
    Some(value.to_string())
}
