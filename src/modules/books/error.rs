use thiserror::Error;

use super::covers::IngestionError;
use super::form::FieldError;
use super::repository::RepositoryError;

/// Everything a catalog operation can fail with.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("submission is invalid ({} field errors)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("a book named '{0}' already exists")]
    DuplicateName(String),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error("book {0} not found")]
    BookNotFound(i64),

    #[error("page {0} not found")]
    PageNotFound(u32),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<RepositoryError> for CatalogError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DuplicateName(name) => CatalogError::DuplicateName(name),
            RepositoryError::NotFound(id) => CatalogError::BookNotFound(id),
            RepositoryError::InvalidPage { page, .. } => CatalogError::PageNotFound(page),
            RepositoryError::Database(err) => CatalogError::Database(err),
        }
    }
}
