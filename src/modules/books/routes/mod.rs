//! HTTP front end of the catalog. Handlers translate requests into
//! `CatalogService` calls and map `CatalogError` onto the shared error format.

use axum::{
    extract::{rejection::QueryRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    response::{IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shelf_http::error::AppError;

use super::error::CatalogError;
use super::form::{
    ALLOWED_IMAGE_EXTENSIONS, MAX_AUTHOR_LEN, MAX_NAME_LEN, MAX_TRANSLATION_DATE_LEN,
    MAX_TRANSLATOR_LEN,
};
use super::models::{Book, BookForm, BrowsePage, CoverUpload};
use super::service::CatalogService;

pub const ADDED_NOTICE: &str = "New Book Added";

/// Routes of the catalog front end, with the upload size limit applied.
pub fn router(catalog: CatalogService, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(browse))
        .route("/index", get(browse))
        .route("/show_book/{id}", get(show_book))
        .route("/add", get(add_form).post(add_book))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(catalog)
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    page: Option<u32>,
    /// Set by the redirect after a successful submission
    added: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BrowseView {
    #[serde(flatten)]
    page: BrowsePage,
    next_url: Option<String>,
    prev_url: Option<String>,
    notice: Option<&'static str>,
}

/// A page token that does not parse (`?page=abc`, `?page=-1`) names no page.
async fn browse(
    State(catalog): State<CatalogService>,
    query: Result<Query<BrowseQuery>, QueryRejection>,
) -> Result<Json<BrowseView>, AppError> {
    let Query(query) = query.map_err(|rejection| {
        AppError::not_found(format!("page not found: {}", rejection.body_text()))
    })?;
    let page = catalog.browse(query.page.unwrap_or(1)).await?;

    Ok(Json(BrowseView {
        next_url: page.next_page.map(page_url),
        prev_url: page.prev_page.map(page_url),
        notice: query.added.map(|_| ADDED_NOTICE),
        page,
    }))
}

async fn show_book(
    State(catalog): State<CatalogService>,
    Path(id): Path<i64>,
) -> Result<Json<Book>, AppError> {
    Ok(Json(catalog.get_book(id).await?))
}

/// The empty submission form: fields and their constraints.
async fn add_form() -> Json<serde_json::Value> {
    Json(json!({
        "action": "/add",
        "method": "POST",
        "enctype": "multipart/form-data",
        "fields": [
            { "name": "name", "label": "Name", "type": "text", "required": true, "max_length": MAX_NAME_LEN },
            { "name": "author", "label": "Author", "type": "text", "required": true, "max_length": MAX_AUTHOR_LEN },
            { "name": "translator", "label": "Translator", "type": "text", "required": false, "max_length": MAX_TRANSLATOR_LEN },
            { "name": "translation_date", "label": "Translation Date", "type": "text", "required": false, "max_length": MAX_TRANSLATION_DATE_LEN },
            { "name": "image", "label": "Image", "type": "file", "required": false, "accept": ALLOWED_IMAGE_EXTENSIONS }
        ]
    }))
}

async fn add_book(
    State(catalog): State<CatalogService>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let submission = read_submission(multipart).await?;
    let book = catalog.submit_new_book(submission).await?;
    Ok(Redirect::to(&format!("/index?added={}", book.id)))
}

/// Collect the multipart fields into a `BookForm`. An empty file part (no file
/// chosen) counts as no image.
async fn read_submission(mut multipart: Multipart) -> Result<BookForm, AppError> {
    let mut form = BookForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if name == "image" {
            let file_name = field.file_name().map(str::to_owned).unwrap_or_default();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::bad_request(err.body_text()))?;
            if !file_name.is_empty() && !bytes.is_empty() {
                form.image = Some(CoverUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?;
        match name.as_str() {
            "name" => form.name = text,
            "author" => form.author = text,
            "translator" => form.translator = Some(text),
            "translation_date" => form.translation_date = Some(text),
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(form)
}

fn page_url(page: u32) -> String {
    format!("/index?page={}", page)
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(errors) => AppError::validation(
                errors.iter().map(|e| json!(e)).collect(),
                "submission has invalid fields",
            ),
            CatalogError::DuplicateName(name) => AppError::conflict(
                vec![json!({ "field": "name", "error": "name already exists" })],
                format!("a book named '{}' already exists", name),
            ),
            CatalogError::Ingestion(err) if err.is_client_error() => AppError::validation(
                vec![json!({ "field": "image", "error": err.to_string() })],
                "image could not be processed",
            ),
            CatalogError::Ingestion(err) => {
                AppError::Internal(anyhow::Error::new(err).context("cover ingestion failed"))
            }
            err @ (CatalogError::BookNotFound(_) | CatalogError::PageNotFound(_)) => {
                AppError::not_found(err.to_string())
            }
            CatalogError::Database(err) => {
                AppError::Internal(anyhow::Error::new(err).context("catalog query failed"))
            }
        }
    }
}
