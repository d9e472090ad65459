//! The book catalog: cover ingestion, persistence, the catalog service, and
//! the HTTP front end that exposes it.

pub mod covers;
pub mod error;
pub mod form;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;

use async_trait::async_trait;
use axum::Router;
use serde_json::json;
use shelf_kernel::{InitCtx, Migration, Module};

pub use error::CatalogError;
pub use service::CatalogService;

/// Books module: mounts the catalog front end at the site root
pub struct BooksModule {
    catalog: CatalogService,
    max_upload_bytes: usize,
}

impl BooksModule {
    pub fn new(catalog: CatalogService, max_upload_bytes: usize) -> Self {
        Self {
            catalog,
            max_upload_bytes,
        }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    fn base_path(&self) -> String {
        "/".to_string()
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            content_dir = %self.catalog.covers().content_dir().display(),
            page_size = self.catalog.page_size(),
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.catalog.clone(), self.max_upload_bytes)
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration::new(
            "001_init",
            r#"
                CREATE TABLE books (
                    id               INTEGER PRIMARY KEY AUTOINCREMENT,
                    name             TEXT    NOT NULL CHECK (length(name) BETWEEN 1 AND 256),
                    image            TEXT    NOT NULL CHECK (length(image) <= 128),
                    author           TEXT    NOT NULL CHECK (length(author) BETWEEN 1 AND 128),
                    translator       TEXT             CHECK (translator IS NULL OR length(translator) <= 128),
                    translation_date TEXT             CHECK (translation_date IS NULL OR length(translation_date) <= 8)
                );
                CREATE UNIQUE INDEX ix_books_name ON books (name);
                CREATE INDEX ix_books_author ON books (author);
                "#,
        )]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let total = self.catalog.count().await?;
        tracing::info!(module = self.name(), books = total, "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module(catalog: CatalogService, max_upload_bytes: usize) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(BooksModule::new(catalog, max_upload_bytes))
}

fn openapi_fragment() -> serde_json::Value {
    let error_response = |description: &str| {
        json!({
            "description": description,
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                }
            }
        })
    };
    let browse = json!({
        "get": {
            "summary": "Browse the catalog",
            "tags": ["Books"],
            "parameters": [
                {
                    "name": "page",
                    "in": "query",
                    "required": false,
                    "schema": { "type": "integer", "minimum": 1, "default": 1 }
                },
                {
                    "name": "added",
                    "in": "query",
                    "required": false,
                    "schema": { "type": "integer" }
                }
            ],
            "responses": {
                "200": {
                    "description": "One page of books",
                    "content": {
                        "application/json": {
                            "schema": { "$ref": "#/components/schemas/BrowsePage" }
                        }
                    }
                },
                "404": error_response("Page not found")
            }
        }
    });

    json!({
        "paths": {
            "/": browse.clone(),
            "/index": browse,
            "/show_book/{id}": {
                "get": {
                    "summary": "Show one book",
                    "tags": ["Books"],
                    "parameters": [{
                        "name": "id",
                        "in": "path",
                        "required": true,
                        "schema": { "type": "integer" }
                    }],
                    "responses": {
                        "200": {
                            "description": "The book",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Book" }
                                }
                            }
                        },
                        "404": error_response("Book not found")
                    }
                }
            },
            "/add": {
                "get": {
                    "summary": "Describe the submission form",
                    "tags": ["Books"],
                    "responses": {
                        "200": { "description": "Form fields and constraints" }
                    }
                },
                "post": {
                    "summary": "Submit a new book",
                    "tags": ["Books"],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "multipart/form-data": {
                                "schema": { "$ref": "#/components/schemas/BookSubmission" }
                            }
                        }
                    },
                    "responses": {
                        "303": { "description": "Added; redirects to the browse view" },
                        "400": error_response("Malformed multipart body"),
                        "409": error_response("Name already exists"),
                        "422": error_response("Field errors")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer", "description": "Assigned on creation" },
                        "name": { "type": "string", "description": "Unique title" },
                        "author": { "type": "string" },
                        "translator": { "type": "string", "nullable": true },
                        "translation_date": { "type": "string", "maxLength": 8, "nullable": true },
                        "image": { "type": "string", "description": "Stored cover file name" }
                    },
                    "required": ["id", "name", "author", "image"]
                },
                "BrowsePage": {
                    "type": "object",
                    "properties": {
                        "items": { "type": "array", "items": { "$ref": "#/components/schemas/Book" } },
                        "page": { "type": "integer" },
                        "pages": { "type": "integer" },
                        "total": { "type": "integer" },
                        "has_next": { "type": "boolean" },
                        "has_prev": { "type": "boolean" },
                        "next_page": { "type": "integer", "nullable": true },
                        "prev_page": { "type": "integer", "nullable": true },
                        "next_url": { "type": "string", "nullable": true },
                        "prev_url": { "type": "string", "nullable": true },
                        "notice": { "type": "string", "nullable": true }
                    },
                    "required": ["items", "page", "pages", "total", "has_next", "has_prev"]
                },
                "BookSubmission": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "maxLength": 256 },
                        "author": { "type": "string", "maxLength": 128 },
                        "translator": { "type": "string", "maxLength": 128 },
                        "translation_date": { "type": "string", "maxLength": 8 },
                        "image": { "type": "string", "format": "binary" }
                    },
                    "required": ["name", "author"]
                }
            }
        }
    })
}
