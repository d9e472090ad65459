use sqlx::SqlitePool;

use super::covers::CoverStore;
use super::error::CatalogError;
use super::form;
use super::models::{Book, BookForm, BrowsePage};
use super::repository::BookRepository;
use shelf_kernel::settings::CatalogSettings;

/// Entry point for catalog operations: validates submissions, stores covers,
/// persists books, and serves the read side.
#[derive(Debug, Clone)]
pub struct CatalogService {
    repository: BookRepository,
    covers: CoverStore,
    page_size: u32,
}

impl CatalogService {
    pub fn new(repository: BookRepository, covers: CoverStore, page_size: u32) -> Self {
        Self {
            repository,
            covers,
            page_size: page_size.max(1),
        }
    }

    /// Wire a service from settings over an existing pool.
    pub fn from_settings(pool: SqlitePool, settings: &CatalogSettings) -> Self {
        Self::new(
            BookRepository::new(pool, settings.default_image.clone()),
            CoverStore::new(
                settings.content_dir.clone(),
                settings.cover_height,
                settings.default_image.clone(),
            )
            .with_max_width(settings.max_cover_width),
            settings.page_size,
        )
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn covers(&self) -> &CoverStore {
        &self.covers
    }

    /// Validate, store the cover if any, and persist a new book.
    ///
    /// The cover is written to a temporary file first and moved into place
    /// inside the insert transaction without replacing any existing file. A
    /// failed insert (duplicate name included) leaves other covers alone, and
    /// a cover moved into place for a transaction that then fails is removed.
    pub async fn submit_new_book(&self, submission: BookForm) -> Result<Book, CatalogError> {
        let mut new_book = form::validate(&submission).map_err(CatalogError::Validation)?;

        let staged = match submission.image {
            Some(upload) => {
                let staged = self
                    .covers
                    .stage_blocking(upload, new_book.name.clone())
                    .await?;
                new_book.image = Some(staged.file_name().to_string());
                Some(staged)
            }
            None => None,
        };

        let mut committed: Option<String> = None;
        let created = self
            .repository
            .create_with(&new_book, |book| {
                if let Some(staged) = staged {
                    book.image = staged.commit()?;
                    committed = Some(book.image.clone());
                }
                Ok::<(), CatalogError>(())
            })
            .await;

        let book = match created {
            Ok(book) => book,
            Err(err) => {
                if let Some(file_name) = committed {
                    if let Err(cleanup) = self.covers.remove(&file_name) {
                        tracing::warn!(%file_name, error = %cleanup, "orphaned cover left behind");
                    }
                }
                return Err(err);
            }
        };

        tracing::info!(id = book.id, name = %book.name, image = %book.image, "book added");
        Ok(book)
    }

    /// One page of the catalog in insertion order.
    ///
    /// Page 1 of an empty catalog is an empty page; any other page without
    /// books is `PageNotFound`.
    pub async fn browse(&self, page: u32) -> Result<BrowsePage, CatalogError> {
        if page == 0 {
            return Err(CatalogError::PageNotFound(page));
        }

        let result = self.repository.list_page(page, self.page_size).await?;
        if result.items.is_empty() && page > 1 {
            return Err(CatalogError::PageNotFound(page));
        }

        Ok(result.into())
    }

    pub async fn get_book(&self, id: i64) -> Result<Book, CatalogError> {
        Ok(self.repository.get_by_id(id).await?)
    }

    pub async fn count(&self) -> Result<i64, CatalogError> {
        Ok(self.repository.count().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::covers::tests::png_upload;
    use crate::modules::books::covers::IngestionError;
    use crate::modules::books::models::CoverUpload;
    use crate::modules::books::tests::catalog_db;
    use image::GenericImageView;
    use std::path::Path;
    use tempfile::TempDir;

    async fn service() -> (CatalogService, TempDir) {
        let db = catalog_db().await;
        let content = tempfile::tempdir().unwrap();
        let settings = CatalogSettings {
            content_dir: content.path().to_path_buf(),
            ..CatalogSettings::default()
        };
        (CatalogService::from_settings(db.pool().clone(), &settings), content)
    }

    fn submission(name: &str, author: &str) -> BookForm {
        BookForm {
            name: name.to_string(),
            author: author.to_string(),
            ..BookForm::default()
        }
    }

    fn visible_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn submission_without_image_gets_default_cover() {
        let (catalog, _content) = service().await;

        let book = catalog
            .submit_new_book(submission("Dune", "Herbert"))
            .await
            .unwrap();

        assert!(book.id > 0);
        assert_eq!(book.image, "default.png");
        assert_eq!(catalog.get_book(book.id).await.unwrap(), book);
    }

    #[tokio::test]
    async fn duplicate_submission_fails_and_count_is_unchanged() {
        let (catalog, _content) = service().await;
        catalog
            .submit_new_book(submission("Dune", "Herbert"))
            .await
            .unwrap();

        let err = catalog
            .submit_new_book(submission("Dune", "Herbert"))
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::DuplicateName(name) if name == "Dune"));
        assert_eq!(catalog.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn submission_with_image_stores_scaled_cover() {
        let (catalog, content) = service().await;
        let mut form = submission("Foo", "Bar");
        form.image = Some(png_upload("foo.png", 1300, 2000));

        let book = catalog.submit_new_book(form).await.unwrap();

        assert_eq!(book.image, "Foo.png");
        let stored = image::open(content.path().join(&book.image)).unwrap();
        assert_eq!(stored.dimensions(), (422, 650));
        assert_eq!(visible_files(content.path()), vec!["Foo.png"]);
    }

    #[tokio::test]
    async fn duplicate_with_image_keeps_existing_cover() {
        let (catalog, content) = service().await;
        let mut first = submission("Foo", "Bar");
        first.image = Some(png_upload("foo.png", 10, 20));
        catalog.submit_new_book(first).await.unwrap();

        let mut second = submission("Foo", "Bar");
        second.image = Some(png_upload("foo.png", 20, 10));
        let err = catalog.submit_new_book(second).await.unwrap_err();

        assert!(matches!(err, CatalogError::DuplicateName(_)));
        let stored = image::open(content.path().join("Foo.png")).unwrap();
        assert_eq!(stored.dimensions(), (325, 650));
        assert_eq!(visible_files(content.path()), vec!["Foo.png"]);
    }

    #[tokio::test]
    async fn colliding_names_keep_separate_covers() {
        let (catalog, content) = service().await;
        let mut first = submission("Dune: Part 1", "Herbert");
        first.image = Some(png_upload("a.png", 10, 20));
        let mut second = submission("Dune Part 1", "Herbert");
        second.image = Some(png_upload("b.png", 20, 10));

        let first = catalog.submit_new_book(first).await.unwrap();
        let second = catalog.submit_new_book(second).await.unwrap();

        assert_eq!(first.image, "Dune_Part_1.png");
        assert_ne!(second.image, first.image);
        assert_eq!(catalog.get_book(second.id).await.unwrap().image, second.image);
        let kept = image::open(content.path().join(&first.image)).unwrap();
        assert_eq!(kept.dimensions(), (325, 650));
        let added = image::open(content.path().join(&second.image)).unwrap();
        assert_eq!(added.dimensions(), (1300, 650));
    }

    #[tokio::test]
    async fn failed_transaction_removes_committed_cover() {
        let db = catalog_db().await;
        let content = tempfile::tempdir().unwrap();
        let settings = CatalogSettings {
            content_dir: content.path().to_path_buf(),
            ..CatalogSettings::default()
        };
        let catalog = CatalogService::from_settings(db.pool().clone(), &settings);
        // A taken name forces the image update; the trigger makes it fail.
        std::fs::write(content.path().join("Foo.png"), b"someone else's cover").unwrap();
        sqlx::raw_sql(
            "CREATE TRIGGER freeze_images BEFORE UPDATE OF image ON books \
             BEGIN SELECT RAISE(ABORT, 'images are frozen'); END;",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let mut form = submission("Foo", "Bar");
        form.image = Some(png_upload("foo.png", 10, 20));
        let err = catalog.submit_new_book(form).await.unwrap_err();

        assert!(matches!(err, CatalogError::Database(_)));
        assert_eq!(catalog.count().await.unwrap(), 0);
        assert_eq!(visible_files(content.path()), vec!["Foo.png"]);
        assert_eq!(
            std::fs::read(content.path().join("Foo.png")).unwrap(),
            b"someone else's cover"
        );
    }

    #[tokio::test]
    async fn corrupt_image_aborts_submission() {
        let (catalog, content) = service().await;
        let mut form = submission("Broken", "Bar");
        form.image = Some(CoverUpload {
            file_name: "broken.png".to_string(),
            bytes: vec![0; 64],
        });

        let err = catalog.submit_new_book(form).await.unwrap_err();

        assert!(matches!(err, CatalogError::Ingestion(IngestionError::Decode(_))));
        assert_eq!(catalog.count().await.unwrap(), 0);
        assert!(visible_files(content.path()).is_empty());
    }

    #[tokio::test]
    async fn invalid_submission_reports_fields() {
        let (catalog, _content) = service().await;

        let err = catalog
            .submit_new_book(submission("", "Herbert"))
            .await
            .unwrap_err();

        match err {
            CatalogError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "name");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn browse_returns_first_page_of_four() {
        let (catalog, _content) = service().await;
        let mut ids = Vec::new();
        for name in ["A", "B", "C", "D", "E"] {
            ids.push(catalog.submit_new_book(submission(name, "X")).await.unwrap().id);
        }

        let first = catalog.browse(1).await.unwrap();
        assert_eq!(
            first.items.iter().map(|b| b.id).collect::<Vec<_>>(),
            ids[..4].to_vec()
        );
        assert!(first.has_next);
        assert!(!first.has_prev);
        assert_eq!(first.next_page, Some(2));
        assert_eq!(first.pages, 2);

        let second = catalog.browse(2).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(!second.has_next);
        assert_eq!(second.prev_page, Some(1));
    }

    #[tokio::test]
    async fn browse_out_of_range_is_not_found() {
        let (catalog, _content) = service().await;

        let empty = catalog.browse(1).await.unwrap();
        assert!(empty.items.is_empty());
        assert!(matches!(catalog.browse(0).await, Err(CatalogError::PageNotFound(0))));
        assert!(matches!(catalog.browse(2).await, Err(CatalogError::PageNotFound(2))));
    }

    #[tokio::test]
    async fn unknown_book_is_not_found() {
        let (catalog, _content) = service().await;
        assert!(matches!(
            catalog.get_book(7).await,
            Err(CatalogError::BookNotFound(7))
        ));
    }
}
