use sqlx::SqlitePool;
use thiserror::Error;

use super::models::{Book, NewBook, Page};

const BOOK_COLUMNS: &str = "id, name, author, translator, translation_date, image";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("a book named '{0}' already exists")]
    DuplicateName(String),

    #[error("book {0} not found")]
    NotFound(i64),

    #[error("invalid page request (page {page}, size {per_page})")]
    InvalidPage { page: u32, per_page: u32 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence of `Book` rows. Owns the default-cover invariant and maps the
/// unique index on `name` to `DuplicateName`.
#[derive(Debug, Clone)]
pub struct BookRepository {
    pool: SqlitePool,
    default_image: String,
}

impl BookRepository {
    pub fn new(pool: SqlitePool, default_image: impl Into<String>) -> Self {
        Self {
            pool,
            default_image: default_image.into(),
        }
    }

    pub fn default_image(&self) -> &str {
        &self.default_image
    }

    /// Insert a book and return it with its assigned id.
    pub async fn create(&self, new_book: &NewBook) -> Result<Book, RepositoryError> {
        self.create_with(new_book, |_| Ok::<(), RepositoryError>(()))
            .await
    }

    /// Insert a book inside a transaction and run `on_insert` before the commit.
    /// If `on_insert` fails the row is rolled back and its error returned.
    ///
    /// `on_insert` may change the book's `image`; the new reference is written
    /// in the same transaction.
    pub async fn create_with<F, E>(&self, new_book: &NewBook, on_insert: F) -> Result<Book, E>
    where
        F: FnOnce(&mut Book) -> Result<(), E>,
        E: From<RepositoryError>,
    {
        let image = new_book
            .image
            .as_deref()
            .unwrap_or(&self.default_image);

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let inserted = sqlx::query_as::<_, Book>(&format!(
            "INSERT INTO books (name, author, translator, translation_date, image) \
             VALUES (?, ?, ?, ?, ?) RETURNING {}",
            BOOK_COLUMNS
        ))
        .bind(&new_book.name)
        .bind(&new_book.author)
        .bind(&new_book.translator)
        .bind(&new_book.translation_date)
        .bind(image)
        .fetch_one(&mut *tx)
        .await;

        let mut book = match inserted {
            Ok(book) => book,
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await.ok();
                return Err(RepositoryError::DuplicateName(new_book.name.clone()).into());
            }
            Err(err) => return Err(RepositoryError::from(err).into()),
        };

        let inserted_image = book.image.clone();
        if let Err(err) = on_insert(&mut book) {
            tx.rollback().await.ok();
            return Err(err);
        }

        if book.image != inserted_image {
            sqlx::query("UPDATE books SET image = ? WHERE id = ?")
                .bind(&book.image)
                .bind(book.id)
                .execute(&mut *tx)
                .await
                .map_err(RepositoryError::from)?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::debug!(id = book.id, name = %book.name, "book row inserted");
        Ok(book)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Book, RepositoryError> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound(id))
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// Books in insertion order, `per_page` at a time. Pages past the end come
    /// back empty.
    pub async fn list_page(&self, page: u32, per_page: u32) -> Result<Page<Book>, RepositoryError> {
        if page == 0 || per_page == 0 {
            return Err(RepositoryError::InvalidPage { page, per_page });
        }

        let offset = i64::from(page - 1) * i64::from(per_page);
        let total = self.count().await?;
        let items = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books ORDER BY id ASC LIMIT ? OFFSET ?",
            BOOK_COLUMNS
        ))
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(items, page, per_page, total))
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::tests::catalog_db;

    fn new_book(name: &str) -> NewBook {
        NewBook {
            name: name.to_string(),
            author: "Author".to_string(),
            translator: None,
            translation_date: None,
            image: None,
        }
    }

    async fn repository() -> BookRepository {
        let db = catalog_db().await;
        BookRepository::new(db.pool().clone(), "default.png")
    }

    #[tokio::test]
    async fn create_assigns_ids_and_default_cover() {
        let repo = repository().await;

        let first = repo.create(&new_book("Dune")).await.unwrap();
        let mut second = new_book("Solaris");
        second.translator = Some("Kandel".to_string());
        second.translation_date = Some("1970".to_string());
        second.image = Some("Solaris.png".to_string());
        let second = repo.create(&second).await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(first.image, "default.png");
        assert_eq!(second.image, "Solaris.png");
        assert_eq!(second.translator.as_deref(), Some("Kandel"));
        assert_eq!(repo.get_by_id(second.id).await.unwrap(), second);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected_and_original_kept() {
        let repo = repository().await;
        let original = repo.create(&new_book("Dune")).await.unwrap();

        let mut again = new_book("Dune");
        again.author = "Someone Else".to_string();
        let err = repo.create(&again).await.unwrap_err();

        assert!(matches!(err, RepositoryError::DuplicateName(name) if name == "Dune"));
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.get_by_id(original.id).await.unwrap(), original);
    }

    #[tokio::test]
    async fn failed_hook_rolls_back_insert() {
        let repo = repository().await;

        let result: Result<Book, RepositoryError> = repo
            .create_with(&new_book("Dune"), |_| Err(RepositoryError::NotFound(0)))
            .await;

        assert!(result.is_err());
        assert_eq!(repo.count().await.unwrap(), 0);
        // The name is free again after the rollback.
        assert!(repo.create(&new_book("Dune")).await.is_ok());
    }

    #[tokio::test]
    async fn hook_can_rename_the_image() {
        let repo = repository().await;
        let mut book = new_book("Dune");
        book.image = Some("Dune.png".to_string());

        let created = repo
            .create_with(&book, |book| {
                book.image = "Dune-0badf00d.png".to_string();
                Ok::<(), RepositoryError>(())
            })
            .await
            .unwrap();

        assert_eq!(created.image, "Dune-0badf00d.png");
        assert_eq!(repo.get_by_id(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn failed_image_update_rolls_back_insert() {
        let repo = repository().await;

        let result = repo
            .create_with(&new_book("Dune"), |book| {
                book.image = "x".repeat(200);
                Ok::<(), RepositoryError>(())
            })
            .await;

        assert!(matches!(result, Err(RepositoryError::Database(_))));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn configured_default_cover_is_used() {
        let db = catalog_db().await;
        let repo = BookRepository::new(db.pool().clone(), "blank.jpg");

        let book = repo.create(&new_book("Dune")).await.unwrap();
        assert_eq!(book.image, "blank.jpg");

        // The schema carries no default of its own.
        let bare = sqlx::query("INSERT INTO books (name, author) VALUES ('Solaris', 'Lem')")
            .execute(db.pool())
            .await;
        assert!(bare.is_err());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let repo = repository().await;
        assert!(matches!(
            repo.get_by_id(42).await,
            Err(RepositoryError::NotFound(42))
        ));
    }

    #[tokio::test]
    async fn pages_cover_every_book_once_in_id_order() {
        let repo = repository().await;
        let mut created = Vec::new();
        for i in 0..10 {
            created.push(repo.create(&new_book(&format!("Book {i}"))).await.unwrap());
        }

        let mut seen = Vec::new();
        let mut page_number = 1;
        loop {
            let page = repo.list_page(page_number, 4).await.unwrap();
            assert_eq!(page.has_prev, page_number > 1);
            seen.extend(page.items);
            if !page.has_next {
                break;
            }
            page_number += 1;
        }

        assert_eq!(page_number, 3);
        assert_eq!(seen, created);
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let repo = repository().await;
        repo.create(&new_book("Only")).await.unwrap();

        let page = repo.list_page(5, 4).await.unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_next);
        assert!(page.has_prev);
    }

    #[tokio::test]
    async fn zero_page_or_size_is_invalid() {
        let repo = repository().await;
        assert!(matches!(
            repo.list_page(0, 4).await,
            Err(RepositoryError::InvalidPage { page: 0, .. })
        ));
        assert!(matches!(
            repo.list_page(1, 0).await,
            Err(RepositoryError::InvalidPage { per_page: 0, .. })
        ));
    }

    #[tokio::test]
    async fn schema_rejects_blank_name() {
        let repo = repository().await;
        let err = repo.create(&new_book("")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Database(_)));
    }
}
