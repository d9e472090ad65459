//! Cover image ingestion: decode, scale to a fixed height, store under a
//! deterministic name.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::models::CoverUpload;
use crate::utils::{file_extension, sanitize_file_stem};

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("uploaded file '{0}' has no extension")]
    MissingExtension(String),

    #[error("unsupported image format '{0}'")]
    UnsupportedFormat(String),

    #[error("image would be {width} pixels wide at the cover height, limit is {max}")]
    TooWide { width: u64, max: u32 },

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("cover storage failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("image worker failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IngestionError {
    /// Whether the upload itself is at fault, as opposed to the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestionError::MissingExtension(_)
                | IngestionError::UnsupportedFormat(_)
                | IngestionError::TooWide { .. }
                | IngestionError::Decode(_)
        )
    }
}

/// Width that keeps the aspect ratio when the height becomes `target_height`.
/// Halves round to even, and the result is never below one pixel.
pub fn scaled_width(width: u32, height: u32, target_height: u32) -> u64 {
    if height == 0 {
        return u64::from(width.max(1));
    }
    let scaled = f64::from(width) * f64::from(target_height) / f64::from(height);
    (scaled.round_ties_even() as u64).max(1)
}

/// Attempts at finding a free name before a commit gives up.
const COMMIT_ATTEMPTS: usize = 4;

/// Default for [`CoverStore::with_max_width`].
pub const DEFAULT_MAX_COVER_WIDTH: u32 = 8192;

/// Writes covers into one content directory.
#[derive(Debug, Clone)]
pub struct CoverStore {
    content_dir: PathBuf,
    target_height: u32,
    max_width: u32,
    default_image: String,
}

impl CoverStore {
    pub fn new(
        content_dir: impl Into<PathBuf>,
        target_height: u32,
        default_image: impl Into<String>,
    ) -> Self {
        Self {
            content_dir: content_dir.into(),
            target_height: target_height.max(1),
            max_width: DEFAULT_MAX_COVER_WIDTH,
            default_image: default_image.into(),
        }
    }

    /// Reject uploads whose scaled width would exceed `max_width`.
    pub fn with_max_width(mut self, max_width: u32) -> Self {
        self.max_width = max_width.max(1);
        self
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    pub fn target_height(&self) -> u32 {
        self.target_height
    }

    /// `<sanitized key>.<extension>`. A key with nothing usable gets a generated
    /// stem; a key that would collide with the default cover gets `-cover`.
    pub fn stored_file_name(&self, key: &str, extension: &str) -> String {
        format!("{}.{}", self.stored_stem(key), extension)
    }

    fn stored_stem(&self, key: &str) -> String {
        let mut stem = sanitize_file_stem(key)
            .unwrap_or_else(|| uuid::Uuid::now_v7().simple().to_string());

        let default_stem = self
            .default_image
            .rsplit_once('.')
            .map_or(self.default_image.as_str(), |(stem, _)| stem);
        if stem.eq_ignore_ascii_case(default_stem) {
            stem.push_str("-cover");
        }
        stem
    }

    /// Remove a stored cover. A missing file is not an error.
    pub fn remove(&self, file_name: &str) -> Result<(), IngestionError> {
        match std::fs::remove_file(self.content_dir.join(file_name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Decode, resize and store `upload` as `key`. Returns the stored file
    /// name, which gets a suffix when the plain name is already taken.
    pub fn store_cover(&self, upload: &CoverUpload, key: &str) -> Result<String, IngestionError> {
        self.stage(upload, key)?.commit()
    }

    /// Decode and resize `upload` into a hidden temporary file next to its
    /// final location. Nothing is visible under the final name until
    /// [`StagedCover::commit`].
    pub fn stage(&self, upload: &CoverUpload, key: &str) -> Result<StagedCover, IngestionError> {
        let extension = file_extension(&upload.file_name)
            .ok_or_else(|| IngestionError::MissingExtension(upload.file_name.clone()))?;
        let format = ImageFormat::from_extension(extension)
            .ok_or_else(|| IngestionError::UnsupportedFormat(extension.to_string()))?;

        let original = image::load_from_memory(&upload.bytes).map_err(IngestionError::Decode)?;
        let (width, height) = (original.width(), original.height());
        // Checked before resizing: the output buffer is allocated up front.
        let scaled = scaled_width(width, height, self.target_height);
        let new_width = u32::try_from(scaled)
            .ok()
            .filter(|w| *w <= self.max_width)
            .ok_or(IngestionError::TooWide {
                width: scaled,
                max: self.max_width,
            })?;

        let mut resized = original.resize_exact(new_width, self.target_height, FilterType::Lanczos3);
        if format == ImageFormat::Jpeg {
            // JPEG carries no alpha channel.
            resized = DynamicImage::ImageRgb8(resized.to_rgb8());
        }

        std::fs::create_dir_all(&self.content_dir)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(&format!(".{}", extension))
            .tempfile_in(&self.content_dir)?;

        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            resized
                .write_to(&mut writer, format)
                .map_err(IngestionError::Encode)?;
            writer.flush()?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }

        let stem = self.stored_stem(key);
        let file_name = format!("{}.{}", stem, extension);
        tracing::debug!(
            %file_name,
            source_width = width,
            source_height = height,
            width = new_width,
            height = self.target_height,
            "cover staged"
        );

        Ok(StagedCover {
            content_dir: self.content_dir.clone(),
            stem,
            extension: extension.to_string(),
            file_name,
            width: new_width,
            height: self.target_height,
            temp,
        })
    }

    /// [`CoverStore::stage`] on the blocking thread pool.
    pub async fn stage_blocking(
        &self,
        upload: CoverUpload,
        key: String,
    ) -> Result<StagedCover, IngestionError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.stage(&upload, &key)).await?
    }
}

/// A resized cover waiting to be moved into place. Dropping it without
/// committing deletes the temporary file.
#[derive(Debug)]
pub struct StagedCover {
    temp: NamedTempFile,
    content_dir: PathBuf,
    stem: String,
    extension: String,
    file_name: String,
    width: u32,
    height: u32,
}

impl StagedCover {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Atomically rename into place without replacing an existing file.
    ///
    /// When the preferred name is taken (another book whose name sanitizes to
    /// the same stem), `-<8 hex>` is appended to the stem. Returns the final
    /// file name.
    pub fn commit(self) -> Result<String, IngestionError> {
        let StagedCover {
            mut temp,
            content_dir,
            stem,
            extension,
            mut file_name,
            ..
        } = self;

        for _ in 0..COMMIT_ATTEMPTS {
            match temp.persist_noclobber(content_dir.join(&file_name)) {
                Ok(_) => {
                    tracing::info!(%file_name, "cover stored");
                    return Ok(file_name);
                }
                Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!(%file_name, "cover name taken, adding suffix");
                    temp = err.file;
                    let suffix = uuid::Uuid::new_v4().simple().to_string();
                    file_name = format!("{}-{}.{}", stem, &suffix[..8], extension);
                }
                Err(err) => return Err(IngestionError::Io(err.error)),
            }
        }

        Err(IngestionError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free cover name for '{}'", stem),
        )))
    }
}
