use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode variant '{profile}': {detail}")]
    Encode { profile: String, detail: String },

    #[error("PNG optimization error: {0}")]
    PngOptimization(String),

    #[error("Invalid quality value: {0}. Must be between 1 and 100")]
    InvalidQuality(u8),

    #[error("Invalid image dimensions: {0}x{1}. Maximum allowed: {2}x{2}")]
    InvalidDimensions(u32, u32, u32),

    #[error("File too large: {0} bytes. Maximum allowed: {1} bytes")]
    FileTooLarge(u64, u64),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to create output directory: {0}")]
    DirectoryCreationFailed(PathBuf),

    #[error("Source location unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Repository sync failed for {url}: {detail}")]
    RepositorySync { url: String, detail: String },

    #[error("Walkdir error: {0}")]
    WalkdirError(#[from] walkdir::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Object store configuration error: {0}")]
    StoreConfig(String),

    #[error("Upload failed for {key}: {detail}")]
    Upload { key: String, detail: String },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Transient I/O error fetching {key}: {detail}")]
    TransientIo { key: String, detail: String },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl PipelineError {
    /// Errors that abort a run before the per-image loop starts. Everything
    /// else is contained at the image or key that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Config(_)
                | PipelineError::StoreConfig(_)
                | PipelineError::SourceUnavailable(_)
                | PipelineError::RepositorySync { .. }
                | PipelineError::InvalidQuality(_)
        )
    }

    pub fn decode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        PipelineError::Decode {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
