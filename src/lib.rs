pub mod archive;
pub mod batch;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod formats;
pub mod logger;
pub mod processing;
pub mod source;
pub mod store;
pub mod utils;
pub mod watermark;

pub use archive::{archive_entry_name, ArchiveBuilder, ArchiveOutcome};
pub use batch::{object_key, run_pipeline, BatchOrchestrator, BatchReport, BatchState};
pub use config::{
    PipelineConfig, ResizePolicy, SizeProfile, SourceConfig, StoreBackend, StoreConfig,
    TargetEncoding, WatermarkConfig, WatermarkStyle,
};
pub use error::{PipelineError, Result};
pub use formats::OutputFormat;
pub use processing::{
    fit_within, save_variants, validate_file_exists, ImageTransformer, RenderedVariant,
    SourceImage,
};
pub use source::{collect_image_files, enumerate_sources};
pub use store::{ObjectSink, ObjectStoreSink, StoredObjectKey, UploadResult};
pub use utils::is_image_file;
pub use watermark::Watermark;
