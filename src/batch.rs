//! Batch orchestration: sources in, stored variants and one archive out.
//!
//! A run moves through [`BatchState`]s:
//! `Enumerating -> ProcessingImages -> BuildingArchive | Idle -> Done`.
//! Failures are contained at the smallest unit. A bad image skips that
//! image, a failed upload skips that variant and a failed fetch skips that
//! archive entry. Only configuration problems and an unreadable source
//! location stop a run, and they do so before any image is touched.

use crate::archive::{ArchiveBuilder, ArchiveOutcome};
use crate::config::{join_prefix, PipelineConfig};
use crate::error::Result;
use crate::formats::OutputFormat;
use crate::logger;
use crate::processing::{variant_file_name, ImageTransformer, RenderedVariant};
use crate::source::enumerate_sources;
use crate::store::{ObjectSink, StoredObjectKey, UploadResult};
use crate::utils::create_progress_bar;
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Enumerating,
    ProcessingImages,
    BuildingArchive,
    Idle,
    Done,
}

fn enter(state: BatchState) {
    tracing::debug!(state = ?state, "Batch state");
}

/// Store key for one variant: `{prefix}/{profile}_{source file name}`.
pub fn object_key(
    prefix: &str,
    profile: &str,
    source: &Path,
    format: OutputFormat,
) -> Result<StoredObjectKey> {
    Ok(join_prefix(prefix, &variant_file_name(profile, source, format)?))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedImage {
    pub path: PathBuf,
    pub error: String,
}

/// Result of handling a single source image.
#[derive(Debug, Default)]
struct ImageOutcome {
    stored: Vec<StoredObjectKey>,
    failed_uploads: Vec<UploadResult>,
    failure: Option<FailedImage>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub discovered: usize,
    pub processed: usize,
    pub failed_images: Vec<FailedImage>,
    pub stored_keys: Vec<StoredObjectKey>,
    pub failed_uploads: Vec<UploadResult>,
    pub archive: ArchiveOutcome,
    pub elapsed: Duration,
}

impl BatchReport {
    fn empty(elapsed: Duration) -> Self {
        Self {
            discovered: 0,
            processed: 0,
            failed_images: Vec::new(),
            stored_keys: Vec::new(),
            failed_uploads: Vec::new(),
            archive: ArchiveOutcome::Skipped {
                reason: "no source images".to_string(),
            },
            elapsed,
        }
    }

    pub fn archive_key(&self) -> Option<&str> {
        match &self.archive {
            ArchiveOutcome::Stored { result, .. } if result.success => Some(result.key.as_str()),
            _ => None,
        }
    }

    pub fn print_summary(&self) {
        println!("\n📊 Batch Summary:");
        println!("  📁 Images found: {}", self.discovered);
        println!("  ✅ Images processed: {}", self.processed);
        println!("  📦 Variants stored: {}", self.stored_keys.len());
        if !self.failed_images.is_empty() {
            println!("  ⚠️  Failed images: {}", self.failed_images.len());
            for failed in &self.failed_images {
                println!("     {}: {}", failed.path.display(), failed.error);
            }
        }
        if !self.failed_uploads.is_empty() {
            println!("  ⚠️  Failed uploads: {}", self.failed_uploads.len());
        }
        match &self.archive {
            ArchiveOutcome::Stored {
                result, entries, ..
            } if result.success => {
                println!("  🗜️  Archive: {} ({} entries)", result.key, entries);
            }
            ArchiveOutcome::Stored { result, .. } => {
                println!(
                    "  ❌ Archive upload failed: {}",
                    result.error_detail.as_deref().unwrap_or("unknown error")
                );
            }
            ArchiveOutcome::Skipped { reason } => println!("  🗜️  Archive skipped: {}", reason),
        }
        println!("  ⏱️  Total time: {:?}", self.elapsed);
    }
}

pub struct BatchOrchestrator<'a> {
    transformer: ImageTransformer,
    sink: &'a dyn ObjectSink,
    image_prefix: String,
    archive_key: String,
    build_archive: bool,
    jobs: usize,
    show_progress: bool,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(config: &PipelineConfig, sink: &'a dyn ObjectSink) -> Self {
        Self::with_transformer(config, ImageTransformer::from_config(config), sink)
    }

    pub fn with_transformer(
        config: &PipelineConfig,
        transformer: ImageTransformer,
        sink: &'a dyn ObjectSink,
    ) -> Self {
        Self {
            transformer,
            sink,
            image_prefix: config.store.image_prefix.clone(),
            archive_key: config.store.archive_key(),
            build_archive: config.build_archive,
            jobs: config.jobs.max(1),
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Enumerates `config.source` and runs the batch over it. Enumeration
    /// failures are returned; everything after that is reported.
    pub fn run_from_source(&self, config: &PipelineConfig) -> Result<BatchReport> {
        enter(BatchState::Enumerating);
        let paths = enumerate_sources(&config.source)?;
        tracing::info!(count = paths.len(), "Found source images");
        Ok(self.run(&paths))
    }

    /// Processes `paths` and builds the archive from whatever was stored.
    pub fn run(&self, paths: &[PathBuf]) -> BatchReport {
        let start = Instant::now();

        if paths.is_empty() {
            enter(BatchState::Idle);
            tracing::warn!("No image files found, nothing to do");
            enter(BatchState::Done);
            return BatchReport::empty(start.elapsed());
        }

        enter(BatchState::ProcessingImages);
        let progress = create_progress_bar(
            paths.len() as u64,
            !self.show_progress || logger::is_quiet(),
        );
        let outcomes = self.process_all(paths, &progress);
        progress.finish_with_message("done");

        let mut report = BatchReport::empty(Duration::ZERO);
        report.discovered = paths.len();
        for outcome in outcomes {
            match outcome.failure {
                Some(failed) => report.failed_images.push(failed),
                None => report.processed += 1,
            }
            report.stored_keys.extend(outcome.stored);
            report.failed_uploads.extend(outcome.failed_uploads);
        }

        report.archive = if !self.build_archive {
            enter(BatchState::Idle);
            ArchiveOutcome::Skipped {
                reason: "archive disabled".to_string(),
            }
        } else if report.stored_keys.is_empty() {
            enter(BatchState::Idle);
            tracing::warn!("No variants were stored, archive not built");
            ArchiveOutcome::Skipped {
                reason: "no stored objects".to_string(),
            }
        } else {
            enter(BatchState::BuildingArchive);
            ArchiveBuilder::new(self.sink, self.archive_key.as_str()).build(&report.stored_keys)
        };

        enter(BatchState::Done);
        report.elapsed = start.elapsed();

        tracing::info!(
            discovered = report.discovered,
            processed = report.processed,
            failed_images = report.failed_images.len(),
            stored = report.stored_keys.len(),
            failed_uploads = report.failed_uploads.len(),
            archived = report.archive.is_stored(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Batch complete"
        );

        report
    }

    /// Outcomes in input order. With more than one job the images are spread
    /// over a scoped pool; aggregation still happens on the calling thread.
    fn process_all(&self, paths: &[PathBuf], progress: &ProgressBar) -> Vec<ImageOutcome> {
        let step = |path: &PathBuf| {
            let outcome = self.process_image(path);
            progress.inc(1);
            outcome
        };

        if self.jobs > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
                Ok(pool) => {
                    tracing::debug!(jobs = self.jobs, "Processing images in parallel");
                    return pool.install(|| paths.par_iter().map(step).collect());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to build thread pool, processing sequentially");
                }
            }
        }

        paths.iter().map(step).collect()
    }

    fn process_image(&self, path: &Path) -> ImageOutcome {
        let variants = match self.transformer.transform_path(path) {
            Ok(variants) => variants,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping image");
                return ImageOutcome {
                    failure: Some(FailedImage {
                        path: path.to_path_buf(),
                        error: e.to_string(),
                    }),
                    ..ImageOutcome::default()
                };
            }
        };

        let mut outcome = ImageOutcome::default();
        for variant in variants {
            match self.upload_variant(path, variant) {
                result if result.success => outcome.stored.push(result.key),
                result => outcome.failed_uploads.push(result),
            }
        }
        outcome
    }

    fn upload_variant(&self, source: &Path, variant: RenderedVariant) -> UploadResult {
        let content_type = variant.content_type();
        let key = match object_key(&self.image_prefix, &variant.profile, source, variant.format) {
            Ok(key) => key,
            Err(e) => {
                let label = format!("{}:{}", source.display(), variant.profile);
                tracing::error!(key = %label, error = %e, "No object key for variant");
                return UploadResult::failed(label, e.to_string());
            }
        };
        self.sink.store(variant.bytes, &key, content_type)
    }
}

/// Full run for `config`: validate, probe the store, enumerate, process.
/// Errors returned here are the fatal ones.
pub fn run_pipeline(config: &PipelineConfig, sink: &dyn ObjectSink) -> Result<BatchReport> {
    config.validate()?;

    if config.store.preflight {
        sink.probe()?;
        tracing::debug!(store = %sink.describe(), "Store reachable");
    }

    BatchOrchestrator::new(config, sink).run_from_source(config)
}
