//! Object store sink.
//!
//! The pipeline talks to storage through [`ObjectSink`], a blocking
//! key/value interface. [`ObjectStoreSink`] implements it on top of the
//! `object_store` crate (S3, a local directory, or memory) and owns the tokio
//! runtime that drives the async client.

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{PipelineError, Result};
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, GetOptions, ObjectStore, PutOptions, PutPayload};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type StoredObjectKey = String;

/// Outcome of a single `store` call. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: StoredObjectKey,
    pub success: bool,
    pub error_detail: Option<String>,
    pub size_bytes: usize,
}

impl UploadResult {
    pub fn succeeded(key: impl Into<String>, size_bytes: usize) -> Self {
        Self {
            key: key.into(),
            success: true,
            error_detail: None,
            size_bytes,
        }
    }

    pub fn failed(key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            success: false,
            error_detail: Some(detail.into()),
            size_bytes: 0,
        }
    }
}

/// Blocking key/value blob sink used by the batch and the archive builder.
pub trait ObjectSink: Send + Sync {
    /// Writes `buffer` under `key` in a single attempt. Never fails past this
    /// boundary: errors are reported in the returned [`UploadResult`].
    fn store(&self, buffer: Vec<u8>, key: &str, content_type: &str) -> UploadResult;

    /// Reads `key` back. Fails with [`PipelineError::NotFound`] or
    /// [`PipelineError::TransientIo`].
    fn fetch(&self, key: &str) -> Result<Vec<u8>>;

    /// Startup check that the store is reachable with the configured
    /// credentials.
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String;
}

enum CallError {
    Store(object_store::Error),
    TimedOut(Duration),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Store(e) => write!(f, "{}", e),
            CallError::TimedOut(limit) => write!(f, "request timed out after {:?}", limit),
        }
    }
}

pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    runtime: tokio::runtime::Runtime,
    label: String,
    content_type_metadata: bool,
    timeout: Option<Duration>,
    probe_prefix: String,
}

impl ObjectStoreSink {
    fn new(
        store: Arc<dyn ObjectStore>,
        label: String,
        content_type_metadata: bool,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| PipelineError::StoreConfig(format!("Failed to create runtime: {}", e)))?;

        Ok(Self {
            store,
            runtime,
            label,
            content_type_metadata,
            timeout: None,
            probe_prefix: String::new(),
        })
    }

    /// Builds the sink described by `config`. Called once at startup; any
    /// error here is fatal for the run.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let sink = match config.backend {
            StoreBackend::S3 => Self::s3(
                &config.bucket,
                &config.region,
                config.endpoint.as_deref(),
            )?,
            StoreBackend::Local => {
                let root = config.root.as_deref().ok_or_else(|| {
                    PipelineError::StoreConfig("the local backend needs a root directory".into())
                })?;
                Self::local(root)?
            }
            StoreBackend::Memory => Self::in_memory()?,
        };

        Ok(sink
            .with_timeout(config.request_timeout())
            .with_probe_prefix(&config.image_prefix))
    }

    /// S3 (or S3-compatible) bucket. Credentials come from the standard AWS
    /// environment variables.
    pub fn s3(bucket: &str, region: &str, endpoint: Option<&str>) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket);

        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| PipelineError::StoreConfig(e.to_string()))?;

        Self::new(Arc::new(store), format!("s3://{}", bucket), true)
    }

    /// A directory laid out like a bucket. Content types are not recorded.
    pub fn local(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            PipelineError::StoreConfig(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| PipelineError::StoreConfig(e.to_string()))?;

        Self::new(Arc::new(store), format!("file://{}", root.display()), false)
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(Arc::new(InMemory::new()), "memory".to_string(), true)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_probe_prefix(mut self, prefix: &str) -> Self {
        self.probe_prefix = prefix.trim_matches('/').to_string();
        self
    }

    /// Keys stored directly under `prefix`, sorted.
    pub fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let store = Arc::clone(&self.store);
        let prefix = prefix.trim_matches('/').to_string();
        let listing = self
            .run(async move {
                let location = (!prefix.is_empty()).then(|| ObjectPath::from(prefix));
                store.list_with_delimiter(location.as_ref()).await
            })
            .map_err(|e| PipelineError::TransientIo {
                key: self.label.clone(),
                detail: e.to_string(),
            })?;

        let mut keys: Vec<String> = listing
            .objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn run<T, F>(&self, fut: F) -> std::result::Result<T, CallError>
    where
        F: Future<Output = object_store::Result<T>>,
    {
        let timeout = self.timeout;
        self.runtime.block_on(async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result.map_err(CallError::Store),
                    Err(_) => Err(CallError::TimedOut(limit)),
                },
                None => fut.await.map_err(CallError::Store),
            }
        })
    }
}

impl fmt::Debug for ObjectStoreSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreSink")
            .field("label", &self.label)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ObjectSink for ObjectStoreSink {
    fn store(&self, buffer: Vec<u8>, key: &str, content_type: &str) -> UploadResult {
        let location = match ObjectPath::parse(key) {
            Ok(location) => location,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Rejected invalid object key");
                return UploadResult::failed(key, e.to_string());
            }
        };

        let mut options = PutOptions::default();
        if self.content_type_metadata {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            options.attributes = attributes;
        }

        let size = buffer.len();
        let payload = PutPayload::from(Bytes::from(buffer));
        let store = Arc::clone(&self.store);
        let start = Instant::now();

        let result = self.run(async move { store.put_opts(&location, payload, options).await });

        match result {
            Ok(_) => {
                tracing::info!(
                    store = %self.label,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Upload successful"
                );
                UploadResult::succeeded(key, size)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    store = %self.label,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Upload failed"
                );
                UploadResult::failed(key, e.to_string())
            }
        }
    }

    fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let location = ObjectPath::parse(key).map_err(|_| PipelineError::NotFound(key.to_string()))?;
        let store = Arc::clone(&self.store);
        let start = Instant::now();

        let result = self.run(async move {
            let response = store.get_opts(&location, GetOptions::default()).await?;
            response.bytes().await
        });

        match result {
            Ok(bytes) => {
                tracing::debug!(
                    store = %self.label,
                    key = %key,
                    size_bytes = bytes.len(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Download successful"
                );
                Ok(bytes.to_vec())
            }
            Err(CallError::Store(object_store::Error::NotFound { .. })) => {
                Err(PipelineError::NotFound(key.to_string()))
            }
            Err(e) => Err(PipelineError::TransientIo {
                key: key.to_string(),
                detail: e.to_string(),
            }),
        }
    }

    fn probe(&self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let prefix = self.probe_prefix.clone();
        let result = self.run(async move {
            let location = (!prefix.is_empty()).then(|| ObjectPath::from(prefix));
            store.list_with_delimiter(location.as_ref()).await
        });

        match result {
            Ok(_) | Err(CallError::Store(object_store::Error::NotFound { .. })) => Ok(()),
            Err(e) => Err(PipelineError::StoreConfig(format!(
                "{} is unreachable: {}",
                self.label, e
            ))),
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
