//! Pipeline configuration.
//!
//! Every knob of a batch run lives in [`PipelineConfig`]: where sources come
//! from, which store receives the variants, the size profiles, the resize
//! policy and the watermark style. A config can be loaded from TOML and is
//! then overridden field by field from the command line.

use crate::constants::{
    DEFAULT_ARCHIVE_NAME, DEFAULT_ARCHIVE_PREFIX, DEFAULT_BUCKET, DEFAULT_CHECKOUT_DIR,
    DEFAULT_IMAGE_PREFIX, DEFAULT_QUALITY, DEFAULT_REGION, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SOURCE_DIR, DEFAULT_WATERMARK_FONT_SIZE, DEFAULT_WATERMARK_INSET,
    DEFAULT_WATERMARK_TEXT, MAX_QUALITY, MAX_WATERMARK_FONT_SIZE, MIN_QUALITY,
};
use crate::error::{PipelineError, Result};
use crate::formats::OutputFormat;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How a source is scaled into a profile's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizePolicy {
    /// Preserve aspect ratio and fit inside the box; never upscale.
    #[default]
    FitWithin,
    /// Stretch to exactly the box dimensions.
    Exact,
}

impl FromStr for ResizePolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fit-within" | "fit" | "thumbnail" => Ok(ResizePolicy::FitWithin),
            "exact" | "stretch" => Ok(ResizePolicy::Exact),
            _ => Err(PipelineError::Config(format!("unknown resize policy '{}'", s))),
        }
    }
}

/// Encoding requested by a size profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum TargetEncoding {
    #[default]
    SameAsSource,
    Fixed(OutputFormat),
}

impl TargetEncoding {
    pub fn resolve(&self, source: OutputFormat) -> OutputFormat {
        match self {
            TargetEncoding::SameAsSource => source,
            TargetEncoding::Fixed(format) => *format,
        }
    }
}

impl FromStr for TargetEncoding {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "same-as-source" | "source" | "same" => Ok(TargetEncoding::SameAsSource),
            other => OutputFormat::from_str(other).map(TargetEncoding::Fixed),
        }
    }
}

impl TryFrom<String> for TargetEncoding {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        TargetEncoding::from_str(&value)
    }
}

impl fmt::Display for TargetEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetEncoding::SameAsSource => write!(f, "same-as-source"),
            TargetEncoding::Fixed(format) => write!(f, "{}", format),
        }
    }
}

/// A named bounding box plus encoding, one per variant kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SizeProfile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub encoding: TargetEncoding,
}

impl SizeProfile {
    pub fn new(name: impl Into<String>, width: u32, height: u32, encoding: TargetEncoding) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            encoding,
        }
    }

    pub fn bounding_box(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Parses `name=WIDTHxHEIGHT[:encoding]`, e.g. `print=300x300:png`.
impl FromStr for SizeProfile {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            PipelineError::Config(format!(
                "invalid profile '{}', expected name=WIDTHxHEIGHT[:encoding]",
                s
            ))
        };

        let (name, rest) = s.split_once('=').ok_or_else(invalid)?;
        let (dims, encoding) = match rest.split_once(':') {
            Some((dims, encoding)) => (dims, TargetEncoding::from_str(encoding)?),
            None => (rest, TargetEncoding::SameAsSource),
        };
        let (width, height) = dims
            .to_lowercase()
            .split_once('x')
            .map(|(w, h)| (w.trim().parse::<u32>(), h.trim().parse::<u32>()))
            .ok_or_else(invalid)?;

        Ok(SizeProfile::new(
            name.trim(),
            width.map_err(|_| invalid())?,
            height.map_err(|_| invalid())?,
            encoding,
        ))
    }
}

pub fn default_profiles() -> Vec<SizeProfile> {
    vec![
        SizeProfile::new("web", 1920, 1080, TargetEncoding::SameAsSource),
        SizeProfile::new("mobile", 1080, 720, TargetEncoding::SameAsSource),
        SizeProfile::new("print", 300, 300, TargetEncoding::Fixed(OutputFormat::Png)),
    ]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub enabled: bool,
    pub text: String,
    /// TrueType/OpenType file tried before the system font candidates.
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub inset: u32,
    pub fill: [u8; 3],
    pub opacity: f32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            text: DEFAULT_WATERMARK_TEXT.to_string(),
            font_path: None,
            font_size: DEFAULT_WATERMARK_FONT_SIZE,
            inset: DEFAULT_WATERMARK_INSET,
            fill: [0, 0, 0],
            opacity: 1.0,
        }
    }
}

impl WatermarkConfig {
    /// Text to stamp, or `None` when watermarking is off.
    pub fn active_text(&self) -> Option<&str> {
        if self.enabled && !self.text.trim().is_empty() {
            Some(self.text.as_str())
        } else {
            None
        }
    }

    pub fn apply_style(&mut self, style: WatermarkStyle) {
        let (fill, opacity) = style.fill_and_opacity();
        self.fill = fill;
        self.opacity = opacity;
    }
}

/// Named fill presets for the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkStyle {
    OpaqueBlack,
    TranslucentWhite,
}

impl WatermarkStyle {
    pub fn fill_and_opacity(&self) -> ([u8; 3], f32) {
        match self {
            WatermarkStyle::OpaqueBlack => ([0, 0, 0], 1.0),
            WatermarkStyle::TranslucentWhite => ([255, 255, 255], 128.0 / 255.0),
        }
    }
}

impl FromStr for WatermarkStyle {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "opaque-black" | "black" => Ok(WatermarkStyle::OpaqueBlack),
            "translucent-white" | "white" => Ok(WatermarkStyle::TranslucentWhite),
            _ => Err(PipelineError::Config(format!("unknown watermark style '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub quality: u8,
    pub optimize_png: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            optimize_png: true,
        }
    }
}

/// Where candidate source files come from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceConfig {
    /// A directory (listed, or walked when `recursive`) or a glob pattern.
    Local {
        path: String,
        #[serde(default)]
        recursive: bool,
    },
    /// A git repository cloned (or pulled) into `checkout_dir`, then walked.
    Repository {
        url: String,
        #[serde(default = "default_checkout_dir")]
        checkout_dir: PathBuf,
        #[serde(default)]
        branch: Option<String>,
    },
}

fn default_checkout_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CHECKOUT_DIR)
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Local {
            path: DEFAULT_SOURCE_DIR.to_string(),
            recursive: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    S3,
    /// A directory on disk laid out like a bucket.
    Local,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StoreBackend::S3),
            "local" | "file" => Ok(StoreBackend::Local),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(PipelineError::Config(format!("unknown store backend '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers.
    pub endpoint: Option<String>,
    /// Root directory for the `local` backend.
    pub root: Option<PathBuf>,
    pub image_prefix: String,
    pub archive_prefix: String,
    pub archive_name: String,
    pub request_timeout_secs: u64,
    /// List the image prefix once before the batch to surface credential
    /// problems as a fatal startup error.
    pub preflight: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::S3,
            bucket: DEFAULT_BUCKET.to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            root: None,
            image_prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            archive_prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            preflight: true,
        }
    }
}

impl StoreConfig {
    pub fn archive_key(&self) -> String {
        join_prefix(&self.archive_prefix, &self.archive_name)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Joins a folder prefix and a name with exactly one `/` between them.
pub fn join_prefix(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub profiles: Vec<SizeProfile>,
    pub resize_policy: ResizePolicy,
    pub watermark: WatermarkConfig,
    pub encoding: EncodingConfig,
    pub build_archive: bool,
    /// Images processed concurrently; 1 keeps the run strictly sequential.
    pub jobs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            store: StoreConfig::default(),
            profiles: default_profiles(),
            resize_policy: ResizePolicy::default(),
            watermark: WatermarkConfig::default(),
            encoding: EncodingConfig::default(),
            build_archive: true,
            jobs: 1,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.encoding.quality) {
            return Err(PipelineError::InvalidQuality(self.encoding.quality));
        }

        if self.profiles.is_empty() {
            return Err(PipelineError::Config("at least one size profile is required".into()));
        }

        let mut names = HashSet::new();
        for profile in &self.profiles {
            if profile.name.is_empty()
                || profile.name.contains('/')
                || profile.name.contains('\\')
            {
                return Err(PipelineError::Config(format!(
                    "invalid profile name '{}'",
                    profile.name
                )));
            }
            if profile.width == 0 || profile.height == 0 {
                return Err(PipelineError::Config(format!(
                    "profile '{}' has an empty bounding box",
                    profile.name
                )));
            }
            if !names.insert(profile.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "duplicate profile name '{}'",
                    profile.name
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.watermark.opacity) {
            return Err(PipelineError::Config(format!(
                "watermark opacity {} is outside 0.0..=1.0",
                self.watermark.opacity
            )));
        }
        let font_size = self.watermark.font_size;
        if !font_size.is_finite() || font_size <= 0.0 || font_size > MAX_WATERMARK_FONT_SIZE {
            return Err(PipelineError::Config(format!(
                "watermark font size {} is outside 0..={}",
                font_size, MAX_WATERMARK_FONT_SIZE
            )));
        }

        if self.jobs == 0 {
            return Err(PipelineError::Config("jobs must be at least 1".into()));
        }

        if self.store.archive_name.is_empty() || self.store.archive_name.contains('/') {
            return Err(PipelineError::Config(format!(
                "invalid archive name '{}'",
                self.store.archive_name
            )));
        }

        match self.store.backend {
            StoreBackend::S3 if self.store.bucket.trim().is_empty() => {
                Err(PipelineError::StoreConfig("bucket name is required".into()))
            }
            StoreBackend::Local if self.store.root.is_none() => Err(PipelineError::StoreConfig(
                "the local backend needs a root directory".into(),
            )),
            _ => Ok(()),
        }
    }
}
