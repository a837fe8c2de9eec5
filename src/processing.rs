use crate::config::{EncodingConfig, PipelineConfig, ResizePolicy, SizeProfile};
use crate::constants::{
    LIBDEFLATER_HIGH_LEVEL, LIBDEFLATER_LOW_LEVEL, MAX_FILE_SIZE, MAX_IMAGE_DIMENSION,
    OXIPNG_PRESET, ZOPFLI_ITERATIONS,
};
use crate::error::{PipelineError, Result};
use crate::formats::OutputFormat;
use crate::watermark::Watermark;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use oxipng::{Deflaters, Options};
use std::fs;
use std::io::Cursor;
use std::num::NonZeroU8;
use std::path::{Path, PathBuf};

/// A decoded source image and what is known about its encoding.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub image: DynamicImage,
    pub file_size: u64,
}

impl SourceImage {
    /// Reads and decodes an image file.
    ///
    /// # Security Features
    /// - Enforces maximum file size limit before reading
    /// - Validates image dimensions to prevent memory exhaustion
    /// - Detects the format from content, not from the extension
    pub fn open(path: &Path) -> Result<Self> {
        validate_file_exists(path)?;

        let file_size = fs::metadata(path)?.len();
        if file_size > MAX_FILE_SIZE {
            return Err(PipelineError::FileTooLarge(file_size, MAX_FILE_SIZE));
        }

        let bytes = fs::read(path)?;
        Self::from_bytes(path, &bytes)
    }

    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let format = reader
            .format()
            .and_then(OutputFormat::from_image_format)
            .ok_or_else(|| {
                PipelineError::UnsupportedFormat(format!("{}: unrecognised image data", path.display()))
            })?;

        let image = reader
            .decode()
            .map_err(|e| PipelineError::decode(path, e))?;

        let (width, height) = image.dimensions();
        if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
            return Err(PipelineError::InvalidDimensions(
                width,
                height,
                MAX_IMAGE_DIMENSION,
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            format,
            image,
            file_size: bytes.len() as u64,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// One encoded rendition of a source for a size profile. Lives only until it
/// has been handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedVariant {
    pub profile: String,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl RenderedVariant {
    pub fn content_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Validates that a file exists at the given path.
///
/// # Example
/// ```
/// use std::path::Path;
/// use img_variants::validate_file_exists;
///
/// let result = validate_file_exists(Path::new("nonexistent.jpg"));
/// assert!(result.is_err());
/// ```
pub fn validate_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound(path.to_path_buf()));
    }
    Ok(())
}

/// Largest size that fits inside `bounding` with the source's aspect ratio.
/// Sources that already fit are left alone.
pub fn fit_within(source: (u32, u32), bounding: (u32, u32)) -> (u32, u32) {
    let (width, height) = source;
    let (max_width, max_height) = bounding;
    if width <= max_width && height <= max_height {
        return source;
    }

    let ratio = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let new_width = ((width as f64 * ratio).round() as u32).clamp(1, max_width);
    let new_height = ((height as f64 * ratio).round() as u32).clamp(1, max_height);
    (new_width, new_height)
}

pub fn target_dimensions(
    source: (u32, u32),
    profile: &SizeProfile,
    policy: ResizePolicy,
) -> (u32, u32) {
    match policy {
        ResizePolicy::FitWithin => fit_within(source, profile.bounding_box()),
        ResizePolicy::Exact => profile.bounding_box(),
    }
}

pub fn resize_image(img: &DynamicImage, profile: &SizeProfile, policy: ResizePolicy) -> DynamicImage {
    let (width, height) = target_dimensions(img.dimensions(), profile, policy);
    if (width, height) == img.dimensions() {
        return img.clone();
    }
    img.resize_exact(width, height, FilterType::Lanczos3)
}

/// Encodes an image into `format` entirely in memory.
pub fn encode_image(
    img: &DynamicImage,
    format: OutputFormat,
    options: &EncodingConfig,
    profile: &str,
) -> Result<Vec<u8>> {
    let encode_err = |detail: String| PipelineError::Encode {
        profile: profile.to_string(),
        detail,
    };

    let mut buffer = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, options.quality);
            img.to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| encode_err(e.to_string()))?;
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                .map_err(|e| encode_err(e.to_string()))?;
            if options.optimize_png {
                buffer = optimize_png(&buffer, options.quality)?;
            }
        }
        OutputFormat::WebP => {
            let normalized = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            normalized
                .write_to(&mut Cursor::new(&mut buffer), ImageFormat::WebP)
                .map_err(|e| encode_err(e.to_string()))?;
        }
    }

    Ok(buffer)
}

fn optimize_png(data: &[u8], quality: u8) -> Result<Vec<u8>> {
    let mut oxipng_options = Options::from_preset(OXIPNG_PRESET);

    // 根据质量设置调整压缩级别
    if quality >= 90 {
        oxipng_options.deflate = Deflaters::Zopfli {
            iterations: NonZeroU8::new(ZOPFLI_ITERATIONS).unwrap_or(NonZeroU8::MIN),
        };
    } else if quality >= 70 {
        oxipng_options.deflate = Deflaters::Libdeflater {
            compression: LIBDEFLATER_HIGH_LEVEL,
        };
    } else {
        oxipng_options.deflate = Deflaters::Libdeflater {
            compression: LIBDEFLATER_LOW_LEVEL,
        };
    }

    oxipng::optimize_from_memory(data, &oxipng_options)
        .map_err(|e| PipelineError::PngOptimization(e.to_string()))
}

/// Turns one source into one encoded buffer per size profile.
#[derive(Debug)]
pub struct ImageTransformer {
    profiles: Vec<SizeProfile>,
    policy: ResizePolicy,
    encoding: EncodingConfig,
    watermark: Option<Watermark>,
}

impl ImageTransformer {
    pub fn new(
        profiles: Vec<SizeProfile>,
        policy: ResizePolicy,
        encoding: EncodingConfig,
        watermark: Option<Watermark>,
    ) -> Self {
        Self {
            profiles,
            policy,
            encoding,
            watermark,
        }
    }

    /// Builds a transformer from a validated config, resolving the watermark
    /// font once for the whole run.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.profiles.clone(),
            config.resize_policy,
            config.encoding.clone(),
            Watermark::from_config(&config.watermark),
        )
    }

    pub fn profiles(&self) -> &[SizeProfile] {
        &self.profiles
    }

    /// Renders every profile for `source`, in profile order. Either all
    /// variants are produced or the call fails.
    pub fn transform(&self, source: &SourceImage) -> Result<Vec<RenderedVariant>> {
        let (width, height) = source.dimensions();
        tracing::debug!(
            path = %source.path.display(),
            format = %source.format,
            width,
            height,
            size_bytes = source.file_size,
            "Decoded source image"
        );
        self.profiles
            .iter()
            .map(|profile| self.render(source, profile))
            .collect()
    }

    /// Decodes `path` and renders it. A decode failure yields no variants.
    pub fn transform_path(&self, path: &Path) -> Result<Vec<RenderedVariant>> {
        let source = SourceImage::open(path)?;
        self.transform(&source)
    }

    fn render(&self, source: &SourceImage, profile: &SizeProfile) -> Result<RenderedVariant> {
        let mut img = resize_image(&source.image, profile, self.policy);
        if let Some(watermark) = &self.watermark {
            img = watermark.apply(&img);
        }

        let format = profile.encoding.resolve(source.format);
        let bytes = encode_image(&img, format, &self.encoding, &profile.name)?;
        let (width, height) = img.dimensions();

        tracing::debug!(
            path = %source.path.display(),
            profile = %profile.name,
            format = %format,
            width,
            height,
            size_bytes = bytes.len(),
            "Rendered variant"
        );

        Ok(RenderedVariant {
            profile: profile.name.clone(),
            format,
            width,
            height,
            bytes,
        })
    }
}

/// File name of a variant: `{profile}_{source file name}`, with the extension
/// swapped when the variant's encoding differs from the source's.
pub fn variant_file_name(profile: &str, source: &Path, format: OutputFormat) -> Result<String> {
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PipelineError::UnsupportedFormat("Invalid file name".to_string()))?;

    if format.matches_extension(source) {
        return Ok(format!("{}_{}", profile, file_name));
    }

    let stem = source
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);
    Ok(format!("{}_{}.{}", profile, stem, format.extension()))
}

/// Writes rendered variants of `source` into `output_dir`, returning the
/// written paths.
pub fn save_variants(
    source: &Path,
    variants: &[RenderedVariant],
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .map_err(|_| PipelineError::DirectoryCreationFailed(output_dir.to_path_buf()))?;

    variants
        .iter()
        .map(|variant| {
            let name = variant_file_name(&variant.profile, source, variant.format)?;
            let path = output_dir.join(name);
            fs::write(&path, &variant.bytes)?;
            Ok(path)
        })
        .collect()
}
