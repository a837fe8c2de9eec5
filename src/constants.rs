pub const DEFAULT_QUALITY: u8 = 80;
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// Maximum source file size in bytes (100MB)
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 16384;

pub const ZOPFLI_ITERATIONS: u8 = 15;
pub const LIBDEFLATER_HIGH_LEVEL: u8 = 12;
pub const LIBDEFLATER_LOW_LEVEL: u8 = 8;
pub const OXIPNG_PRESET: u8 = 4;

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub const DEFAULT_BUCKET: &str = "fotographiya-ai-photo-bucket";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_IMAGE_PREFIX: &str = "processed-images/";
pub const DEFAULT_ARCHIVE_PREFIX: &str = "zipped-files/";
pub const DEFAULT_ARCHIVE_NAME: &str = "processed_images.zip";
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

pub const DEFAULT_SOURCE_DIR: &str = "photos";
pub const DEFAULT_CHECKOUT_DIR: &str = "source-repo";

pub const DEFAULT_WATERMARK_TEXT: &str = "Fotographiya";
pub const DEFAULT_WATERMARK_FONT_SIZE: f32 = 30.0;
pub const DEFAULT_WATERMARK_INSET: u32 = 10;
pub const MAX_WATERMARK_FONT_SIZE: f32 = 1000.0;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Font files probed, in order, when no font is configured or the configured
/// one cannot be loaded.
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "arial.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
