use crate::config::{
    PipelineConfig, ResizePolicy, SizeProfile, SourceConfig, StoreBackend, WatermarkStyle,
};
use crate::constants::DEFAULT_CHECKOUT_DIR;
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "img-variants",
    about = "Batch image variant generator with object store upload and archiving",
    long_about = "img-variants turns a folder (or git repository) of photos into resized, watermarked \
                  variants for each size profile, uploads them to an object store, and bundles \
                  everything that was stored into a single zip archive.",
    version,
    after_help = "EXAMPLES:\n  \
    img-variants run --source ./photos --bucket my-bucket\n  \
    img-variants run --repo https://github.com/me/photos.git --store local --store-root ./out\n  \
    img-variants transform photo.jpg ./variants --profile thumb=256x256:png\n  \
    img-variants profiles --config pipeline.toml"
)]
pub struct Args {
    #[arg(short = 'q', long, global = true, help = "Only print warnings and errors")]
    pub quiet: bool,

    #[arg(short = 'v', long, global = true, help = "Verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Process every source image and upload the variants",
        long_about = "Enumerate the source, render every size profile for each image, upload the \
                      variants and build the archive. Per-image and per-upload failures are logged \
                      and skipped; only configuration and source errors abort the run."
    )]
    Run(RunArgs),

    #[command(
        about = "Render the variants of one image into a local directory",
        long_about = "Render every size profile for a single image and write the results to a \
                      directory, without touching the object store."
    )]
    Transform {
        #[arg(help = "Source image path")]
        input: PathBuf,

        #[arg(help = "Directory that receives the variants")]
        output_dir: PathBuf,

        #[arg(short = 'c', long, help = "TOML configuration file")]
        config: Option<PathBuf>,

        #[command(flatten)]
        render: RenderArgs,
    },

    #[command(about = "List the configured size profiles")]
    Profiles {
        #[arg(short = 'c', long, help = "TOML configuration file")]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
pub struct RunArgs {
    #[arg(short = 'c', long, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        short = 's',
        long,
        help = "Source directory or glob pattern",
        conflicts_with = "repo"
    )]
    pub source: Option<String>,

    #[arg(short = 'r', long, help = "Walk the source directory recursively")]
    pub recursive: bool,

    #[arg(long, help = "Git repository to clone (or pull) and walk")]
    pub repo: Option<String>,

    #[arg(long, requires = "repo", help = "Checkout directory for --repo")]
    pub checkout_dir: Option<PathBuf>,

    #[arg(long, requires = "repo", help = "Branch to clone for --repo")]
    pub branch: Option<String>,

    #[arg(long, help = "Store backend (s3, local, memory)")]
    pub store: Option<StoreBackend>,

    #[arg(long, env = "IMG_VARIANTS_BUCKET", help = "Bucket name for the s3 backend")]
    pub bucket: Option<String>,

    #[arg(
        long,
        help = "Bucket region",
        long_help = "Bucket region. Overrides the region from the configuration file, \
                     which in turn takes precedence over AWS_REGION."
    )]
    pub region: Option<String>,

    #[arg(long, help = "Endpoint of an S3-compatible provider")]
    pub endpoint: Option<String>,

    #[arg(long, help = "Root directory for the local backend")]
    pub store_root: Option<PathBuf>,

    #[arg(long, help = "Key prefix for the variants")]
    pub image_prefix: Option<String>,

    #[arg(long, help = "Key prefix for the archive")]
    pub archive_prefix: Option<String>,

    #[arg(long, help = "File name of the archive")]
    pub archive_name: Option<String>,

    #[arg(long, help = "Do not build the archive")]
    pub no_archive: bool,

    #[arg(long, help = "Skip the store reachability check before the batch")]
    pub no_preflight: bool,

    #[arg(long, help = "Per-request timeout in seconds (0 disables)")]
    pub timeout: Option<u64>,

    #[arg(
        short = 'j',
        long,
        help = "Images processed concurrently (default: 1)",
        long_help = "Number of images processed at the same time. \
                     1 keeps the run strictly sequential."
    )]
    pub jobs: Option<usize>,

    #[command(flatten)]
    pub render: RenderArgs,
}

/// Options shared by every command that renders variants.
#[derive(clap::Args)]
pub struct RenderArgs {
    #[arg(
        short = 'p',
        long = "profile",
        help = "Size profile, repeatable (name=WIDTHxHEIGHT[:encoding])",
        long_help = "Replaces the configured size profiles. Encoding is same-as-source, \
                     jpeg, png or webp. Example: --profile web=1920x1080 --profile print=300x300:png"
    )]
    pub profiles: Vec<SizeProfile>,

    #[arg(long, help = "Resize policy (fit-within, exact)")]
    pub resize_policy: Option<ResizePolicy>,

    #[arg(
        short = 'Q',
        long,
        help = "Encoding quality (1-100, default: 80)",
        long_help = "Encoding quality from 1 (lowest) to 100 (highest). \
                     For PNG: >=90 uses Zopfli, >=70 uses high compression, <70 uses standard compression."
    )]
    pub quality: Option<u8>,

    #[arg(long, help = "Disable the watermark")]
    pub no_watermark: bool,

    #[arg(long, help = "Watermark text")]
    pub watermark_text: Option<String>,

    #[arg(long, help = "TrueType font for the watermark")]
    pub watermark_font: Option<PathBuf>,

    #[arg(long, help = "Watermark style (opaque-black, translucent-white)")]
    pub watermark_style: Option<WatermarkStyle>,
}

impl RenderArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if !self.profiles.is_empty() {
            config.profiles = self.profiles.clone();
        }
        if let Some(policy) = self.resize_policy {
            config.resize_policy = policy;
        }
        if let Some(quality) = self.quality {
            config.encoding.quality = quality;
        }
        if self.no_watermark {
            config.watermark.enabled = false;
        }
        if let Some(text) = &self.watermark_text {
            config.watermark.text = text.clone();
        }
        if let Some(font) = &self.watermark_font {
            config.watermark.font_path = Some(font.clone());
        }
        if let Some(style) = self.watermark_style {
            config.watermark.apply_style(style);
        }
    }
}

impl RunArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(url) = &self.repo {
            let (mut checkout_dir, mut branch) = match &config.source {
                SourceConfig::Repository {
                    checkout_dir,
                    branch,
                    ..
                } => (checkout_dir.clone(), branch.clone()),
                SourceConfig::Local { .. } => (PathBuf::from(DEFAULT_CHECKOUT_DIR), None),
            };
            if let Some(dir) = &self.checkout_dir {
                checkout_dir = dir.clone();
            }
            if self.branch.is_some() {
                branch = self.branch.clone();
            }
            config.source = SourceConfig::Repository {
                url: url.clone(),
                checkout_dir,
                branch,
            };
        } else if let Some(path) = &self.source {
            config.source = SourceConfig::Local {
                path: path.clone(),
                recursive: self.recursive,
            };
        } else if let SourceConfig::Local { recursive, .. } = &mut config.source {
            *recursive |= self.recursive;
        }

        let store = &mut config.store;
        if let Some(backend) = self.store {
            store.backend = backend;
        }
        if let Some(bucket) = &self.bucket {
            store.bucket = bucket.clone();
        }
        if let Some(region) = &self.region {
            store.region = region.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            store.endpoint = Some(endpoint.clone());
        }
        if let Some(root) = &self.store_root {
            store.root = Some(root.clone());
        }
        if let Some(prefix) = &self.image_prefix {
            store.image_prefix = prefix.clone();
        }
        if let Some(prefix) = &self.archive_prefix {
            store.archive_prefix = prefix.clone();
        }
        if let Some(name) = &self.archive_name {
            store.archive_name = name.clone();
        }
        if let Some(timeout) = self.timeout {
            store.request_timeout_secs = timeout;
        }
        if self.no_preflight {
            store.preflight = false;
        }

        if self.no_archive {
            config.build_archive = false;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }

        self.render.apply(config);
    }
}

/// Loads the config file when given, otherwise the built-in defaults.
pub fn load_config(path: Option<&std::path::Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path),
        None => Ok(PipelineConfig::default()),
    }
}
