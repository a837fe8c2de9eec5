use anyhow::{Context, Result};
use clap::Parser;
use img_variants::cli::{load_config, Args, Commands, RenderArgs, RunArgs};
use img_variants::config::join_prefix;
use img_variants::utils::format_file_size;
use img_variants::{
    logger, run_pipeline, save_variants, ImageTransformer, ObjectSink, ObjectStoreSink,
};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.quiet, args.verbose, args.json_logs);

    match args.command {
        Commands::Run(run) => run_batch(&run),
        Commands::Transform {
            input,
            output_dir,
            config,
            render,
        } => transform_single(&input, &output_dir, config.as_deref(), &render),
        Commands::Profiles { config } => show_profiles(config),
    }
}

fn run_batch(run: &RunArgs) -> Result<()> {
    let mut config = load_config(run.config.as_deref()).context("Failed to load configuration")?;
    run.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let sink = ObjectStoreSink::from_config(&config.store)
        .context("Failed to configure the object store")?;
    tracing::info!(store = %sink.describe(), "Starting batch");

    let report = run_pipeline(&config, &sink).context("Batch aborted")?;

    if !logger::is_quiet() {
        report.print_summary();
    }
    Ok(())
}

fn transform_single(
    input: &Path,
    output_dir: &Path,
    config_path: Option<&Path>,
    render: &RenderArgs,
) -> Result<()> {
    let mut config = load_config(config_path).context("Failed to load configuration")?;
    render.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let transformer = ImageTransformer::from_config(&config);
    let variants = transformer
        .transform_path(input)
        .with_context(|| format!("Failed to transform {}", input.display()))?;
    let written = save_variants(input, &variants, output_dir)
        .with_context(|| format!("Failed to write variants to {}", output_dir.display()))?;

    if !logger::is_quiet() {
        println!("🖼️  {}", input.display());
        for (variant, path) in variants.iter().zip(&written) {
            println!(
                "  ✅ {:<10} {}x{} {} -> {}",
                variant.profile,
                variant.width,
                variant.height,
                format_file_size(variant.bytes.len() as u64),
                path.display()
            );
        }
    }
    Ok(())
}

fn show_profiles(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    println!("📐 Size profiles ({} resize):", match config.resize_policy {
        img_variants::ResizePolicy::FitWithin => "fit-within",
        img_variants::ResizePolicy::Exact => "exact",
    });
    for profile in &config.profiles {
        println!(
            "  {:<10} {:>5}x{:<5} {}",
            profile.name, profile.width, profile.height, profile.encoding
        );
    }
    match config.watermark.active_text() {
        Some(text) => println!("💧 Watermark: \"{}\"", text),
        None => println!("💧 Watermark: disabled"),
    }
    println!(
        "🔑 Variant keys: {}",
        join_prefix(&config.store.image_prefix, "<profile>_<file name>")
    );
    println!("🗜️  Archive key: {}", config.store.archive_key());
    Ok(())
}
