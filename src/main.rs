use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pngbatch::imaging::BorderSegmenter;
use pngbatch::options::RawOptions;
use pngbatch::process::BatchProcessor;
use pngbatch::request::BatchRequest;
use pngbatch::{archive, config, ingest, output};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "pngbatch")]
#[command(version, about = "Batch background removal, resizing and PNG optimization")]
#[command(long_about = "\
Batch background removal, resizing and PNG optimization

Inputs may be image files, directories (searched recursively for images) or
ZIP archives (expanded in place). Every input becomes <name>.png inside one
output ZIP, with a JSON manifest alongside describing each item.

Operations run in a fixed order: background removal, then resize.

Run 'pngbatch gen-config' to generate a documented pngbatch.toml.")]
struct Cli {
    /// Log every pipeline stage
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process images into a ZIP of optimized PNGs
    Process(ProcessArgs),
    /// List the images the inputs contain without processing them
    Check(InputArgs),
    /// Print a stock pngbatch.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct InputArgs {
    /// Image files, directories or ZIP archives
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Settings file (defaults apply when omitted)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ProcessArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Cut out each image's background
    #[arg(long)]
    remove_background: bool,

    /// Resize each image to --width x --height
    #[arg(long)]
    resize: bool,

    /// Target width in pixels (default 400)
    #[arg(long, value_name = "PX")]
    width: Option<u32>,

    /// Target height in pixels (default 400)
    #[arg(long, value_name = "PX")]
    height: Option<u32>,

    /// Set width and height to the larger of the two
    #[arg(long)]
    square: bool,

    /// Request options as JSON, e.g. '{"removeBackground": true}'. Flags override it.
    #[arg(long, value_name = "JSON")]
    options: Option<String>,

    /// Output archive
    #[arg(short, long, default_value = "processed_images.zip")]
    output: PathBuf,

    /// Manifest path (default: the output path with a .json extension)
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,
}

impl ProcessArgs {
    /// JSON options first, then explicit flags on top.
    fn raw_options(&self) -> Result<RawOptions> {
        let mut raw = match &self.options {
            Some(json) => RawOptions::from_json(json).context("invalid --options")?,
            None => RawOptions::default(),
        };
        raw.remove_background |= self.remove_background;
        raw.resize |= self.resize;
        if let Some(width) = self.width {
            raw.width = Some(width.into());
        }
        if let Some(height) = self.height {
            raw.height = Some(height.into());
        }
        if self.square {
            raw.make_square();
        }
        Ok(raw)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pngbatch={log_level}").into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(err) = run(cli.command) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Process(args) => process(args),
        Command::Check(args) => {
            let settings = config::load_settings(args.config.as_deref())?;
            let inputs = read_inputs(&args.inputs)?;
            let items = ingest::ingest(inputs, &settings.archive_limits())?;
            output::print_check_output(&items);
            Ok(())
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(())
        }
    }
}

fn process(args: ProcessArgs) -> Result<()> {
    let settings = config::load_settings(args.input.config.as_deref())
        .context("failed to load settings")?;
    let request = BatchRequest {
        inputs: read_inputs(&args.input.inputs)?,
        options: args.raw_options()?,
    };
    let segmenter = BorderSegmenter::new(settings.segmentation);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_batch_event(&event) {
                println!("{}", line);
            }
        }
    });
    let response = BatchProcessor::new(&settings, &segmenter)
        .with_events(tx)
        .handle(request);
    if printer.join().is_err() {
        tracing::warn!("progress printer stopped early");
    }
    let response = response?;

    output::print_batch_summary(&response.result);
    if response.result.is_empty() {
        bail!("no images found in the given inputs");
    }

    std::fs::write(&args.output, &response.archive.bytes)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    let manifest_path = args
        .manifest
        .unwrap_or_else(|| args.output.with_extension("json"));
    std::fs::write(&manifest_path, response.manifest.to_json()?)
        .with_context(|| format!("failed to write {}", manifest_path.display()))?;

    for line in output::format_written_files(
        &args.output,
        response.archive.names.len(),
        response.archive.bytes.len(),
        &manifest_path,
    ) {
        println!("{}", line);
    }
    Ok(())
}

/// Read every input into `(name, bytes)` pairs, in command-line order.
///
/// Directories are walked in sorted order and contribute image files and
/// ZIPs only; names are relative to the directory given.
fn read_inputs(paths: &[PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
                let name = relative_name(path, entry.path());
                if !entry.file_type().is_file() || !is_candidate(&name) {
                    continue;
                }
                inputs.push((name, read(entry.path())?));
            }
        } else {
            inputs.push((path.display().to_string(), read(path)?));
        }
    }
    Ok(inputs)
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn is_candidate(name: &str) -> bool {
    archive::is_image_name(name) || pngbatch::naming::extension(name).as_deref() == Some("zip")
}
