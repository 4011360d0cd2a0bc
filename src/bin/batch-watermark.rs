use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use batch_watermark::settings::WatermarkKind;
use batch_watermark::text::parse_hex_color;
use batch_watermark::{
    spawn, BatchReport, BatchState, JobDescription, JobResult, JobStatus, OpacityPercent,
    Placement, ProcessOptions, Settings, SizePercent, TextContent, TextLayout, TextStyle,
    TextWatermark, WatermarkSpec,
};

#[derive(Clone, Copy, ValueEnum)]
enum StyleArg {
    Filled,
    Outlined,
    Hollow,
}

impl From<StyleArg> for TextStyle {
    fn from(value: StyleArg) -> Self {
        match value {
            StyleArg::Filled => Self::Filled,
            StyleArg::Outlined => Self::Outlined,
            StyleArg::Hollow => Self::Hollow,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Single,
    Multi,
}

impl From<LayoutArg> for TextLayout {
    fn from(value: LayoutArg) -> Self {
        match value {
            LayoutArg::Single => Self::SingleLine,
            LayoutArg::Multi => Self::MultiLine,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PlacementArg {
    Tiled,
    Single,
}

impl From<PlacementArg> for Placement {
    fn from(value: PlacementArg) -> Self {
        match value {
            PlacementArg::Tiled => Self::Tiled,
            PlacementArg::Single => Self::Single,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "batch-watermark",
    about = "Tile an image or text watermark across every image in a folder",
    version,
    after_help = "Simple usage: batch-watermark <input_dir> -o <output_dir> --image logo.png\n\n\
                  Opacity below 20% is raised to 20% so the watermark always stays visible."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input directory (default: last used)
    input: Option<PathBuf>,

    /// Output directory (default: last used)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Watermark image file
    #[arg(long, conflicts_with_all = ["text", "sender", "receiver"])]
    image: Option<PathBuf>,

    /// Watermark text
    #[arg(long, conflicts_with_all = ["sender", "receiver"])]
    text: Option<String>,

    /// Sender name (composited with --receiver)
    #[arg(long)]
    sender: Option<String>,

    /// Receiver name (composited with --sender)
    #[arg(long)]
    receiver: Option<String>,

    /// Font family name or font file path
    #[arg(long)]
    font: Option<String>,

    /// Font size in pixels
    #[arg(long)]
    font_size: Option<f32>,

    /// Text colour as hex, e.g. "#FF0000"
    #[arg(long)]
    color: Option<String>,

    /// Text style
    #[arg(long, value_enum)]
    style: Option<StyleArg>,

    /// Text layout
    #[arg(long, value_enum)]
    layout: Option<LayoutArg>,

    /// Wrap multi-line text at this width in pixels
    #[arg(long)]
    wrap_width: Option<u32>,

    /// Outline thickness in pixels
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u8).range(1..=2))]
    stroke_width: u8,

    /// Watermark size, percent of the smaller image dimension (0-100]
    #[arg(short, long)]
    size: Option<f32>,

    /// Watermark opacity percent (20-100)
    #[arg(long)]
    opacity: Option<u8>,

    /// Repeat the watermark or draw it once (image: bottom-right, text: centred)
    #[arg(long, value_enum)]
    placement: Option<PlacementArg>,

    /// Fall back to a default font if the requested one is missing
    #[arg(long)]
    allow_font_fallback: bool,

    /// JPEG output quality (1-100)
    #[arg(long, default_value = "95", value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Settings file holding last-used values
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Save the effective settings back to the settings file
    #[arg(long, requires = "settings")]
    save_settings: bool,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path).unwrap_or_else(|e| {
            eprintln!("Error: Failed to load settings: {e}");
            process::exit(1);
        }),
        None => Settings::default(),
    };
    merge_cli(&cli, &mut settings);

    let job = match build_job(&cli, &settings) {
        Ok(job) => job,
        Err(msg) => {
            eprintln!("Error: {msg}");
            process::exit(1);
        }
    };

    settings.size = job.size;
    if let WatermarkSpec::Text(text) = &job.watermark {
        settings.color = text.color;
    }

    if !cli.quiet {
        eprintln!(
            "Watermarking {} -> {} (size {}%, opacity {:.0}%)",
            job.input_dir.display(),
            job.output_dir.display(),
            job.size.get(),
            job.opacity.scale() * 100.0
        );
        eprintln!();
    }

    let handle = match spawn(job) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Fatal: Failed to start batch: {e}");
            process::exit(1);
        }
    };

    for p in handle.progress() {
        if cli.verbose && !cli.quiet {
            eprintln!("  [{}/{}] {}", p.current, p.total, p.path.display());
        }
    }

    let report = match handle.join() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Fatal: {e}");
            process::exit(1);
        }
    };

    for r in &report.results {
        print_result(r, &cli);
    }
    print_summary(&report, &cli);

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error: Failed to serialize report: {e}"),
        }
    }

    if cli.save_settings {
        if let Some(path) = &cli.settings {
            if let Err(e) = settings.save(path) {
                eprintln!("Error: Failed to save settings: {e}");
            }
        }
    }

    if report.failed() > 0 {
        process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.quiet {
        "error"
    } else if cli.verbose {
        "batch_watermark=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Command-line values override the loaded settings.
fn merge_cli(cli: &Cli, settings: &mut Settings) {
    if let Some(input) = &cli.input {
        settings.input_dir = Some(input.clone());
    }
    if let Some(output) = &cli.output {
        settings.output_dir = Some(output.clone());
    }
    if let Some(image) = &cli.image {
        settings.watermark_kind = WatermarkKind::Image;
        settings.watermark_image = Some(image.clone());
    }
    if let Some(text) = &cli.text {
        settings.watermark_kind = WatermarkKind::Text;
        settings.text = text.clone();
        settings.sender.clear();
        settings.receiver.clear();
    }
    if cli.sender.is_some() || cli.receiver.is_some() {
        settings.watermark_kind = WatermarkKind::Text;
        settings.text.clear();
        settings.sender = cli.sender.clone().unwrap_or_default();
        settings.receiver = cli.receiver.clone().unwrap_or_default();
    }
    if let Some(font) = &cli.font {
        settings.font = font.clone();
    }
    if let Some(font_size) = cli.font_size {
        settings.font_size = font_size;
    }
    if let Some(style) = cli.style {
        settings.style = style.into();
    }
    if let Some(layout) = cli.layout {
        settings.layout = layout.into();
    }
    if let Some(opacity) = cli.opacity {
        settings.opacity = OpacityPercent(opacity);
    }
    if let Some(placement) = cli.placement {
        settings.placement = placement.into();
    }
}

fn build_job(cli: &Cli, settings: &Settings) -> Result<JobDescription, String> {
    let input_dir = settings
        .input_dir
        .clone()
        .ok_or("Input directory is required")?;
    let output_dir = settings
        .output_dir
        .clone()
        .ok_or("Output directory is required (-o <output_dir>)")?;
    if !input_dir.is_dir() {
        return Err(format!(
            "Input directory does not exist: {}",
            input_dir.display()
        ));
    }

    let size = match cli.size {
        Some(s) => SizePercent::new(s).map_err(|e| e.to_string())?,
        None => settings.size,
    };

    let color = match &cli.color {
        Some(hex) => parse_hex_color(hex)
            .ok_or_else(|| format!("Color must be a 6-digit hex like FF0000, got '{hex}'"))?,
        None => settings.color,
    };

    let watermark = match settings.watermark_kind {
        WatermarkKind::Image => WatermarkSpec::Image {
            path: settings
                .watermark_image
                .clone()
                .ok_or("Specify --image <file> or --text <text>")?,
        },
        WatermarkKind::Text => {
            let content = if settings.text.is_empty() {
                TextContent::SenderReceiver {
                    sender: settings.sender.clone(),
                    receiver: settings.receiver.clone(),
                }
            } else {
                TextContent::Plain(settings.text.clone())
            };
            WatermarkSpec::Text(TextWatermark {
                content,
                font: settings.font.clone(),
                font_size: settings.font_size,
                color,
                style: settings.style,
                layout: settings.layout,
                wrap_width: cli.wrap_width,
                stroke_width: cli.stroke_width,
            })
        }
    };

    Ok(JobDescription {
        input_dir,
        output_dir,
        watermark,
        size,
        opacity: settings.opacity,
        options: ProcessOptions {
            allow_font_fallback: cli.allow_font_fallback,
            jpeg_quality: cli.jpeg_quality,
            placement: settings.placement,
        },
    })
}

fn print_result(result: &JobResult, cli: &Cli) {
    let filename = result.file_name();
    match &result.status {
        JobStatus::Success => {
            if !cli.quiet {
                eprintln!("[OK] {filename}");
            }
        }
        JobStatus::Failed { kind, reason } => {
            eprintln!("[FAIL] {filename}: {reason}");
            if cli.verbose {
                eprintln!("  -> {kind:?}");
            }
        }
    }
}

fn print_summary(report: &BatchReport, cli: &Cli) {
    if report.total == 0 {
        eprintln!("No supported image files found in the input folder.");
        return;
    }
    if cli.quiet && report.failed() == 0 {
        return;
    }

    eprintln!();
    eprint!("[Summary] Processed: {}", report.succeeded);
    if report.failed() > 0 {
        eprint!(", Failed: {}", report.failed());
    }
    eprintln!(" (Total: {})", report.total);
    if report.state == BatchState::Cancelled {
        eprintln!("Batch was cancelled before all files were processed.");
    }
}
