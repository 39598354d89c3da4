use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

use slidecast::config::{AvatarStyle, PipelineConfig, VideoQuality, VoiceType};

#[derive(Parser, Debug)]
#[command(name = "slidecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a deck into a narrated MP4 (requires `ffmpeg` and `ffprobe` on PATH).
    Render(RenderArgs),
    /// Print the narration text extracted from each slide.
    Extract(ExtractArgs),
    /// Print deck structure: slide count, page size, shapes per slide.
    Probe(ExtractArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input .pptx deck.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Pipeline configuration JSON. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Narration voice.
    #[arg(long, value_enum)]
    voice: Option<VoiceChoice>,

    /// Presenter card style.
    #[arg(long, value_enum)]
    style: Option<StyleChoice>,

    /// Output resolution.
    #[arg(long, value_enum)]
    quality: Option<QualityChoice>,

    /// Speech rate multiplier.
    #[arg(long)]
    rate: Option<f64>,

    /// Process slides in parallel.
    #[arg(long)]
    parallel: bool,

    /// Worker count for parallel runs.
    #[arg(long)]
    threads: Option<usize>,

    /// Also write a short presenter clip announcing completion next to the output.
    #[arg(long)]
    closing_avatar: bool,
}

#[derive(Parser, Debug)]
struct ExtractArgs {
    /// Input .pptx deck.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VoiceChoice {
    Female,
    Male,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StyleChoice {
    Default,
    Professional,
    Casual,
    Educational,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QualityChoice {
    #[value(name = "720p")]
    Hd720,
    #[value(name = "1080p")]
    Hd1080,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Extract(args) => cmd_extract(args),
        Command::Probe(args) => cmd_probe(args),
    }
}

fn load_config(args: &RenderArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(voice) = args.voice {
        config.voice = match voice {
            VoiceChoice::Female => VoiceType::Female,
            VoiceChoice::Male => VoiceType::Male,
        };
    }
    if let Some(style) = args.style {
        config.avatar_style = match style {
            StyleChoice::Default => AvatarStyle::Default,
            StyleChoice::Professional => AvatarStyle::Professional,
            StyleChoice::Casual => AvatarStyle::Casual,
            StyleChoice::Educational => AvatarStyle::Educational,
        };
    }
    if let Some(quality) = args.quality {
        config.quality = match quality {
            QualityChoice::Hd720 => VideoQuality::Hd720,
            QualityChoice::Hd1080 => VideoQuality::Hd1080,
        };
    }
    if let Some(rate) = args.rate {
        config.speech_rate = rate;
    }
    if args.parallel {
        config.parallel = true;
    }
    if args.threads.is_some() {
        config.threads = args.threads;
    }
    if args.closing_avatar {
        config.closing_avatar = true;
    }

    Ok(config)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let assembler = slidecast::Assembler::new(config)?;
    let report = assembler.run(&args.in_path, &args.out)?;
    eprintln!(
        "wrote {} ({}/{} slides, {:.1}s)",
        report.output.display(),
        report.slides_succeeded,
        report.slides_total,
        report.duration_secs
    );
    Ok(())
}

fn cmd_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let doc = slidecast::PptxDocument::open(&args.in_path)?;
    for slide in &doc.slides {
        let text = slide.narration_text();
        println!("--- {} ---", slide.label());
        if text.is_empty() {
            println!("(no text)");
        } else {
            println!("{text}");
        }
    }
    Ok(())
}

fn cmd_probe(args: ExtractArgs) -> anyhow::Result<()> {
    let doc = slidecast::PptxDocument::open(&args.in_path)?;
    println!(
        "slides: {}, page: {}x{} EMU",
        doc.slides.len(),
        doc.page_emu.0,
        doc.page_emu.1
    );
    for slide in &doc.slides {
        let titles = slide.shapes.iter().filter(|s| s.is_title()).count();
        println!(
            "{}: {} shapes ({} title)",
            slide.label(),
            slide.shapes.len(),
            titles
        );
    }
    Ok(())
}
