//! Command-line front end for the logo matching engine.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_circle_mut;
use logomatch_brief::BriefGenerator;
use logomatch_core::GrayFrame;
use logomatch_engine::{ComparisonResult, ComparisonStrategy, DetectorConfig, EngineConfig, ImageSource, MatchEngine};
use logomatch_fast::FastDetector;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "logomatch", version, about = "Feature-based logo matching")]
pub struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compare a captured image against reference logos
    Compare(CompareArgs),
    /// Detect keypoints in an image and draw them
    Detect(DetectArgs),
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Image to check
    #[arg(long, value_name = "FILE")]
    pub captured: PathBuf,

    /// Reference logo, repeatable
    #[arg(long = "reference", value_name = "FILE")]
    pub references: Vec<PathBuf>,

    /// Template logo; defaults to the first reference
    #[arg(long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Engine configuration (.toml or .json)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Write one JPEG overlay per comparison into this directory
    #[arg(long, value_name = "DIR")]
    pub overlay_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DetectArgs {
    #[arg(value_name = "FILE")]
    pub image: PathBuf,

    /// Output image; defaults to `<stem>_keypoints.png` next to the input
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Engine configuration whose detector section is used
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Features,
    Embedding,
}

impl From<StrategyArg> for ComparisonStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Features => ComparisonStrategy::Features,
            StrategyArg::Embedding => ComparisonStrategy::Embedding,
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Compare(args) => compare(args).await,
        Command::Detect(args) => detect(args),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

async fn compare(args: CompareArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }

    let Some(template) = args.template.clone().or_else(|| args.references.first().cloned()) else {
        bail!("nothing to compare: pass --reference or --template");
    };

    let engine = MatchEngine::builder()
        .config(config)
        .template(ImageSource::path(template))
        .build()?;
    engine.ensure_ready().await.context("vision runtime failed to load")?;

    let captured = ImageSource::path(&args.captured);
    let results = if args.references.is_empty() {
        vec![engine.compare_with_template(&captured).await?]
    } else {
        let references: Vec<ImageSource> = args.references.iter().map(ImageSource::path).collect();
        engine.compare_against_all(&captured, &references).await?
    };

    if let Some(dir) = &args.overlay_dir {
        write_overlays(dir, &results)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            let verdict = if result.is_match { "MATCH" } else { "-" };
            println!("{:<6} {}  {}", verdict, result.source_image, result.summary);
        }
    }

    info!(ledger = ?engine.ledger().stats(), "comparison finished");
    Ok(())
}

/// Overlay file name for the `index`-th result
pub fn overlay_name(index: usize, source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("reference");
    format!("{index:02}-{stem}.jpg")
}

fn write_overlays(dir: &Path, results: &[ComparisonResult]) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for (index, result) in results.iter().enumerate() {
        if let Some(jpeg) = &result.overlay {
            let path = dir.join(overlay_name(index, &result.source_image));
            std::fs::write(&path, jpeg).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "overlay written");
        }
    }
    Ok(())
}

/// `<stem>_keypoints.png` beside `input`
pub fn default_detect_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    input.with_file_name(format!("{stem}_keypoints.png"))
}

fn detect(args: DetectArgs) -> Result<()> {
    let detector_cfg: DetectorConfig = load_config(args.config.as_deref())?.detector;
    let img = image::open(&args.image)
        .with_context(|| format!("opening {}", args.image.display()))?
        .to_luma8();
    let (w, h) = img.dimensions();
    let frame = GrayFrame::new(w as usize, h as usize, img.as_raw().clone())?;

    let patch_size = detector_cfg.core.patch_size;
    let detector = FastDetector::new(detector_cfg)?;
    let brief = BriefGenerator::new(patch_size)?;

    // Time the full pipeline
    let t0 = Instant::now();
    let kps = detector.detect_keypoints(&frame);
    let desc = brief.generate_descriptors(&frame, &kps);
    let elapsed = t0.elapsed();

    println!("Time taken: {:.2?}", elapsed);
    println!("Detected {} keypoints", kps.len());
    println!("Generated {} descriptors", desc.len());

    let mut output: RgbaImage = image::DynamicImage::ImageLuma8(img).into_rgba8();
    for kp in &kps {
        draw_hollow_circle_mut(&mut output, (kp.x as i32, kp.y as i32), 3, Rgba([255, 0, 0, 255]));
    }

    let out_path = args.output.unwrap_or_else(|| default_detect_output(&args.image));
    output
        .save(&out_path)
        .with_context(|| format!("saving {}", out_path.display()))?;
    println!("Saved result image as {}", out_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_compare() {
        let cli = Cli::try_parse_from([
            "logomatch",
            "-vv",
            "compare",
            "--captured",
            "frame.jpg",
            "--reference",
            "a.png",
            "--reference",
            "b.png",
            "--strategy",
            "embedding",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), "trace");
        let Command::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(args.references, vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
        assert_eq!(args.strategy, Some(StrategyArg::Embedding));
        assert!(args.json);
        assert!(args.template.is_none());
    }

    #[test]
    fn test_parse_detect() {
        let cli = Cli::try_parse_from(["logomatch", "detect", "logo.png", "-o", "out.png"]).unwrap();
        assert_eq!(cli.log_level(), "info");
        let Command::Detect(args) = cli.command else {
            panic!("expected detect");
        };
        assert_eq!(args.output, Some(PathBuf::from("out.png")));
    }

    #[test]
    fn test_compare_requires_captured() {
        assert!(Cli::try_parse_from(["logomatch", "compare", "--reference", "a.png"]).is_err());
    }

    #[test]
    fn test_output_names() {
        assert_eq!(overlay_name(3, "/refs/acme.png"), "03-acme.jpg");
        assert_eq!(
            default_detect_output(Path::new("/tmp/lenna.png")),
            PathBuf::from("/tmp/lenna_keypoints.png")
        );
    }

    #[tokio::test]
    async fn test_compare_without_inputs_fails() {
        let args = CompareArgs {
            captured: PathBuf::from("frame.jpg"),
            references: Vec::new(),
            template: None,
            config: None,
            strategy: None,
            overlay_dir: None,
            json: false,
        };
        assert!(compare(args).await.is_err());
    }

    #[test]
    fn test_detect_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("checker.png");
        let img = image::GrayImage::from_fn(96, 96, |x, y| image::Luma([if (x / 12 + y / 12) % 2 == 0 { 30 } else { 220 }]));
        img.save(&input).unwrap();

        detect(DetectArgs {
            image: input.clone(),
            output: None,
            config: None,
        })
        .unwrap();
        assert!(default_detect_output(&input).exists());
    }
}
