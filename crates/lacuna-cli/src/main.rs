mod convert;
mod summary;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use lacuna_core::consts::LOW_RESOLUTION_PASSES_AUTO;
use lacuna_core::settings::{OutputBlenderKind, PatchBlenderKind, PatchSourceKind};
use lacuna_core::{complete, MaskLod, Settings};

#[derive(Parser)]
#[command(name = "lacuna", about = "Image completion: fills a masked region with patches from the rest of the image")]
#[command(version)]
struct Cli {
    /// Input image file
    #[arg(short, long)]
    input: PathBuf,

    /// Grayscale mask image: black = fill, white = known, mid-gray = ignore
    #[arg(short, long, required_unless_present = "show_settings")]
    mask: Option<PathBuf>,

    /// Output image file
    #[arg(short, long, required_unless_present = "show_settings")]
    output: Option<PathBuf>,

    /// Print the suggested settings for the input image and exit
    #[arg(long)]
    show_settings: bool,

    /// Save each low-resolution pass as a separate <output>-scale-N image
    #[arg(long)]
    debug_low_res: bool,

    /// Max low-resolution passes: "auto", or an integer >= 0
    #[arg(long)]
    low_res_passes: Option<String>,

    /// Priority-BP iterations per pass (>= 1)
    #[arg(long)]
    iterations: Option<u32>,

    /// Lattice gap width
    #[arg(long)]
    gap_x: Option<i32>,

    /// Lattice gap height
    #[arg(long)]
    gap_y: Option<i32>,

    /// Min labels kept per node after pruning
    #[arg(long)]
    labels_min: Option<usize>,

    /// Max labels kept per node after pruning
    #[arg(long)]
    labels_max: Option<usize>,

    /// How patch pixels are obtained
    #[arg(long, value_enum)]
    patch_source: Option<PatchSourceArg>,

    /// How overlapping patches blend
    #[arg(long, value_enum)]
    patch_blender: Option<PatchBlenderArg>,

    /// How patches merge into the original image
    #[arg(long, value_enum)]
    output_blender: Option<OutputBlenderArg>,

    /// Read previously solved patches instead of solving
    #[arg(long)]
    patches_in: Option<PathBuf>,

    /// Write the solved patches for later re-compositing
    #[arg(long)]
    patches_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PatchSourceArg {
    Normal,
    DebugPatchOrder,
}

#[derive(Clone, Copy, ValueEnum)]
enum PatchBlenderArg {
    Priority,
    None,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputBlenderArg {
    SoftMask,
    None,
    DebugSoftMaskIntensity,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let input = convert::load_rgb(&cli.input)?;
    println!(
        "Loaded {}x{} image from {}",
        input.width(),
        input.height(),
        cli.input.display()
    );

    let settings = build_settings(cli, input.width(), input.height())?;

    if cli.show_settings {
        return summary::print_settings(&settings);
    }

    let mask_path = cli.mask.as_ref().expect("clap requires --mask here");
    let output_path = cli.output.as_ref().expect("clap requires --output here");

    let gray = convert::load_gray(mask_path)?;
    let mask = MaskLod::from_gray(&gray, input.width(), input.height())?;

    let mut patches_reader = match &cli.patches_in {
        Some(path) => Some(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => None,
    };
    let mut patches_writer = match &cli.patches_out {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => None,
    };

    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static template is valid"),
    );
    spinner.set_message(if patches_reader.is_some() {
        "Compositing from saved patches..."
    } else {
        "Solving..."
    });
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = complete(
        &settings,
        &input,
        &mask,
        patches_reader
            .as_mut()
            .map(|r| r as &mut dyn std::io::Read),
        patches_writer
            .as_mut()
            .map(|w| w as &mut dyn std::io::Write),
    );
    spinner.finish_and_clear();
    let output = result.context("Completion failed")?;

    convert::save_rgb(&output.image, output_path)?;
    println!(
        "{} {} ({} patches)",
        style("Saved").green().bold(),
        output_path.display(),
        output.patches.len()
    );

    for (index, pass_image) in output.pass_images.iter().enumerate() {
        // Passes unwind coarsest-first; number them by scale depth.
        let depth = output.pass_images.len() - index;
        let path = pass_image_path(output_path, depth);
        convert::save_rgb(pass_image, &path)?;
        println!("Saved low-resolution pass {}", path.display());
    }

    Ok(())
}

fn build_settings(cli: &Cli, width: usize, height: usize) -> Result<Settings> {
    let mut settings = match (cli.gap_x, cli.gap_y) {
        (None, None) => Settings::for_image(width, height),
        (gap_x, gap_y) => {
            let suggested = Settings::for_image(width, height);
            Settings::with_lattice_gap(
                gap_x.unwrap_or(suggested.lattice_gap_x),
                gap_y.unwrap_or(suggested.lattice_gap_y),
            )
        }
    };

    settings.debug_low_resolution_passes = cli.debug_low_res;

    if let Some(passes) = &cli.low_res_passes {
        settings.low_resolution_passes_max = if passes == "auto" {
            LOW_RESOLUTION_PASSES_AUTO
        } else {
            passes
                .parse()
                .with_context(|| format!("Invalid --low-res-passes value '{passes}'"))?
        };
    }
    if let Some(iterations) = cli.iterations {
        settings.num_iterations = iterations;
    }
    if let Some(labels_min) = cli.labels_min {
        settings.post_prune_labels_min = labels_min;
    }
    if let Some(labels_max) = cli.labels_max {
        settings.post_prune_labels_max = labels_max;
    }
    if let Some(source) = cli.patch_source {
        settings.compositor_patch_source = match source {
            PatchSourceArg::Normal => PatchSourceKind::Normal,
            PatchSourceArg::DebugPatchOrder => PatchSourceKind::DebugPatchOrder,
        };
    }
    if let Some(blender) = cli.patch_blender {
        settings.compositor_patch_blender = match blender {
            PatchBlenderArg::Priority => PatchBlenderKind::Priority,
            PatchBlenderArg::None => PatchBlenderKind::None,
        };
    }
    if let Some(blender) = cli.output_blender {
        settings.compositor_output_blender = match blender {
            OutputBlenderArg::SoftMask => OutputBlenderKind::SoftMask,
            OutputBlenderArg::None => OutputBlenderKind::None,
            OutputBlenderArg::DebugSoftMaskIntensity => OutputBlenderKind::DebugSoftMaskIntensity,
        };
    }

    if let Err(error) = settings.validate() {
        for issue in &error.issues {
            eprintln!("{} {:?} {}", style("invalid:").red(), issue.field, issue.message);
        }
        bail!("Invalid settings");
    }

    Ok(settings)
}

/// out.png -> out-scale-2.png
fn pass_image_path(output: &Path, depth: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let name = match output.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}-scale-{depth}.{ext}"),
        None => format!("{stem}-scale-{depth}"),
    };
    output.with_file_name(name)
}
