//! PDF Crop CLI tool
//!
//! A command-line tool for cropping PDF pages into several output pages.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use glob::glob;

use pdf_crop::{
    AcroFormPolicy, CropTransform, ExcludedPages, ExecutionContext, ExistingOutputPolicy, LopdfEngine,
    OutputTarget, PageSelection, PageTransform, PrefixNameGenerator, ProgressListener, Rectangle,
    RotateTransform, Rotation, Source, TaskParameters, TransformationTask, Warning,
};

/// PDF Crop - split PDF pages into several cropped pages
#[derive(Parser)]
#[command(name = "pdf-crop")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Split every letter page into its left and right halves
    pdf-crop crop --area 0,0,306,792 --area 306,0,612,792 -o out/ scan.pdf

    # Crop all PDFs in the folder, leaving the cover page out
    pdf-crop crop --area 36,36,576,756 --exclude 1 -o out/ \"*.pdf\"

    # Keep excluded pages, rename outputs that already exist
    pdf-crop crop --area 0,0,306,792 --exclude 1 --keep-excluded --existing-output rename -o out/ book.pdf

    # Rotate pages 2 to the end by 90 degrees
    pdf-crop rotate --degrees 90 --pages 2- -o rotated.pdf scan.pdf")]
struct Cli {
    /// Log more (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the commands that write documents
#[derive(Args)]
struct OutputArgs {
    /// Input PDF files. Supports glob patterns like "*.pdf"
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output directory, or output file when there is a single input and the path ends in .pdf
    #[arg(short, long)]
    output: PathBuf,

    /// What to do when an output file exists: overwrite, fail, skip or rename
    #[arg(long, default_value = "fail")]
    existing_output: ExistingOutputPolicy,

    /// Output name prefix; may contain [BASENAME], [FILENUMBER] and [TIMESTAMP]
    #[arg(long, default_value = "")]
    prefix: String,

    /// Skip unreadable inputs and damaged structures with a warning instead of failing
    #[arg(long)]
    lenient: bool,

    /// Compress the output streams
    #[arg(long)]
    compress: bool,

    /// Drop form fields instead of merging them
    #[arg(long)]
    discard_forms: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop every page into one output page per area
    Crop {
        /// Crop area as "left,bottom,right,top" in points, repeat for several areas
        #[arg(long = "area", required = true)]
        areas: Vec<Rectangle>,

        /// Pages not to crop, e.g. "1,3-5,10-"
        #[arg(long)]
        exclude: Option<PageSelection>,

        /// Copy excluded pages unchanged instead of leaving them out
        #[arg(long)]
        keep_excluded: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Rotate pages by a multiple of 90 degrees
    Rotate {
        /// Clockwise rotation in degrees
        #[arg(long, allow_hyphen_values = true)]
        degrees: i64,

        /// Pages to rotate, e.g. "1,3-5,10-" (all by default)
        #[arg(long)]
        pages: Option<PageSelection>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Crop {
            areas,
            exclude,
            keep_excluded,
            output,
        } => cmd_crop(areas, exclude, keep_excluded, output),
        Commands::Rotate { degrees, pages, output } => cmd_rotate(degrees, pages, output),
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = false;
            for entry in glob(&pattern).with_context(|| format!("Invalid pattern: {}", pattern))? {
                match entry {
                    Ok(path) => {
                        paths.push(path);
                        matched = true;
                    }
                    Err(e) => eprintln!("Warning: glob error for {}: {}", pattern, e),
                }
            }
            if !matched {
                bail!("No files matched pattern: {}", pattern);
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    // Sort paths for consistent ordering
    paths.sort();

    Ok(paths)
}

/// Prints progress to stderr
struct ConsoleProgress;

impl ProgressListener for ConsoleProgress {
    fn source_started(&self, number: usize, total: usize, name: &str) {
        eprintln!("[{}/{}] {}", number, total, name);
    }

    fn step_completed(&self, completed: usize, total: usize) {
        log::debug!("{}/{} pages", completed, total);
    }

    fn warning(&self, warning: &Warning) {
        eprintln!("Warning: {}", warning);
    }
}

/// Run a transform over the inputs and write the results
fn run_transform(transform: impl PageTransform + 'static, args: OutputArgs) -> Result<()> {
    let inputs = expand_globs(args.inputs)?;
    let single_file = inputs.len() == 1
        && args
            .output
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
    let target = if single_file {
        OutputTarget::File(args.output.clone())
    } else {
        OutputTarget::Directory(args.output.clone())
    };

    let policy = if args.discard_forms {
        AcroFormPolicy::Discard
    } else {
        AcroFormPolicy::Merge
    };
    let parameters = TaskParameters::new(inputs.into_iter().map(Source::file).collect(), target, transform)
        .existing_output_policy(args.existing_output)
        .naming(PrefixNameGenerator::new(args.prefix))
        .acro_form_policy(policy);

    let context = Arc::new(
        ExecutionContext::new()
            .lenient(args.lenient)
            .with_listener(Arc::new(ConsoleProgress)),
    );
    let mut task = TransformationTask::new(LopdfEngine::new().compress(args.compress));

    eprintln!("Processing {} PDF file(s)...", parameters.sources.len());
    let outcome = task.run(&parameters, context);
    let written = outcome.result?;

    for artifact in &written {
        eprintln!("Output: {}", artifact.path.display());
    }
    if !outcome.warnings.is_empty() {
        eprintln!("Completed with {} warning(s)", outcome.warnings.len());
    }
    Ok(())
}

/// Crop pages into one page per area
fn cmd_crop(areas: Vec<Rectangle>, exclude: Option<PageSelection>, keep_excluded: bool, args: OutputArgs) -> Result<()> {
    let excluded_pages = if keep_excluded {
        ExcludedPages::KeepUncropped
    } else {
        ExcludedPages::Drop
    };
    let transform = CropTransform::new(areas)?.excluding(exclude.unwrap_or_default(), excluded_pages);
    run_transform(transform, args)
}

/// Rotate the selected pages
fn cmd_rotate(degrees: i64, pages: Option<PageSelection>, args: OutputArgs) -> Result<()> {
    let Some(rotation) = Rotation::from_degrees(degrees) else {
        bail!("Rotation must be a multiple of 90 degrees, got {}", degrees);
    };
    let transform = RotateTransform::new(rotation, pages.unwrap_or_else(PageSelection::all));
    run_transform(transform, args)
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> Result<()> {
    let info = pdf_crop::pdf::inspect(&LopdfEngine::new(), &Source::file(&input))?;

    println!("File: {}", input.display());
    println!("PDF version: {}", info.version);
    println!("Pages: {}", info.page_count);
    if let Some(title) = info.title {
        println!("Title: {}", title);
    }
    if let Some(author) = info.author {
        println!("Author: {}", author);
    }
    if let Some(page) = info.first_page {
        let media = page.media_box;
        println!(
            "First page: {} x {} pt, rotated {}",
            media.width(),
            media.height(),
            page.rotation.degrees()
        );
    }
    println!("Annotations: {}", info.annotations);
    println!("Form fields: {}", info.form_fields);
    println!("Bookmarks: {}", info.outline_items);

    Ok(())
}
