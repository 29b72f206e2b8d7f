//! bubblemark CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use bubblemark_core::policy::StrictnessMode;

mod commands;

#[derive(Parser)]
#[command(name = "bubblemark", version, about = "OMR answer-sheet evaluation")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one scanned sheet
    Evaluate {
        /// Rectified sheet image (PNG, JPEG, BMP, TIFF)
        #[arg(long)]
        image: PathBuf,

        /// Template JSON describing the bubble layout
        #[arg(long)]
        template: PathBuf,

        /// Test definition TOML with the answer key
        #[arg(long)]
        test: PathBuf,

        /// Strictness mode: easy, moderate, strict
        #[arg(long)]
        mode: Option<StrictnessMode>,

        /// Resize the image to the template page instead of failing
        #[arg(long)]
        resize: bool,

        /// Flag questions whose confidence is below this value
        #[arg(long)]
        flag_threshold: Option<f64>,

        /// Output directory for the result JSON
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print every question's reading, not just the summary
        #[arg(long)]
        details: bool,

        /// Print an explanation for every flagged question
        #[arg(long)]
        explain: bool,
    },

    /// Evaluate a directory of sheets
    Batch {
        /// Directory of sheet images
        #[arg(long)]
        images: PathBuf,

        /// Template JSON describing the bubble layout
        #[arg(long)]
        template: PathBuf,

        /// Test definition TOML, or a directory of them (one per version)
        #[arg(long)]
        tests: PathBuf,

        /// Exam version to grade every sheet against
        #[arg(long)]
        version: Option<String>,

        /// Strictness mode: easy, moderate, strict
        #[arg(long)]
        mode: Option<StrictnessMode>,

        /// Max concurrent sheets
        #[arg(long)]
        parallelism: Option<usize>,

        /// Resize sheets to the template page instead of failing
        #[arg(long)]
        resize: bool,

        /// Output directory for the batch report JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a template and, optionally, test definitions against it
    Validate {
        /// Template JSON
        #[arg(long)]
        template: PathBuf,

        /// Test definition TOML or directory
        #[arg(long)]
        test: Option<PathBuf>,
    },

    /// Compare two evaluation results of the same sheet
    Compare {
        /// Baseline result JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current result JSON
        #[arg(long)]
        current: PathBuf,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,

        /// Exit code 1 if any question was read differently
        #[arg(long)]
        fail_on_change: bool,
    },

    /// Apply reviewer corrections to a result and re-score it
    Review {
        /// Result JSON to correct
        #[arg(long)]
        result: PathBuf,

        /// Test definition the result was scored against
        #[arg(long)]
        test: PathBuf,

        /// Correction as QUESTION=CHOICE, or QUESTION=blank (repeatable)
        #[arg(long = "set", value_name = "Q=CHOICE", required = true)]
        overrides: Vec<String>,

        /// Reviewer note stored with every correction
        #[arg(long)]
        note: Option<String>,

        /// Where to write the corrected result (default: <result>.reviewed.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Generate a template with one block per subject of a test definition
    Template {
        /// Test definition TOML
        #[arg(long)]
        test: PathBuf,

        /// Where to write the template (default: templates/<test id>.json)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Create starter config, template and test definition
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bubblemark=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Evaluate {
            image,
            template,
            test,
            mode,
            resize,
            flag_threshold,
            output,
            details,
            explain,
        } => {
            commands::evaluate::execute(
                image,
                template,
                test,
                mode,
                resize,
                flag_threshold,
                output,
                details,
                explain,
                config,
            )
            .await
        }
        Commands::Batch {
            images,
            template,
            tests,
            version,
            mode,
            parallelism,
            resize,
            output,
        } => {
            commands::batch::execute(
                images,
                template,
                tests,
                version,
                mode,
                parallelism,
                resize,
                output,
                config,
            )
            .await
        }
        Commands::Validate { template, test } => commands::validate::execute(template, test),
        Commands::Compare {
            baseline,
            current,
            format,
            fail_on_change,
        } => commands::compare::execute(baseline, current, format, fail_on_change),
        Commands::Review {
            result,
            test,
            overrides,
            note,
            output,
        } => commands::review::execute(result, test, overrides, note, output, config),
        Commands::Template {
            test,
            output,
            force,
        } => commands::template::execute(test, output, force),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
