use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use timetable_optimization_lib::algorithms::models::SearchProgress;
use timetable_optimization_lib::error::Result;
use timetable_optimization_lib::export::{write_csv, write_json, write_xlsx};
use timetable_optimization_lib::import::{read_lessons_csv, read_request};
use timetable_optimization_lib::{
    optimize_with_progress, AppError, CancelToken, OptimizationRequest, OptimizeError, OptimizerConfig,
    ProgressSink, Strategy, VenueMap,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Xlsx,
}

/// Finds a conflict-free timetable that best matches the given preferences.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Request JSON, or lesson rows with --lessons-csv
    #[arg(value_name = "FILE")]
    input: PathBuf,
    /// Where to write the result; stdout when omitted (xlsx defaults to timetable.xlsx)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
    /// Read FILE as CSV rows `module_code,lesson_type,class_no,day,start_time,end_time,venue`
    #[arg(long)]
    lessons_csv: bool,
    /// Venue coordinates for the walking-distance rule
    #[arg(long, value_name = "FILE")]
    locations: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Split the search across all cores
    #[arg(long)]
    parallel: bool,
    #[arg(long, value_name = "N")]
    max_nodes: Option<u64>,
    #[arg(long, value_name = "MS")]
    time_limit_ms: Option<u64>,
    /// Ignore walking distances between venues
    #[arg(long)]
    no_walking: bool,
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::Optimize(err @ OptimizeError::Infeasible { .. })) => {
            error!("{err}");
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    /* Configuration, then command-line overrides */
    let mut config = OptimizerConfig::load(args.config.as_deref())?;
    if args.parallel {
        config.strategy = Strategy::Parallel;
    }
    if let Some(max_nodes) = args.max_nodes {
        config.budget.max_nodes = Some(max_nodes);
    }
    if let Some(time_limit_ms) = args.time_limit_ms {
        config.budget.time_limit_ms = Some(time_limit_ms);
    }
    if args.no_walking {
        config.walking.enabled = false;
    }

    /* Inputs */
    let request = if args.lessons_csv {
        OptimizationRequest::new(read_lessons_csv(&args.input)?)
    } else {
        read_request(&args.input)?
    };
    info!("Loaded {} modules from {}", request.modules.len(), args.input.display());

    let venues = args
        .locations
        .as_ref()
        .or(config.venues_path.as_ref())
        .map(|path| VenueMap::load(path))
        .transpose()?
        .map(Arc::new);

    /* Ctrl-C stops the search */
    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the search");
            interrupt.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
    );
    spinner.set_message("Searching...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let bar = spinner.clone();
    let progress: ProgressSink = Arc::new(move |p: &SearchProgress| {
        let best = p.best_cost.map_or_else(|| "-".to_string(), |cost| cost.to_string());
        bar.set_message(format!("{} nodes, best cost {}", p.nodes, best));
    });

    let result = optimize_with_progress(&request, &config, venues, cancel, Some(progress)).await;
    spinner.finish_and_clear();
    let report = result?;

    info!(
        "Found timetable with {} blocks, cost {} ({} nodes in {:.2?}{})",
        report.blocks.len(),
        report.cost.total,
        report.stats.nodes,
        report.stats.elapsed,
        if report.stats.exhausted { ", optimal" } else { ", budget reached" }
    );
    if report.stats.relaxed_walking {
        warn!("Walking distances were ignored to find a timetable");
    }

    /* Output */
    match args.format {
        OutputFormat::Xlsx => {
            let path = args.output.unwrap_or_else(|| PathBuf::from("timetable.xlsx"));
            write_xlsx(&report, &path)?;
            info!("Wrote {}", path.display());
        }
        OutputFormat::Json | OutputFormat::Csv => {
            let mut writer: Box<dyn Write> = match &args.output {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(io::stdout().lock()),
            };
            if matches!(args.format, OutputFormat::Json) {
                write_json(&report, &mut writer)?;
                writeln!(writer)?;
            } else {
                write_csv(&report.blocks, &mut writer)?;
            }
            writer.flush()?;
        }
    }

    Ok(())
}
