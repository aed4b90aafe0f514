use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use timetable_optimization_lib::algorithms::generator::{generate, ScenarioConfig};
use timetable_optimization_lib::algorithms::tune::{sweep_budgets, BudgetRange, BudgetTrial, SweepReport};
use timetable_optimization_lib::error::Result;
use timetable_optimization_lib::{OptimizationRequest, OptimizerConfig};

/// Measures how many search nodes it takes to reach the optimum on generated scenarios.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Scenarios generated per difficulty level
    #[arg(long, default_value_t = 5)]
    seeds: u64,
    #[arg(long, default_value_t = 100)]
    min_nodes: u64,
    #[arg(long, default_value_t = 1_000_000)]
    max_nodes: u64,
    #[arg(long, default_value_t = 10)]
    factor: u64,
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(short, long, value_name = "FILE", default_value = "budget_sweep.xlsx")]
    output: PathBuf,
}

pub fn export_sweep_single_sheet(report: &SweepReport, filename: &Path) -> std::result::Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    let bold = Format::new().set_bold();

    let headers = [
        "max_nodes",
        "nodes",
        "cost",
        "optimum",
        "gap",
        "complete",
        "elapsed_ms",
    ];

    let mut current_row = 0;

    let mut scenarios: Vec<&str> = report.trials.iter().map(|t| t.scenario.as_str()).collect();
    scenarios.dedup();

    for scenario in scenarios {
        // === Scenario title ===
        worksheet.write_with_format(current_row, 0, format!("=== Scenario {} ===", scenario), &bold)?;
        current_row += 1;

        for (col, title) in headers.iter().enumerate() {
            worksheet.write_with_format(current_row, col as u16, *title, &bold)?;
        }
        current_row += 1;

        for trial in report.trials.iter().filter(|t| t.scenario == scenario) {
            worksheet.write(current_row, 0, trial.max_nodes as f64)?;
            worksheet.write(current_row, 1, trial.nodes as f64)?;
            if let Some(cost) = trial.cost {
                worksheet.write(current_row, 2, cost as f64)?;
            }
            if let Some(optimum) = trial.optimum {
                worksheet.write(current_row, 3, optimum as f64)?;
            }
            if let Some(gap) = trial.gap() {
                worksheet.write(current_row, 4, gap as f64)?;
            }
            worksheet.write(current_row, 5, trial.complete)?;
            worksheet.write(current_row, 6, trial.elapsed_ms)?;
            current_row += 1;
        }

        current_row += 2; // spacer between scenarios
    }

    if let Some(budget) = report.recommended_max_nodes {
        worksheet.write_with_format(current_row, 0, "recommended_max_nodes", &bold)?;
        worksheet.write(current_row, 1, budget as f64)?;
    }

    workbook.save(filename)?;
    Ok(())
}

fn scenarios(seeds: u64) -> Vec<(String, OptimizationRequest)> {
    let levels = [
        ("easy", ScenarioConfig::easy()),
        ("medium", ScenarioConfig::medium()),
        ("hard", ScenarioConfig::hard()),
    ];
    levels
        .iter()
        .flat_map(|(name, config)| (0..seeds).map(move |seed| (format!("{name}-{seed}"), generate(config, seed))))
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = OptimizerConfig::load(args.config.as_deref())?;
    let range = BudgetRange {
        max_nodes: (args.min_nodes, args.max_nodes),
        factor: args.factor,
    };
    let scenarios = scenarios(args.seeds);

    let start_time = Instant::now();

    let pb = ProgressBar::new((scenarios.len() * range.steps().len()) as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let report = sweep_budgets(&scenarios, &range, &config, |trial: &BudgetTrial| {
        pb.set_message(format!("{} @ {} nodes", trial.scenario, trial.max_nodes));
        pb.inc(1);
    })
    .await?;

    pb.finish_with_message("sweep finished");

    let elapsed = start_time.elapsed();
    info!(
        "Total time: {} min {} s",
        elapsed.as_secs() / 60,
        elapsed.as_secs() % 60
    );

    let optimal = report.trials.iter().filter(|t| t.reached_optimum()).count();
    info!("{}/{} trials reached the optimum", optimal, report.trials.len());
    match report.recommended_max_nodes {
        Some(budget) => info!("Recommended max_nodes: {}", budget),
        None => info!("No budget in range was enough for every scenario"),
    }

    export_sweep_single_sheet(&report, &args.output)?;
    info!("Wrote {}", args.output.display());

    Ok(())
}
