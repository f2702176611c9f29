//! Heritor Reserve CLI
//!
//! - `heritor smooth`: credibility-smooth paired estimates into a parameter table
//! - `heritor run`: build charge and reserve tables from a parameter table

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use heritor_reserve::assumptions::loader::{load_paired_estimates, load_parameter_table};
use heritor_reserve::output::{write_charge_rows_path, write_parameter_table_path, write_reserves_path};
use heritor_reserve::{Assumptions, HeritorConfig, LookupPolicy, MortalityTableRef, ParameterTable, ScenarioRunner};

#[derive(Parser)]
#[command(name = "heritor", version, about = "Survivor pension charges and reserves")]
struct Cli {
    /// JSON configuration file; omitted fields keep their defaults
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Smooth paired group/reference estimates into a parameter table
    Smooth(SmoothArgs),
    /// Build charge and reserve tables
    Run(RunArgs),
}

#[derive(Args)]
struct SmoothArgs {
    /// CSV with age,sex,parameter,group_value,group_n,reference_value,reference_n
    #[arg(long)]
    estimates: PathBuf,

    /// Smoothed table CSV to write
    #[arg(long)]
    output: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    /// Smoothed parameter table CSV
    #[arg(long, required_unless_present = "estimates", conflicts_with = "estimates")]
    parameters: Option<PathBuf>,

    /// Paired estimates CSV, smoothed in-process
    #[arg(long)]
    estimates: Option<PathBuf>,

    /// Mortality CSV with age,female,male (overrides the configured table)
    #[arg(long)]
    mortality: Option<PathBuf>,

    /// Charge table CSV to write
    #[arg(long, default_value = "charges.csv")]
    charges: PathBuf,

    /// Reserve table CSV to write
    #[arg(long, default_value = "reserves.csv")]
    reserves: PathBuf,

    /// Interest rates, e.g. 0.04,0.06
    #[arg(long, value_delimiter = ',')]
    rates: Option<Vec<f64>>,

    /// Monte Carlo draws per death age
    #[arg(long)]
    samples: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    age_min: Option<u32>,

    #[arg(long)]
    age_max: Option<u32>,

    /// Fall back to the other sex's curve when a sex has no data
    #[arg(long)]
    lenient: bool,
}

fn load_config(path: Option<&Path>) -> Result<HeritorConfig> {
    match path {
        Some(path) => HeritorConfig::from_json_path(path)
            .with_context(|| format!("Failed to read config {}", path.display())),
        None => Ok(HeritorConfig::default()),
    }
}

fn smooth(config: &HeritorConfig, args: &SmoothArgs) -> Result<()> {
    let estimates = load_paired_estimates(&args.estimates)
        .with_context(|| format!("Failed to load estimates {}", args.estimates.display()))?;
    let table = ParameterTable::smooth(&estimates, &config.credibility)?;

    let fallbacks = table.curves().filter(|(_, _, c)| c.diagnostics().used_fallback()).count();
    write_parameter_table_path(&args.output, &table)?;

    println!("Smoothed {} curves ({} with fallbacks)", table.curves().count(), fallbacks);
    println!("Written to: {}", args.output.display());
    Ok(())
}

fn run(mut config: HeritorConfig, args: &RunArgs) -> Result<()> {
    if let Some(rates) = &args.rates {
        config.run.interest_rates = rates.clone();
    }
    if let Some(samples) = args.samples {
        config.run.n_samples = samples;
    }
    if args.seed.is_some() {
        config.run.seed = args.seed;
    }
    if let Some(age) = args.age_min {
        config.run.age_min = age;
    }
    if let Some(age) = args.age_max {
        config.run.age_max = age;
    }
    if args.lenient {
        config.run.lookup_policy = LookupPolicy::Lenient;
    }

    if let Some(path) = &args.mortality {
        config.mortality = MortalityTableRef::Csv { path: path.clone() };
    }
    let mortality = config.mortality.load().context("Failed to load mortality table")?;
    let parameters = match (&args.parameters, &args.estimates) {
        (Some(path), _) => load_parameter_table(path, config.credibility.sd_floor)
            .with_context(|| format!("Failed to load parameters {}", path.display()))?,
        (None, Some(path)) => ParameterTable::smooth(&load_paired_estimates(path)?, &config.credibility)?,
        (None, None) => bail!("either --parameters or --estimates is required"),
    };

    let start = Instant::now();
    let mut runner = ScenarioRunner::new(Assumptions::new(mortality, parameters), config)?;
    let output = runner.run()?;
    info!("Run took {:.2?}", start.elapsed());

    let charge_rows = output.charge_rows();
    write_charge_rows_path(&args.charges, &charge_rows)?;
    write_reserves_path(&args.reserves, &output.reserves)?;

    println!("{:>4} {:>6} {:>6} {:>12} {:>12} {:>8} {:>8}", "Age", "Sex", "Rate", "Reserve", "PerYear", "e_x", "pDep");
    println!("{}", "-".repeat(64));
    for r in output.reserves.iter().filter(|r| r.age % 10 == 0) {
        println!(
            "{:>4} {:>6} {:>6.3} {:>12.4} {:>12.4} {:>8.2} {:>8.4}",
            r.age,
            r.sex.to_string(),
            r.interest_rate,
            r.reserve_total,
            r.reserve_per_life_year,
            r.life_expectancy,
            r.prob_leave_dependent
        );
    }

    println!("\nCharges written to: {} ({} rows)", args.charges.display(), charge_rows.len());
    println!("Reserves written to: {} ({} rows)", args.reserves.display(), output.reserves.len());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Command::Smooth(args) => smooth(&config, args),
        Command::Run(args) => run(config, args),
    }
}
