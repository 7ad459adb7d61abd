//! VariantLab CLI: simulate traffic, test significance, compile results.
//!
//! Commands:
//! - `simulate`: run synthetic visitors through an experiment fixture
//! - `significance`: two-proportion z-test from raw counts
//! - `interval`: confidence interval of one conversion rate
//! - `sample-size`: visitors per variant needed to detect a lift
//! - `results`: compile results from an experiment snapshot (JSON or TOML)
//! - `split-check`: report whether traffic percentages cover 100%

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use variantlab_core::domain::Experiment;
use variantlab_core::inspect_split;
use variantlab_core::stats::{
    confidence_interval, required_sample_size, ConfidenceLevel, SampleCounts, P_VALUE_FLOOR,
};
use variantlab_engine::{
    compile_results, export_json, export_variants_csv, save_results, simulate, EngineConfig,
    ExperimentFixture, ExperimentResults, SimulationConfig,
};

#[derive(Parser)]
#[command(
    name = "variantlab",
    about = "VariantLab CLI: experiment allocation and A/B statistics"
)]
struct Cli {
    /// Engine configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run synthetic visitors through an experiment fixture.
    Simulate {
        /// Fixture TOML with `[experiment]` and `[truth.<variant>]` tables.
        #[arg(long)]
        fixture: PathBuf,

        #[arg(long, default_value_t = 10_000)]
        visitors: u64,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Worker threads. Defaults to all cores.
        #[arg(long)]
        threads: Option<usize>,

        /// Directory to write results.json and variants.csv into.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Pooled two-proportion z-test of a test variant against control.
    Significance {
        #[arg(long)]
        control_visitors: u64,
        #[arg(long)]
        control_conversions: u64,
        #[arg(long)]
        test_visitors: u64,
        #[arg(long)]
        test_conversions: u64,
        /// Confidence level, e.g. 0.95. Defaults to the configured level.
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Confidence interval for a single conversion rate.
    Interval {
        #[arg(long)]
        conversions: u64,
        #[arg(long)]
        visitors: u64,
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Visitors per variant needed to detect a relative lift.
    SampleSize {
        /// Baseline conversion rate as a fraction, e.g. 0.05.
        #[arg(long)]
        baseline: f64,
        /// Relative minimum detectable effect, e.g. 0.1 for a 10% lift.
        /// Defaults to the configured value.
        #[arg(long)]
        mde: Option<f64>,
        #[arg(long)]
        confidence: Option<f64>,
        #[arg(long)]
        power: Option<f64>,
    },
    /// Compile results from an experiment snapshot.
    Results {
        /// Experiment snapshot: `.json` holds the experiment object, `.toml`
        /// an `[experiment]` table.
        #[arg(long)]
        experiment: PathBuf,

        /// Print the per-variant CSV instead of the summary.
        #[arg(long, default_value_t = false)]
        csv: bool,

        /// Print the full results as JSON instead of the summary.
        #[arg(long, default_value_t = false, conflicts_with = "csv")]
        json: bool,

        /// Directory to write results.json and variants.csv into.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Report whether an experiment's traffic split covers 100%.
    SplitCheck {
        #[arg(long)]
        experiment: PathBuf,
    },
}

#[derive(Deserialize)]
struct TomlSnapshot {
    experiment: Experiment,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    debug!(?config, "loaded configuration");

    match cli.command {
        Commands::Simulate {
            fixture,
            visitors,
            seed,
            threads,
            output_dir,
        } => run_simulate(&config, &fixture, visitors, seed, threads, output_dir.as_deref()),
        Commands::Significance {
            control_visitors,
            control_conversions,
            test_visitors,
            test_conversions,
            confidence,
        } => run_significance(
            &config,
            SampleCounts::new(control_visitors, control_conversions),
            SampleCounts::new(test_visitors, test_conversions),
            confidence,
        ),
        Commands::Interval {
            conversions,
            visitors,
            confidence,
        } => run_interval(&config, conversions, visitors, confidence),
        Commands::SampleSize {
            baseline,
            mde,
            confidence,
            power,
        } => run_sample_size(&config, baseline, mde, confidence, power),
        Commands::Results {
            experiment,
            csv,
            json,
            output_dir,
        } => run_results(&config, &experiment, csv, json, output_dir.as_deref()),
        Commands::SplitCheck { experiment } => run_split_check(&experiment),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn level_or_default(config: &EngineConfig, confidence: Option<f64>) -> Result<ConfidenceLevel> {
    match confidence {
        Some(level) => Ok(ConfidenceLevel::new(level)?),
        None => Ok(config.statistics.default_confidence_level),
    }
}

fn load_experiment(path: &Path) -> Result<Experiment> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read experiment snapshot {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("invalid experiment JSON in {}", path.display())),
        Some("toml") => {
            let snapshot: TomlSnapshot = toml::from_str(&content)
                .with_context(|| format!("invalid experiment TOML in {}", path.display()))?;
            Ok(snapshot.experiment)
        }
        _ => bail!(
            "unsupported snapshot format '{}': expected .json or .toml",
            path.display()
        ),
    }
}

fn run_simulate(
    config: &EngineConfig,
    fixture_path: &Path,
    visitors: u64,
    seed: u64,
    threads: Option<usize>,
    output_dir: Option<&Path>,
) -> Result<()> {
    let fixture = ExperimentFixture::from_file(fixture_path)?;
    let sim = SimulationConfig {
        visitors,
        seed,
        threads,
        ..SimulationConfig::default()
    };
    let report = simulate(&fixture, &sim, config.clone(), Utc::now())?;

    println!();
    println!("=== Simulation ===");
    println!("Visitors:       {}", report.visitors);
    println!("Allocated:      {}", report.allocated);
    println!("Unallocated:    {}", report.unallocated);
    println!("Conversions:    {}", report.conversions);
    print_results(&report.results);

    if let Some(dir) = output_dir {
        save_results(&report.results, dir)?;
        println!("Results saved to: {}", dir.display());
    }
    Ok(())
}

fn run_significance(
    config: &EngineConfig,
    control: SampleCounts,
    test: SampleCounts,
    confidence: Option<f64>,
) -> Result<()> {
    let level = level_or_default(config, confidence)?;
    let r = config.statistics.significance_test(level).compare(&control, &test);

    println!(
        "Control:        {:.2}% ({}/{})",
        control.rate() * 100.0,
        control.conversions,
        control.visitors
    );
    println!(
        "Test:           {:.2}% ({}/{})",
        test.rate() * 100.0,
        test.conversions,
        test.visitors
    );
    println!("Lift:           {:+.2}%", r.lift);
    println!("z:              {:.4}", r.z_score);
    println!("p-value:        {}", format_p_value(r.p_value, 6));
    println!(
        "Difference CI:  [{:+.2}, {:+.2}] pp at {:.0}%",
        r.difference_interval.lower,
        r.difference_interval.upper,
        level.value() * 100.0
    );
    if !r.sample_size_sufficient {
        println!(
            "Not tested:     each side needs at least {} visitors",
            config.statistics.min_sample_size
        );
    }
    println!(
        "Significant:    {}",
        if r.is_significant { "yes" } else { "no" }
    );
    Ok(())
}

fn run_interval(
    config: &EngineConfig,
    conversions: u64,
    visitors: u64,
    confidence: Option<f64>,
) -> Result<()> {
    let level = level_or_default(config, confidence)?;
    let ci = confidence_interval(conversions, visitors, level);
    let rate = SampleCounts::new(visitors, conversions).rate() * 100.0;
    println!(
        "{rate:.2}% [{:.2}%, {:.2}%] at {:.0}% confidence",
        ci.lower,
        ci.upper,
        level.value() * 100.0
    );
    Ok(())
}

fn run_sample_size(
    config: &EngineConfig,
    baseline: f64,
    mde: Option<f64>,
    confidence: Option<f64>,
    power: Option<f64>,
) -> Result<()> {
    let level = level_or_default(config, confidence)?;
    let mde = mde.unwrap_or(config.statistics.minimum_detectable_effect);
    let power = power.unwrap_or(config.statistics.power);
    let n = required_sample_size(baseline, mde, level, power)?;

    println!(
        "{n} visitors per variant to detect a {:.1}% relative lift on a {:.2}% baseline \
         ({:.0}% confidence, {:.0}% power)",
        mde * 100.0,
        baseline * 100.0,
        level.value() * 100.0,
        power * 100.0
    );
    Ok(())
}

fn run_results(
    config: &EngineConfig,
    path: &Path,
    csv: bool,
    json: bool,
    output_dir: Option<&Path>,
) -> Result<()> {
    let experiment = load_experiment(path)?;
    let results = compile_results(&experiment, &config.statistics);

    if csv {
        print!("{}", export_variants_csv(&results)?);
    } else if json {
        println!("{}", export_json(&results)?);
    } else {
        print_results(&results);
    }

    if let Some(dir) = output_dir {
        save_results(&results, dir)?;
        println!("Results saved to: {}", dir.display());
    }
    Ok(())
}

fn run_split_check(path: &Path) -> Result<()> {
    let experiment = load_experiment(path)?;
    let report = inspect_split(&experiment.variants);

    println!("Experiment:     {}", experiment.id);
    println!("Total traffic:  {:.2}%", report.total_percentage);
    println!("Unallocated:    {} buckets", report.unallocated_buckets);
    if report.overflow_percentage > 0.0 {
        println!(
            "Overflow:       {:.2}% (variants past 100% never receive traffic)",
            report.overflow_percentage
        );
    }
    println!("Controls:       {}", report.control_count);

    if report.is_well_formed() {
        println!("Split OK");
        Ok(())
    } else {
        bail!("traffic split for '{}' is not well formed", experiment.id)
    }
}

fn print_results(results: &ExperimentResults) {
    println!();
    println!("=== Experiment Results ===");
    if results.name.is_empty() {
        println!("Experiment:     {}", results.experiment_id);
    } else {
        println!("Experiment:     {} ({})", results.name, results.experiment_id);
    }
    println!("Status:         {:?}", results.status);
    println!("Confidence:     {:.0}%", results.confidence_level.value() * 100.0);
    println!("Visitors:       {}", results.total_visitors);
    println!("Conversions:    {}", results.total_conversions);
    println!("Revenue:        {:.2}", results.total_revenue);
    println!("Overall rate:   {:.2}%", results.overall_conversion_rate_pct);
    println!();
    println!(
        "{:<4} {:<20} {:>9} {:>8} {:>8} {:>19} {:>9} {:>9}",
        "Rank", "Variant", "Visitors", "Conv", "Rate", "CI", "Lift", "p"
    );
    println!("{}", "-".repeat(93));
    for v in &results.variants {
        let name = if v.is_control {
            format!("{} (control)", v.name)
        } else {
            v.name.clone()
        };
        let (lift, p) = match &v.significance {
            Some(sig) => (format!("{:+.2}%", sig.lift), format_p_value(sig.p_value, 4)),
            None => ("-".to_string(), "-".to_string()),
        };
        println!(
            "{:<4} {:<20} {:>9} {:>8} {:>7.2}% {:>19} {:>9} {:>9}",
            v.rank,
            name,
            v.visitors,
            v.conversions,
            v.conversion_rate_pct,
            format!(
                "[{:.2}, {:.2}]",
                v.confidence_interval.lower, v.confidence_interval.upper
            ),
            lift,
            p
        );
    }

    println!();
    match &results.winner {
        Some(w) => println!(
            "Winner:         {} ({:+.2}% lift, p = {})",
            w.name,
            w.lift,
            format_p_value(w.p_value, 4)
        ),
        None => println!("Winner:         none"),
    }
    for rec in &results.recommendations {
        println!("- {rec}");
    }
    println!();
}

/// Fixed-point p-value, or `< 3e-7` at the resolution floor.
fn format_p_value(p: f64, decimals: usize) -> String {
    if p <= P_VALUE_FLOOR {
        format!("< {P_VALUE_FLOOR:e}")
    } else {
        format!("{p:.decimals$}")
    }
}
