//! hamlet - empirical hamlet formation CLI
//!
//! Clusters building points into hamlets and estimates their population from
//! district-level census totals.
//!
//! Usage:
//!   hamlet run --points P --boundaries B --statistics S --out DIR
//!   hamlet cluster --points P --out FILE
//!   hamlet config

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use hamlet_core::{
    ClusterResult, KMeans, Pipeline, PipelineConfig, PipelineOutput, RunReport, SeedPolicy,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod config;
mod io;

use config::{default_config_path, load_config, Config};

#[derive(Parser)]
#[command(name = "hamlet")]
#[command(about = "Form empirical hamlets from building points and estimate their population")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log stage summaries (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Clone, Default)]
struct ClusterArgs {
    /// Households per reference hamlet (K = round(N / ratio))
    #[arg(long)]
    ratio: Option<f64>,

    /// Fixed number of hamlets, overriding the ratio
    #[arg(short, long)]
    k: Option<usize>,

    /// Seed for centroid initialization
    #[arg(long)]
    seed: Option<u64>,

    /// Iteration bound for k-means
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Centroid shift at which k-means stops
    #[arg(long)]
    tolerance: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: matching, clustering, synthesis, aggregation
    Run {
        /// Building points CSV (id,x,y[,name])
        #[arg(long)]
        points: PathBuf,

        /// Administrative boundaries JSON
        #[arg(long)]
        boundaries: PathBuf,

        /// Administrative statistics CSV (unit_id,mean_household_size,total_population)
        #[arg(long)]
        statistics: PathBuf,

        /// Building footprints JSON, keyed by point id
        #[arg(long)]
        footprints: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        cluster: ClusterArgs,

        /// Seed for household size draws
        #[arg(long)]
        synthesis_seed: Option<u64>,

        /// Seeding across units: stream or reseed-per-unit
        #[arg(long, value_name = "POLICY")]
        seed_policy: Option<SeedPolicy>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cluster points only and write assignments
    Cluster {
        /// Building points CSV (id,x,y[,name])
        #[arg(long)]
        points: PathBuf,

        /// Assignments CSV to write (id,cluster_id)
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        cluster: ClusterArgs,

        /// Print the clustering summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            points,
            boundaries,
            statistics,
            footprints,
            out,
            cluster,
            synthesis_seed,
            seed_policy,
            json,
        } => {
            let mut pipeline = apply_cluster_args(config.pipeline_config(), &cluster);
            if let Some(seed) = synthesis_seed {
                pipeline.synthesis.seed = seed;
            }
            if let Some(policy) = seed_policy {
                pipeline.synthesis.policy = policy;
            }
            let inputs = RunInputs {
                points,
                boundaries,
                statistics,
                footprints,
            };
            cmd_run(&inputs, &out, pipeline, json)
        }
        Commands::Cluster {
            points,
            out,
            cluster,
            json,
        } => {
            let pipeline = apply_cluster_args(config.pipeline_config(), &cluster);
            cmd_cluster(&points, &out, &pipeline, json)
        }
        Commands::Config => cmd_config(&config),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            load_config(path)
        }
        None => match default_config_path() {
            Ok(path) => load_config(&path),
            Err(_) => Ok(Config::default()),
        },
    }
}

fn apply_cluster_args(mut config: PipelineConfig, args: &ClusterArgs) -> PipelineConfig {
    if let Some(ratio) = args.ratio {
        config.reference_ratio = ratio;
    }
    if let Some(k) = args.k {
        config.k = Some(k);
    }
    if let Some(seed) = args.seed {
        config.cluster_seed = seed;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }
    config
}

struct RunInputs {
    points: PathBuf,
    boundaries: PathBuf,
    statistics: PathBuf,
    footprints: Option<PathBuf>,
}

fn cmd_run(inputs: &RunInputs, out: &Path, config: PipelineConfig, json: bool) -> Result<()> {
    let points = io::read_points(&inputs.points)?;
    let boundaries = io::read_boundaries(&inputs.boundaries)?;
    let statistics = io::read_statistics(&inputs.statistics)?;
    let footprints = inputs
        .footprints
        .as_deref()
        .map(io::read_footprints)
        .transpose()?;

    let output = Pipeline::new(config)
        .run(
            &points.points,
            &boundaries,
            &statistics,
            footprints.as_deref(),
        )
        .context("Hamlet pipeline failed")?;

    write_outputs(out, &output)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output.report)?);
    } else {
        print_summary(&output.report, points.named, out);
    }
    Ok(())
}

fn write_outputs(out: &Path, output: &PipelineOutput) -> Result<()> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory: {}", out.display()))?;

    io::write_hamlets(&out.join("hamlets.csv"), &output.hamlets)?;
    io::write_buildings(&out.join("buildings.csv"), &output.buildings)?;
    if let Some(footprints) = &output.footprints {
        io::write_footprints(&out.join("footprints.json"), footprints)?;
    }
    io::write_report(&out.join("report.json"), &output.report)?;
    Ok(())
}

fn cmd_cluster(points: &Path, out: &Path, config: &PipelineConfig, json: bool) -> Result<()> {
    let input = io::read_points(points)?;
    let k = config.cluster_count(input.points.len())?;
    let coords: Vec<_> = input.points.iter().map(|p| p.coord).collect();
    let clusters = KMeans::new(config.cluster_config(k)).fit(&coords)?;

    io::write_assignments(out, &input.points, &clusters)?;

    if json {
        let summary = serde_json::json!({
            "points": input.points.len(),
            "k": clusters.k(),
            "iterations": clusters.iterations,
            "converged": clusters.converged,
            "inertia": clusters.inertia,
            "sizes": clusters.sizes,
            "empty_clusters": clusters.empty_clusters(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_cluster_summary(&clusters, input.points.len(), out);
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    let effective = Config::from_pipeline(&config.pipeline_config());
    if let Ok(path) = default_config_path() {
        println!("{}", format!("# default path: {}", path.display()).dimmed());
    }
    print!("{}", toml::to_string_pretty(&effective)?);
    Ok(())
}

fn convergence_label(converged: bool, iterations: usize) -> String {
    if converged {
        format!("{} after {} iterations", "converged".green(), iterations)
    } else {
        format!(
            "{} (stopped at {} iterations)",
            "not converged".yellow(),
            iterations
        )
    }
}

fn print_cluster_summary(clusters: &ClusterResult, points: usize, out: &Path) {
    println!("{}", "━".repeat(50).dimmed());
    println!("{}", "            Clustering".cyan().bold());
    println!("{}", "━".repeat(50).dimmed());
    println!("  Points:   {}", points.to_string().cyan());
    println!("  Hamlets:  {}", clusters.k().to_string().cyan());
    println!(
        "  Status:   {}",
        convergence_label(clusters.converged, clusters.iterations)
    );
    let empty = clusters.empty_clusters().len();
    if empty > 0 {
        println!("  Empty:    {}", empty.to_string().yellow());
    }
    println!("  Written:  {}", out.display().to_string().dimmed());
}

fn print_summary(report: &RunReport, named: usize, out: &Path) {
    println!("{}", "━".repeat(50).dimmed());
    println!("{}", "            Hamlet Run".cyan().bold());
    println!("{}", "━".repeat(50).dimmed());
    println!();

    println!("{}", "Input".white().bold());
    println!("  Points:     {}", report.points.to_string().cyan());
    if named > 0 {
        println!("  Named:      {} (skipped)", named.to_string().dimmed());
    }
    println!(
        "  Units:      {}",
        report.administrative_units.to_string().cyan()
    );
    println!();

    println!("{}", "Hamlets".white().bold());
    println!("  Count:      {}", report.k.to_string().cyan());
    println!(
        "  Clustering: {}",
        convergence_label(report.converged, report.iterations)
    );
    println!(
        "  Population: {}",
        report.total_population.to_string().green()
    );
    println!(
        "  Sized:      {} of {} buildings",
        report.sized_buildings.to_string().cyan(),
        report.points
    );
    println!();

    println!("{}", "Anomalies".white().bold());
    if report.anomalies.is_empty() {
        println!("  {}", "none".green());
    } else {
        let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
        for anomaly in &report.anomalies {
            *by_kind.entry(anomaly.kind()).or_default() += 1;
        }
        for (kind, count) in by_kind {
            println!("  {:<24} {}", kind, count.to_string().yellow());
        }
        println!("  {}", "Details are listed in report.json".dimmed());
    }
    println!();
    println!("  Output:     {}", out.display().to_string().dimmed());
}
