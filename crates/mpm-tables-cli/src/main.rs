//! CLI for ingesting MPM solver dumps into CSV tables.

mod error;
mod scenario;

use std::path::{Path, PathBuf};

use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, Subcommand};
use mpm_tables_core::{
    Pipeline, PipelineConfig, PipelineOutput,
    layout::{DEFAULT_CACHE_FILE_NAME, TableKind},
    output::read_table,
};
use snafu::ResultExt;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::{
    error::{CliResult, ConfigSnafu, PipelineSnafu, ReadTableSnafu, RenderSnafu},
    scenario::{DEFAULT_SOLVER, DEFAULT_SOLVER_TMP, ScenarioRunner, find_scenario},
};

const DEFAULT_LOG_FILTER: &str = "mpm_tables_core=info,mpmtab=info";

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a dump directory and write results.csv, velocity.csv and mass.csv
    Ingest {
        /// Directory holding the solver dumps (default: ../build/tmp)
        #[arg(long = "data-dir")]
        data_dir: Option<PathBuf>,

        /// Directory receiving the tables
        #[arg(long = "out-dir")]
        out_dir: Option<PathBuf>,

        /// JSON pipeline config; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Enable the field cache, optionally at a custom path
        #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_CACHE_FILE_NAME)]
        cache: Option<PathBuf>,

        /// Print the shape of every loaded field table
        #[arg(long, default_value_t = false)]
        verbose: bool,
    },

    /// Print the head of an output table
    Inspect {
        #[arg(long)]
        table: PathBuf,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,
    },

    /// Run a built-in solver scenario and ingest every run
    Scenario {
        #[arg(long, default_value = "small_binary_g")]
        name: String,

        /// Solver executable
        #[arg(long, default_value = DEFAULT_SOLVER)]
        solver: PathBuf,

        /// Working directory for the solver and the scenario outputs
        #[arg(long = "work-dir", default_value = ".")]
        work_dir: PathBuf,

        /// Dump directory the solver creates under the work directory
        #[arg(long = "solver-tmp", default_value = DEFAULT_SOLVER_TMP)]
        solver_tmp: PathBuf,
    },
}

#[derive(Debug, Parser)]
#[command(name = "mpmtab", version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_summary(output: &PipelineOutput, pipeline: &Pipeline) {
    let origin = if output.reused {
        "reused prior outputs for"
    } else {
        "assembled from dumps in"
    };
    println!(
        "{origin} {} (fingerprint {})",
        pipeline.data_dir().display(),
        output.fingerprint
    );
    let layout = pipeline.layout();
    for kind in TableKind::ALL {
        let batch = output.tables.get(kind);
        println!(
            "{}: {} rows x {} columns -> {}",
            kind.name(),
            batch.num_rows(),
            batch.num_columns(),
            layout.table_path(kind).display()
        );
    }
}

fn print_field_shapes(output: &PipelineOutput) -> CliResult<()> {
    let Some(fields) = &output.fields else {
        println!("field tables were not loaded");
        return Ok(());
    };
    for (field, table) in fields {
        // Component columns plus the step column.
        let batch = table.to_record_batch(true).context(RenderSnafu)?;
        println!("{field}: ({}, {})", batch.num_rows(), batch.num_columns() - 1);
    }
    Ok(())
}

fn cmd_ingest(
    data_dir: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    cache: Option<PathBuf>,
    verbose: bool,
) -> CliResult<()> {
    let mut cfg = match &config {
        Some(path) => PipelineConfig::from_json_file(path).context(ConfigSnafu)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = data_dir {
        cfg.data_dir = dir;
    }
    if out_dir.is_some() {
        cfg.out_dir = out_dir;
    }
    if cache.is_some() {
        cfg.cache = cache;
    }

    let pipeline = Pipeline::new(cfg).context(PipelineSnafu)?;
    let output = pipeline.run().context(PipelineSnafu)?;
    if verbose {
        print_field_shapes(&output)?;
    }
    print_summary(&output, &pipeline);
    Ok(())
}

fn cmd_inspect(table: &Path, max_rows: usize) -> CliResult<()> {
    let batch = read_table(table).context(ReadTableSnafu {
        path: table.display().to_string(),
    })?;
    let head = batch.slice(0, max_rows.min(batch.num_rows()));
    if head.num_rows() > 0 {
        let rendered = pretty_format_batches(&[head]).context(RenderSnafu)?;
        println!("{rendered}");
    }
    println!("total_rows: {}", batch.num_rows());
    Ok(())
}

fn cmd_scenario(
    name: &str,
    solver: PathBuf,
    work_dir: PathBuf,
    solver_tmp: PathBuf,
) -> CliResult<()> {
    let scenario = find_scenario(name)?;
    let runner = ScenarioRunner {
        solver,
        work_dir,
        solver_tmp,
    };
    for report in runner.run(&scenario)? {
        println!(
            "{} -> {} ({} particle rows)",
            report.raw_dir.display(),
            report.out_dir.display(),
            report.output.tables.particles.num_rows()
        );
    }
    Ok(())
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.cmd {
        Command::Ingest {
            data_dir,
            out_dir,
            config,
            cache,
            verbose,
        } => cmd_ingest(data_dir, out_dir, config, cache, verbose),
        Command::Inspect { table, max_rows } => cmd_inspect(&table, max_rows),
        Command::Scenario {
            name,
            solver,
            work_dir,
            solver_tmp,
        } => cmd_scenario(&name, solver, work_dir, solver_tmp),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
