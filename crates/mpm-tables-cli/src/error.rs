use std::process::ExitStatus;

use mpm_tables_core::{PipelineError, config::ConfigError, output::OutputError};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Invalid configuration: {source}"))]
    Config { source: ConfigError },

    #[snafu(display("Pipeline failed: {source}"))]
    Pipeline {
        #[snafu(source(from(PipelineError, Box::new)))]
        source: Box<PipelineError>,
    },

    #[snafu(display("Cannot read table {path}: {source}"))]
    ReadTable { path: String, source: OutputError },

    #[snafu(display("Failed to render table: {source}"))]
    Render {
        source: arrow::error::ArrowError,
    },

    #[snafu(display("Unknown scenario '{name}'. Known scenarios: {known}"))]
    UnknownScenario { name: String, known: String },

    #[snafu(display("Solver executable not accessible: {path}"))]
    SolverMissing {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to launch solver {path}"))]
    SpawnSolver {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Solver run {run} of scenario {scenario} failed with {status}"))]
    SolverFailed {
        scenario: String,
        run: usize,
        status: ExitStatus,
    },

    #[snafu(display(
        "Solver produced no dump directory at {path}. \
         Check --solver-tmp matches where the solver writes."
    ))]
    NoSolverOutput { path: String },

    #[snafu(display("Failed to prepare directory {path}"))]
    PrepareDir {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to move {src} -> {dst}"))]
    MoveDumps {
        src: String,
        dst: String,
        source: std::io::Error,
    },
}
