//! Solver scenarios: run the solver for each parameter set, then ingest
//! what it dumped.

use std::path::{Path, PathBuf};
use std::process::Command;

use mpm_tables_core::{FieldRegistry, Pipeline, PipelineOutput};
use snafu::{OptionExt, ResultExt, ensure};
use tracing::info;

use crate::error::{
    CliResult, MoveDumpsSnafu, NoSolverOutputSnafu, PipelineSnafu, PrepareDirSnafu,
    SolverFailedSnafu, SolverMissingSnafu, SpawnSolverSnafu, UnknownScenarioSnafu,
};

/// Default solver location, resolved against the caller's working directory.
pub const DEFAULT_SOLVER: &str = "../build/nuclear_mpm_solver";

/// Directory the solver dumps into, relative to its working directory.
pub const DEFAULT_SOLVER_TMP: &str = "tmp";

/// One solver invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverArgs {
    pub steps: u32,
    pub gravity: f64,
    pub cube0_x: f64,
    pub cube0_y: f64,
    pub dump: bool,
}

impl SolverArgs {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(9);
        if self.dump {
            args.push("--dump".to_string());
        }
        args.extend([
            "--steps".to_string(),
            self.steps.to_string(),
            "--gravity".to_string(),
            self.gravity.to_string(),
            "--cube0-x".to_string(),
            self.cube0_x.to_string(),
            "--cube0-y".to_string(),
            self.cube0_y.to_string(),
        ]);
        args
    }
}

/// A named series of solver runs differing in one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: &'static str,
    /// The parameter that changes between runs.
    pub varies: &'static str,
    pub runs: Vec<SolverArgs>,
}

fn small_binary_g() -> Scenario {
    let run = |gravity| SolverArgs {
        steps: 100,
        gravity,
        cube0_x: 0.4,
        cube0_y: 0.6,
        dump: true,
    };
    Scenario {
        name: "small_binary_g",
        varies: "gravity",
        runs: vec![run(-9.8), run(-19.8)],
    }
}

pub fn builtin_scenarios() -> Vec<Scenario> {
    vec![small_binary_g()]
}

pub fn find_scenario(name: &str) -> CliResult<Scenario> {
    let all = builtin_scenarios();
    let known = all.iter().map(|s| s.name).collect::<Vec<_>>().join(", ");
    all.into_iter()
        .find(|s| s.name == name)
        .context(UnknownScenarioSnafu {
            name: name.to_string(),
            known,
        })
}

/// Where one scenario runs and what it invokes.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    pub solver: PathBuf,
    pub work_dir: PathBuf,
    pub solver_tmp: PathBuf,
}

/// Outcome of one solver run.
#[derive(Debug)]
pub struct RunReport {
    pub raw_dir: PathBuf,
    pub out_dir: PathBuf,
    pub output: PipelineOutput,
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn remove_dir_if_exists(path: &Path) -> CliResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(PrepareDirSnafu {
            path: display(path),
        }),
    }
}

impl ScenarioRunner {
    /// A bare program name is looked up on `PATH`; anything with a directory
    /// component is resolved against the caller's working directory.
    fn solver_program(&self) -> CliResult<PathBuf> {
        if self.solver.components().count() <= 1 {
            return Ok(self.solver.clone());
        }
        std::fs::canonicalize(&self.solver).context(SolverMissingSnafu {
            path: display(&self.solver),
        })
    }

    pub fn run(&self, scenario: &Scenario) -> CliResult<Vec<RunReport>> {
        let program = self.solver_program()?;
        let tmp = self.work_dir.join(&self.solver_tmp);
        remove_dir_if_exists(&tmp)?;

        let mut reports = Vec::with_capacity(scenario.runs.len());
        for (i, args) in scenario.runs.iter().enumerate() {
            let argv = args.to_args();
            info!(scenario = scenario.name, run = i, args = %argv.join(" "), "running solver");

            let status = Command::new(&program)
                .args(&argv)
                .current_dir(&self.work_dir)
                .status()
                .context(SpawnSolverSnafu {
                    path: display(&program),
                })?;
            ensure!(
                status.success(),
                SolverFailedSnafu {
                    scenario: scenario.name,
                    run: i,
                    status,
                }
            );
            ensure!(tmp.is_dir(), NoSolverOutputSnafu { path: display(&tmp) });

            let out_dir = self.work_dir.join(format!("{}_{i}", scenario.name));
            let raw_dir = self.work_dir.join(format!("{}_{i}_raw", scenario.name));
            remove_dir_if_exists(&raw_dir)?;
            std::fs::rename(&tmp, &raw_dir).context(MoveDumpsSnafu {
                src: display(&tmp),
                dst: display(&raw_dir),
            })?;

            let output = Pipeline::with_registry(FieldRegistry::default(), &raw_dir, &out_dir, None)
                .run()
                .context(PipelineSnafu)?;
            reports.push(RunReport {
                raw_dir,
                out_dir,
                output,
            });
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_args_render_in_solver_order() {
        let args = SolverArgs {
            steps: 100,
            gravity: -9.8,
            cube0_x: 0.4,
            cube0_y: 0.6,
            dump: true,
        };
        assert_eq!(
            args.to_args().join(" "),
            "--dump --steps 100 --gravity -9.8 --cube0-x 0.4 --cube0-y 0.6"
        );
    }

    #[test]
    fn small_binary_g_varies_gravity() {
        let s = find_scenario("small_binary_g").expect("builtin");
        assert_eq!(s.varies, "gravity");
        let gravities: Vec<f64> = s.runs.iter().map(|r| r.gravity).collect();
        assert_eq!(gravities, vec![-9.8, -19.8]);
        assert_eq!(
            s.runs[1].to_args().join(" "),
            "--dump --steps 100 --gravity -19.8 --cube0-x 0.4 --cube0-y 0.6"
        );
    }

    #[test]
    fn unknown_scenario_lists_known_names() {
        let err = find_scenario("large").expect_err("unknown");
        assert!(err.to_string().contains("small_binary_g"));
    }
}
