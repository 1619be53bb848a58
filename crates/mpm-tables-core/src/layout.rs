//! On-disk layout of an output directory.
//!
//! ```text
//! <out_dir>/
//!   results.csv     assembled per-particle table
//!   velocity.csv    grid velocity table
//!   mass.csv        grid mass table
//!   manifest.json   fingerprint and table summary, written last
//! ```

use std::path::{Path, PathBuf};

/// File holding the assembled per-particle table.
pub const RESULTS_FILE_NAME: &str = "results.csv";

/// File holding the grid velocity table.
pub const VELOCITY_FILE_NAME: &str = "velocity.csv";

/// File holding the grid mass table.
pub const MASS_FILE_NAME: &str = "mass.csv";

/// Manifest recording which inputs produced the tables.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Default file name of the optional field cache blob.
pub const DEFAULT_CACHE_FILE_NAME: &str = "sim_results_cache.parquet";

/// The three output tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Assembled per-particle table.
    Particles,
    /// Grid velocity.
    Velocity,
    /// Grid mass.
    Mass,
}

impl TableKind {
    /// All kinds in write order.
    pub const ALL: [TableKind; 3] = [TableKind::Particles, TableKind::Velocity, TableKind::Mass];

    /// Short name used in the manifest and logs.
    pub fn name(self) -> &'static str {
        match self {
            TableKind::Particles => "particles",
            TableKind::Velocity => "velocity",
            TableKind::Mass => "mass",
        }
    }

    /// File name under the output directory.
    pub fn file_name(self) -> &'static str {
        match self {
            TableKind::Particles => RESULTS_FILE_NAME,
            TableKind::Velocity => VELOCITY_FILE_NAME,
            TableKind::Mass => MASS_FILE_NAME,
        }
    }
}

/// Paths under one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The output directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of one output table.
    pub fn table_path(&self, kind: TableKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    /// Path of the manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }
}
