//! End-to-end ingestion: dumps in, CSV tables out.
//!
//! ```text
//! discover -> fingerprint -> reuse prior outputs
//!                         \-> cache or load -> assemble -> persist
//! ```

use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};
use tracing::{info, warn};

use crate::assemble::{self, AssembleError, OutputTables};
use crate::cache::{self, CacheLookup};
use crate::config::{ConfigError, PipelineConfig};
use crate::field::FieldRegistry;
use crate::fingerprint::{Fingerprint, fingerprint};
use crate::layout::OutputLayout;
use crate::loader::{self, DumpListing, LoadError};
use crate::output::{self, OutputError};
use crate::table::FieldSet;

/// Errors that abort a pipeline run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    /// Invalid configuration.
    #[snafu(display("Configuration error: {source}"))]
    Config {
        /// Underlying config error.
        source: ConfigError,
    },

    /// A dump file could not be discovered, read or reshaped.
    #[snafu(display("Failed to load fields: {source}"))]
    Load {
        /// Underlying loader error.
        source: LoadError,
    },

    /// Loaded fields could not be joined.
    #[snafu(display("Failed to assemble tables: {source}"))]
    Assemble {
        /// Underlying assembler error.
        source: AssembleError,
    },

    /// Tables could not be written.
    #[snafu(display("Failed to write outputs: {source}"))]
    Output {
        /// Underlying output error.
        source: OutputError,
    },
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// The three tables, freshly assembled or read back.
    pub tables: OutputTables,
    /// True when prior outputs matched the inputs and were returned as is.
    pub reused: bool,
    /// Fingerprint of the inputs.
    pub fingerprint: Fingerprint,
    /// The loaded field tables; `None` when outputs were reused.
    pub fields: Option<FieldSet>,
}

/// A configured ingestion run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: FieldRegistry,
    data_dir: PathBuf,
    layout: OutputLayout,
    cache: Option<PathBuf>,
}

impl Pipeline {
    /// Validate `config` and prepare a run.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let registry = config.registry().context(ConfigSnafu)?;
        let out_dir = config.out_dir().context(ConfigSnafu)?.to_path_buf();
        Ok(Self::with_registry(
            registry,
            config.data_dir,
            out_dir,
            config.cache,
        ))
    }

    /// Prepare a run with an explicit registry.
    pub fn with_registry(
        registry: FieldRegistry,
        data_dir: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
        cache: Option<PathBuf>,
    ) -> Self {
        Self {
            registry,
            data_dir: data_dir.into(),
            layout: OutputLayout::new(out_dir),
            cache,
        }
    }

    /// The dump directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The output layout.
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Load the field set, through the cache when one is configured.
    pub fn load_fields(
        &self,
        listing: &DumpListing,
        fingerprint: &Fingerprint,
    ) -> Result<FieldSet, PipelineError> {
        let Some(path) = &self.cache else {
            return loader::load_listing(listing, &self.registry).context(LoadSnafu);
        };

        match cache::load(path, fingerprint, &self.registry) {
            Ok(CacheLookup::Hit(set)) => return Ok(set),
            Ok(CacheLookup::Missing | CacheLookup::Stale) => {}
            Err(e) => warn!(error = %e, "ignoring unusable field cache"),
        }

        let set = loader::load_listing(listing, &self.registry).context(LoadSnafu)?;
        if let Err(e) = cache::save(path, &set, fingerprint) {
            warn!(error = %e, "failed to save field cache");
        }
        Ok(set)
    }

    /// Run the pipeline.
    pub fn run(&self) -> Result<PipelineOutput, PipelineError> {
        let listing = loader::discover(&self.data_dir, &self.registry).context(LoadSnafu)?;
        let fingerprint = fingerprint(&listing, &self.registry);
        info!(
            data_dir = %self.data_dir.display(),
            files = listing.len(),
            %fingerprint,
            "discovered dumps"
        );

        match output::load_current(&self.layout, &fingerprint) {
            Ok(Some(tables)) => {
                info!(out_dir = %self.layout.root().display(), "outputs are current, reusing");
                return Ok(PipelineOutput {
                    tables,
                    reused: true,
                    fingerprint,
                    fields: None,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "prior outputs are unreadable, recomputing"),
        }

        let fields = self.load_fields(&listing, &fingerprint)?;
        let tables = assemble::assemble(&fields).context(AssembleSnafu)?;
        output::write_outputs(&self.layout, &tables, &fingerprint).context(OutputSnafu)?;

        Ok(PipelineOutput {
            tables,
            reused: false,
            fingerprint,
            fields: Some(fields),
        })
    }
}
