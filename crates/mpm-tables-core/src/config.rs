//! Pipeline configuration.
//!
//! A config file is JSON:
//!
//! ```json
//! {
//!   "data_dir": "../build/tmp",
//!   "out_dir": "small_binary_g_0",
//!   "cache": "sim_results_cache.parquet",
//!   "naming": { "separator": "_", "extension": "txt" },
//!   "tokens": { "lame": "lambda" }
//! }
//! ```
//!
//! Every key is optional except that a run needs an output directory, which
//! the command line usually supplies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::field::{Field, FieldRegistry, Naming, RESOLUTION, RegistryError};
use crate::storage::{self, StorageError};

/// Default directory the solver dumps into.
pub const DEFAULT_DATA_DIR: &str = "../build/tmp";

/// Errors raised while reading or validating configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// The config file could not be read.
    #[snafu(display("Cannot read config file: {source}"))]
    Read {
        /// Underlying storage error.
        source: StorageError,
    },

    /// The config file is not valid JSON for [`PipelineConfig`].
    #[snafu(display("Cannot parse config file {path}: {source}"))]
    Parse {
        /// The config file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A token override names a field that does not exist.
    #[snafu(display("Token override for unknown field '{name}'"))]
    UnknownField {
        /// The unrecognized field name.
        name: String,
    },

    /// The naming scheme or tokens are invalid.
    #[snafu(display("Invalid field registry: {source}"))]
    InvalidRegistry {
        /// Underlying validation error.
        source: RegistryError,
    },

    /// No output directory was configured.
    #[snafu(display("No output directory configured"))]
    MissingOutDir,
}

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory holding the raw dump files.
    pub data_dir: PathBuf,
    /// Directory receiving the CSV tables and manifest.
    pub out_dir: Option<PathBuf>,
    /// Field cache blob; `None` disables the cache.
    pub cache: Option<PathBuf>,
    /// Filename conventions.
    pub naming: Naming,
    /// Per-field token overrides keyed by canonical field name.
    pub tokens: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            out_dir: None,
            cache: None,
            naming: Naming::default(),
            tokens: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Parse a config from JSON text.
    pub fn from_json_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).context(ParseSnafu {
            path: origin.to_string(),
        })
    }

    /// Read a config file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = storage::read_to_string(path).context(ReadSnafu)?;
        Self::from_json_str(&text, &path.display().to_string())
    }

    /// The configured output directory.
    pub fn out_dir(&self) -> Result<&Path, ConfigError> {
        self.out_dir.as_deref().context(MissingOutDirSnafu)
    }

    /// Build the validated field registry at the solver's grid resolution.
    pub fn registry(&self) -> Result<FieldRegistry, ConfigError> {
        let mut tokens = BTreeMap::new();
        for (name, token) in &self.tokens {
            let field: Field = name
                .parse()
                .map_err(|_| UnknownFieldSnafu { name: name.clone() }.build())?;
            tokens.insert(field, token.clone());
        }
        FieldRegistry::new(self.naming.clone(), &tokens, RESOLUTION).context(InvalidRegistrySnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg = PipelineConfig::from_json_str("{}", "inline").expect("parse");
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.data_dir, PathBuf::from("../build/tmp"));
        assert_eq!(cfg.registry().expect("registry"), FieldRegistry::default());
    }

    #[test]
    fn token_overrides_apply() {
        let cfg = PipelineConfig::from_json_str(
            r#"{ "out_dir": "out", "tokens": { "lame": "lambda" } }"#,
            "inline",
        )
        .expect("parse");
        let reg = cfg.registry().expect("registry");
        assert_eq!(reg.token(Field::Lame), "lambda");
        assert_eq!(reg.token(Field::X), "x");
        assert_eq!(cfg.out_dir().expect("out dir"), Path::new("out"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let cfg = PipelineConfig::from_json_str(r#"{ "tokens": { "pressure": "p" } }"#, "inline")
            .expect("parse");
        let err = cfg.registry().expect_err("unknown");
        assert!(matches!(err, ConfigError::UnknownField { ref name } if name == "pressure"));
    }

    #[test]
    fn colliding_tokens_are_rejected() {
        let cfg = PipelineConfig::from_json_str(r#"{ "tokens": { "v": "x" } }"#, "inline")
            .expect("parse");
        let err = cfg.registry().expect_err("duplicate");
        assert!(matches!(
            err,
            ConfigError::InvalidRegistry {
                source: RegistryError::DuplicateToken { .. }
            }
        ));
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let err = PipelineConfig::from_json_str(r#"{ "data": "x" }"#, "inline").expect_err("bad");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("inline"));
    }

    #[test]
    fn missing_out_dir_is_reported() {
        let err = PipelineConfig::default().out_dir().expect_err("missing");
        assert!(matches!(err, ConfigError::MissingOutDir));
    }
}
