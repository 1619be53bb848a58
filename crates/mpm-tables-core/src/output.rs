//! Persist and reload the output tables.
//!
//! Tables are written as CSV with a header row and a leading `index`
//! column. All three files are staged before any of them is renamed into
//! place, the old manifest is removed before the renames and the new one is
//! written last, so a manifest only ever describes a complete set of tables.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field as ArrowField, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info};

use crate::assemble::OutputTables;
use crate::fingerprint::Fingerprint;
use crate::layout::{OutputLayout, TableKind};
use crate::storage::{self, OutputSink, StagedFile, StorageError};
use crate::table::INDEX_COLUMN;

/// Version of the manifest and CSV conventions.
pub const OUTPUT_FORMAT_VERSION: u32 = 1;

/// Result type for output operations.
pub type OutputResult<T> = Result<T, OutputError>;

/// Errors raised while writing or reading output tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OutputError {
    /// Filesystem failure.
    #[snafu(display("Storage error while handling output tables: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// CSV encoding or decoding failed.
    #[snafu(display("CSV error for {path}: {source}"))]
    Csv {
        /// The table file.
        path: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The manifest could not be encoded.
    #[snafu(display("Cannot encode output manifest: {source}"))]
    ManifestEncode {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The manifest could not be decoded.
    #[snafu(display("Cannot decode output manifest {path}: {source}"))]
    ManifestDecode {
        /// The manifest file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A table file does not follow the output conventions.
    #[snafu(display("Malformed output table {path}: {detail}"))]
    MalformedTable {
        /// The table file.
        path: String,
        /// What is wrong with it.
        detail: String,
    },
}

/// Summary of one written table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Table name, e.g. `particles`.
    pub name: String,
    /// File name under the output directory.
    pub file: String,
    /// Number of data rows.
    pub rows: usize,
    /// Header names in order.
    pub columns: Vec<String>,
}

/// Record of a complete output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputManifest {
    /// [`OUTPUT_FORMAT_VERSION`] at write time.
    pub format_version: u32,
    /// Fingerprint of the inputs the tables were built from.
    pub fingerprint: Fingerprint,
    /// When the tables were written.
    pub created_at: DateTime<Utc>,
    /// One entry per table, in write order.
    pub tables: Vec<TableEntry>,
}

impl OutputTables {
    /// The table for `kind`.
    pub fn get(&self, kind: TableKind) -> &RecordBatch {
        match kind {
            TableKind::Particles => &self.particles,
            TableKind::Velocity => &self.velocity,
            TableKind::Mass => &self.mass,
        }
    }
}

fn stage_csv(path: &Path, batch: &RecordBatch) -> OutputResult<StagedFile> {
    let mut sink = OutputSink::open(path).context(StorageSnafu)?;
    {
        let mut writer = arrow_csv::WriterBuilder::new()
            .with_header(true)
            .build(&mut sink);
        writer.write(batch).context(CsvSnafu {
            path: path.display().to_string(),
        })?;
    }
    sink.stage().context(StorageSnafu)
}

fn table_entry(kind: TableKind, batch: &RecordBatch) -> TableEntry {
    TableEntry {
        name: kind.name().to_string(),
        file: kind.file_name().to_string(),
        rows: batch.num_rows(),
        columns: batch
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect(),
    }
}

/// Write all three tables and the manifest under `layout`.
pub fn write_outputs(
    layout: &OutputLayout,
    tables: &OutputTables,
    fingerprint: &Fingerprint,
) -> OutputResult<OutputManifest> {
    storage::create_dir_all(layout.root()).context(StorageSnafu)?;

    let mut staged = Vec::with_capacity(TableKind::ALL.len());
    let mut entries = Vec::with_capacity(TableKind::ALL.len());
    for kind in TableKind::ALL {
        let batch = tables.get(kind);
        staged.push(stage_csv(&layout.table_path(kind), batch)?);
        entries.push(table_entry(kind, batch));
    }

    let manifest = OutputManifest {
        format_version: OUTPUT_FORMAT_VERSION,
        fingerprint: fingerprint.clone(),
        created_at: Utc::now(),
        tables: entries,
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest).context(ManifestEncodeSnafu)?;

    let manifest_path = layout.manifest_path();
    storage::remove_file_if_exists(&manifest_path).context(StorageSnafu)?;
    for file in staged {
        debug!(path = %file.final_path().display(), "committing table");
        file.commit().context(StorageSnafu)?;
    }
    storage::write_atomic(&manifest_path, &manifest_bytes).context(StorageSnafu)?;

    info!(dir = %layout.root().display(), "wrote output tables");
    Ok(manifest)
}

/// Read the manifest, if the output directory has one.
pub fn read_manifest(layout: &OutputLayout) -> OutputResult<Option<OutputManifest>> {
    let path = layout.manifest_path();
    let text = match storage::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e).context(StorageSnafu),
    };
    let manifest = serde_json::from_str(&text).context(ManifestDecodeSnafu {
        path: path.display().to_string(),
    })?;
    Ok(Some(manifest))
}

fn header_schema(path: &Path, bytes: &[u8]) -> OutputResult<Schema> {
    let malformed = |detail: &str| MalformedTableSnafu {
        path: path.display().to_string(),
        detail: detail.to_string(),
    };

    let header = bytes
        .split(|b| *b == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).trim_end_matches('\r').to_string())
        .unwrap_or_default();
    ensure!(!header.is_empty(), malformed("missing header row"));

    let names: Vec<&str> = header.split(',').collect();
    ensure!(
        names[0] == INDEX_COLUMN,
        malformed("first column is not the index column")
    );

    let fields = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let ty = if i == 0 {
                DataType::UInt64
            } else {
                DataType::Float64
            };
            ArrowField::new(*name, ty, false)
        })
        .collect::<Vec<_>>();
    Ok(Schema::new(fields))
}

/// Read one output CSV back into a single batch.
pub fn read_table(path: &Path) -> OutputResult<RecordBatch> {
    let bytes = storage::read_all_bytes(path).context(StorageSnafu)?;
    let schema = Arc::new(header_schema(path, &bytes)?);
    let csv_context = || CsvSnafu {
        path: path.display().to_string(),
    };

    let reader = arrow_csv::ReaderBuilder::new(schema.clone())
        .with_header(true)
        .build(Cursor::new(bytes))
        .with_context(|_| csv_context())?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|_| csv_context())?;

    concat_batches(&schema, &batches).with_context(|_| csv_context())
}

/// Read all three output tables.
pub fn read_outputs(layout: &OutputLayout) -> OutputResult<OutputTables> {
    Ok(OutputTables {
        particles: read_table(&layout.table_path(TableKind::Particles))?,
        velocity: read_table(&layout.table_path(TableKind::Velocity))?,
        mass: read_table(&layout.table_path(TableKind::Mass))?,
    })
}

/// Reload prior outputs when they were built from inputs with `fingerprint`.
///
/// Returns `Ok(None)` when there is no manifest, when it records another
/// format version or fingerprint, or when a table file is missing.
pub fn load_current(
    layout: &OutputLayout,
    fingerprint: &Fingerprint,
) -> OutputResult<Option<OutputTables>> {
    let Some(manifest) = read_manifest(layout)? else {
        return Ok(None);
    };
    if manifest.format_version != OUTPUT_FORMAT_VERSION || &manifest.fingerprint != fingerprint {
        debug!(
            recorded = %manifest.fingerprint,
            current = %fingerprint,
            "prior outputs are stale"
        );
        return Ok(None);
    }
    for kind in TableKind::ALL {
        if !storage::exists(&layout.table_path(kind)).context(StorageSnafu)? {
            return Ok(None);
        }
    }
    read_outputs(layout).map(Some)
}
