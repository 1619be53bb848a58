//! Field Loader: discover, order, parse and reshape timestep dumps.
//!
//! Loading happens in two phases so the directory listing can be reused
//! (for example to fingerprint the inputs) without reading file contents:
//!
//! 1. [`discover`] lists the dump directory once, classifies every file
//!    against the [`FieldRegistry`], sorts each field's files by step and
//!    checks that every registered field has at least one file.
//! 2. [`load_listing`] reads each file in step order, parses its payload,
//!    reshapes it under the field's [`Shape`](crate::field::Shape) and
//!    appends it to the field's [`FieldTable`].
//!
//! Any failure aborts the whole load; no partial [`FieldSet`] is returned.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info};

use crate::dump::{self, InvalidNumber};
use crate::field::registry::FileMatch;
use crate::field::{Field, FieldRegistry, ShapeMismatch};
use crate::storage::{self, StorageError, io_error};
use crate::table::{FieldSet, FieldTable};

/// Result type for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors raised while discovering or loading dumps.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoadError {
    /// The dump directory could not be listed.
    #[snafu(display("Cannot list dump directory: {source}"))]
    ListDir {
        /// Underlying storage error.
        source: StorageError,
    },

    /// One or more registered fields have no dump files.
    #[snafu(display("No dump files found in {dir} for field(s): {}", fields.join(", ")))]
    MissingField {
        /// The scanned directory.
        dir: String,
        /// Names of every field without files.
        fields: Vec<String>,
    },

    /// A file carries a field token but no integer step prefix.
    #[snafu(display("Dump file {file} for field {field} has no integer timestep prefix"))]
    InvalidFileName {
        /// Field whose token matched.
        field: Field,
        /// The offending file.
        file: String,
    },

    /// Two files claim the same field and step.
    #[snafu(display("Field {field} has two dumps for timestep {step}: {first} and {second}"))]
    DuplicateTimestep {
        /// The field.
        field: Field,
        /// The repeated step.
        step: u64,
        /// First file for the step.
        first: String,
        /// Second file for the step.
        second: String,
    },

    /// A dump file could not be read.
    #[snafu(display("Cannot read dump file: {source}"))]
    Io {
        /// Underlying storage error.
        source: StorageError,
    },

    /// A dump file holds a non-numeric token.
    #[snafu(display("Cannot parse dump file {file}: {source}"))]
    Parse {
        /// The offending file.
        file: String,
        /// Location and text of the bad token.
        source: InvalidNumber,
    },

    /// A payload cannot be reshaped under its field's geometry.
    #[snafu(display("Shape error for field {field} in {file}: {source}"))]
    Shape {
        /// The field being loaded.
        field: Field,
        /// The offending file.
        file: String,
        /// Details of the mismatch.
        source: ShapeMismatch,
    },
}

/// One discovered dump file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFile {
    /// Field the file belongs to.
    pub field: Field,
    /// Timestep parsed from the filename.
    pub step: u64,
    /// Absolute or dir-relative path to the file.
    pub path: PathBuf,
    /// File size in bytes at discovery time.
    pub size: u64,
}

/// Every registered field's dump files, each list sorted by step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpListing {
    files: BTreeMap<Field, Vec<DumpFile>>,
}

impl DumpListing {
    /// Files for `field` in ascending step order.
    pub fn files(&self, field: Field) -> &[DumpFile] {
        self.files.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All files, grouped by field in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &DumpFile> {
        self.files.values().flatten()
    }

    /// Total number of files.
    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Whether no files were discovered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn display_name(path: &Path) -> String {
    path.display().to_string()
}

/// List `dir` once and assign each file to its field.
pub fn discover(dir: &Path, registry: &FieldRegistry) -> LoadResult<DumpListing> {
    let entries = fs::read_dir(dir)
        .map_err(|e| io_error(dir, e))
        .context(ListDirSnafu)?;

    let mut files: BTreeMap<Field, Vec<DumpFile>> = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_error(dir, e)).context(ListDirSnafu)?;
        let path = entry.path();

        // Non UTF-8 names cannot carry a registered token.
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };

        let field_step = match registry.classify(&name) {
            FileMatch::Unrelated => continue,
            FileMatch::InvalidStep { field } => {
                return InvalidFileNameSnafu {
                    field,
                    file: display_name(&path),
                }
                .fail();
            }
            FileMatch::Dump { field, step } => (field, step),
        };

        let meta = fs::metadata(&path)
            .map_err(|e| io_error(&path, e))
            .context(ListDirSnafu)?;
        if !meta.is_file() {
            continue;
        }

        let (field, step) = field_step;
        files.entry(field).or_default().push(DumpFile {
            field,
            step,
            path,
            size: meta.len(),
        });
    }

    let missing: Vec<String> = registry
        .specs()
        .iter()
        .filter(|spec| files.get(&spec.field).is_none_or(Vec::is_empty))
        .map(|spec| spec.field.name().to_string())
        .collect();
    ensure!(
        missing.is_empty(),
        MissingFieldSnafu {
            dir: display_name(dir),
            fields: missing,
        }
    );

    for (field, list) in files.iter_mut() {
        list.sort_by(|a, b| a.step.cmp(&b.step).then_with(|| a.path.cmp(&b.path)));
        if let Some(pair) = list.windows(2).find(|pair| pair[0].step == pair[1].step) {
            return DuplicateTimestepSnafu {
                field: *field,
                step: pair[0].step,
                first: display_name(&pair[0].path),
                second: display_name(&pair[1].path),
            }
            .fail();
        }
    }

    let listing = DumpListing { files };
    debug!(dir = %dir.display(), files = listing.len(), "discovered dumps");
    Ok(listing)
}

/// Read and reshape one dump, appending it to `table`.
fn load_file(table: &mut FieldTable, file: &DumpFile, resolution: usize) -> LoadResult<()> {
    let bytes = storage::read_all_bytes(&file.path).context(IoSnafu)?;
    // Invalid UTF-8 surfaces as an unparseable token naming the file.
    let text = String::from_utf8_lossy(&bytes);

    let payload = dump::parse_payload(&text).context(ParseSnafu {
        file: display_name(&file.path),
    })?;

    let rows = file
        .field
        .shape()
        .rows(payload.len(), resolution)
        .context(ShapeSnafu {
            field: file.field,
            file: display_name(&file.path),
        })?;

    debug!(field = %file.field, step = file.step, rows, "loaded dump");
    table.push_step(file.step, &payload);
    Ok(())
}

/// Load every field of a listing into tables.
pub fn load_listing(listing: &DumpListing, registry: &FieldRegistry) -> LoadResult<FieldSet> {
    let resolution = registry.resolution();
    let mut set = FieldSet::new();

    for spec in registry.specs() {
        let field = spec.field;
        let mut table = FieldTable::new(field, field.width(resolution));
        for file in listing.files(field) {
            load_file(&mut table, file, resolution)?;
        }
        info!(
            field = %field,
            steps = listing.files(field).len(),
            rows = table.len(),
            "field loaded"
        );
        set.insert(field, table);
    }

    Ok(set)
}

/// Discover and load every registered field under `dir`.
pub fn load_fields(dir: &Path, registry: &FieldRegistry) -> LoadResult<FieldSet> {
    let listing = discover(dir, registry)?;
    load_listing(&listing, registry)
}
