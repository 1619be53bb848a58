//! Optional single-file cache of a loaded [`FieldSet`].
//!
//! The blob is one Parquet file in long form, one row per component value:
//!
//! | column | type | meaning |
//! |---|---|---|
//! | `field` | Utf8 | canonical field name |
//! | `step` | UInt64 | row key step |
//! | `index` | UInt64 | row key index |
//! | `component` | UInt32 | component position within the row |
//! | `value` | Float64 | component value |
//!
//! File key/value metadata records the cache format version and the input
//! [`Fingerprint`]. A blob written for other inputs is stale and ignored. A
//! blob that cannot be decoded, or whose rows do not reassemble into whole
//! rows of the registered widths, is [`CacheError::CacheCorrupt`]; callers
//! answer that with a fresh load. The format is internal and not meant to be
//! read across versions.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Float64Builder, StringArray, StringBuilder, UInt32Array,
    UInt32Builder, UInt64Array, UInt64Builder,
};
use arrow::datatypes::{DataType, Field as ArrowField, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::errors::ParquetError;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

use crate::field::{Field, FieldRegistry};
use crate::fingerprint::Fingerprint;
use crate::storage::{self, StorageError};
use crate::table::{FieldSet, FieldTable, RowKey};

/// Bumped whenever the blob layout changes.
pub const CACHE_FORMAT_VERSION: &str = "1";

const VERSION_KEY: &str = "mpm_tables.cache_version";
const FINGERPRINT_KEY: &str = "mpm_tables.fingerprint";

/// Rows buffered per record batch when writing.
const WRITE_BATCH_ROWS: usize = 64 * 1024;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by the field cache.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CacheError {
    /// The blob exists but cannot be turned back into field tables.
    #[snafu(display("Field cache {path} is corrupt: {detail}"))]
    CacheCorrupt {
        /// The blob path.
        path: String,
        /// What went wrong.
        detail: String,
    },

    /// Reading or writing the blob failed.
    #[snafu(display("Storage error on field cache: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// Encoding the blob failed.
    #[snafu(display("Cannot encode field cache {path}: {source}"))]
    Encode {
        /// The blob path.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
    },
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// No blob at the path.
    Missing,
    /// A blob for other inputs or another format version.
    Stale,
    /// The cached tables.
    Hit(FieldSet),
}

fn cache_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        ArrowField::new("field", DataType::Utf8, false),
        ArrowField::new("step", DataType::UInt64, false),
        ArrowField::new("index", DataType::UInt64, false),
        ArrowField::new("component", DataType::UInt32, false),
        ArrowField::new("value", DataType::Float64, false),
    ]))
}

struct BatchBuilder {
    field: StringBuilder,
    step: UInt64Builder,
    index: UInt64Builder,
    component: UInt32Builder,
    value: Float64Builder,
    rows: usize,
}

impl BatchBuilder {
    fn new() -> Self {
        Self {
            field: StringBuilder::new(),
            step: UInt64Builder::with_capacity(WRITE_BATCH_ROWS),
            index: UInt64Builder::with_capacity(WRITE_BATCH_ROWS),
            component: UInt32Builder::with_capacity(WRITE_BATCH_ROWS),
            value: Float64Builder::with_capacity(WRITE_BATCH_ROWS),
            rows: 0,
        }
    }

    fn push(&mut self, field: Field, key: RowKey, component: u32, value: f64) {
        self.field.append_value(field.name());
        self.step.append_value(key.step);
        self.index.append_value(key.index);
        self.component.append_value(component);
        self.value.append_value(value);
        self.rows += 1;
    }

    fn finish(&mut self, schema: &SchemaRef) -> Result<RecordBatch, arrow::error::ArrowError> {
        self.rows = 0;
        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(self.field.finish()) as ArrayRef,
                Arc::new(self.step.finish()),
                Arc::new(self.index.finish()),
                Arc::new(self.component.finish()),
                Arc::new(self.value.finish()),
            ],
        )
    }
}

fn encode(
    fields: &FieldSet,
    fingerprint: &Fingerprint,
    version: &str,
) -> Result<Vec<u8>, ParquetError> {
    let schema = cache_schema();
    let props = WriterProperties::builder()
        .set_key_value_metadata(Some(vec![
            KeyValue::new(VERSION_KEY.to_string(), version.to_string()),
            KeyValue::new(FINGERPRINT_KEY.to_string(), fingerprint.0.clone()),
        ]))
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema.clone(), Some(props))?;
    let mut builder = BatchBuilder::new();

    for table in fields.values() {
        for row in table.rows() {
            for (c, value) in row.components.iter().enumerate() {
                builder.push(table.field(), row.key, c as u32, *value);
                if builder.rows >= WRITE_BATCH_ROWS {
                    writer.write(&builder.finish(&schema)?)?;
                }
            }
        }
    }
    if builder.rows > 0 {
        writer.write(&builder.finish(&schema)?)?;
    }
    writer.close()?;
    Ok(buf)
}

/// Write `fields` to the blob at `path`, replacing any previous blob.
pub fn save(path: &Path, fields: &FieldSet, fingerprint: &Fingerprint) -> CacheResult<()> {
    let bytes = encode(fields, fingerprint, CACHE_FORMAT_VERSION).context(EncodeSnafu {
        path: path.display().to_string(),
    })?;
    storage::write_atomic(path, &bytes).context(StorageSnafu)?;
    info!(path = %path.display(), bytes = bytes.len(), "saved field cache");
    Ok(())
}

fn metadata_value<'a>(kv: Option<&'a Vec<KeyValue>>, key: &str) -> Option<&'a str> {
    kv?.iter()
        .find(|entry| entry.key == key)
        .and_then(|entry| entry.value.as_deref())
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, idx: usize) -> Option<&'a T> {
    batch.column(idx).as_any().downcast_ref::<T>()
}

/// Rebuilds tables from long-form rows, checking that every row is whole.
struct Decoder<'a> {
    registry: &'a FieldRegistry,
    set: FieldSet,
    current: Option<FieldTable>,
    pending_key: Option<RowKey>,
    pending: Vec<f64>,
}

impl<'a> Decoder<'a> {
    fn new(registry: &'a FieldRegistry) -> Self {
        Self {
            registry,
            set: FieldSet::new(),
            current: None,
            pending_key: None,
            pending: Vec::new(),
        }
    }

    fn flush_row(&mut self) -> Result<(), String> {
        let (Some(key), Some(table)) = (self.pending_key.take(), self.current.as_mut()) else {
            return Ok(());
        };
        if self.pending.len() != table.width() {
            return Err(format!(
                "row {key:?} of {} has {} of {} components",
                table.field(),
                self.pending.len(),
                table.width()
            ));
        }
        table.push_row(key, &self.pending);
        self.pending.clear();
        Ok(())
    }

    fn flush_table(&mut self) -> Result<(), String> {
        self.flush_row()?;
        if let Some(table) = self.current.take() {
            if self.set.contains_key(&table.field()) {
                return Err(format!("field {} appears twice", table.field()));
            }
            self.set.insert(table.field(), table);
        }
        Ok(())
    }

    fn push(&mut self, name: &str, key: RowKey, component: u32, value: f64) -> Result<(), String> {
        let field: Field = name.parse().map_err(|e| format!("{e}"))?;

        if self.current.as_ref().map(FieldTable::field) != Some(field) {
            self.flush_table()?;
            self.current = Some(FieldTable::new(field, field.width(self.registry.resolution())));
        }

        if component == 0 {
            self.flush_row()?;
            self.pending_key = Some(key);
        } else if self.pending_key != Some(key) || self.pending.len() != component as usize {
            return Err(format!("out of order component {component} for {field} row {key:?}"));
        }
        self.pending.push(value);
        Ok(())
    }

    fn finish(mut self) -> Result<FieldSet, String> {
        self.flush_table()?;
        // Fields with no rows leave nothing in the blob.
        for spec in self.registry.specs() {
            let width = spec.field.width(self.registry.resolution());
            self.set
                .entry(spec.field)
                .or_insert_with(|| FieldTable::new(spec.field, width));
        }
        Ok(self.set)
    }
}

fn decode(
    builder: ParquetRecordBatchReaderBuilder<Bytes>,
    registry: &FieldRegistry,
) -> Result<FieldSet, String> {
    let reader = builder.build().map_err(|e| e.to_string())?;

    let mut decoder = Decoder::new(registry);
    for batch in reader {
        let batch = batch.map_err(|e| e.to_string())?;
        if batch.num_columns() != 5 {
            return Err(format!("expected 5 columns, found {}", batch.num_columns()));
        }
        let (Some(names), Some(steps), Some(indices), Some(components), Some(values)) = (
            column::<StringArray>(&batch, 0),
            column::<UInt64Array>(&batch, 1),
            column::<UInt64Array>(&batch, 2),
            column::<UInt32Array>(&batch, 3),
            column::<Float64Array>(&batch, 4),
        ) else {
            return Err("unexpected column types".to_string());
        };

        for i in 0..batch.num_rows() {
            let key = RowKey {
                step: steps.value(i),
                index: indices.value(i),
            };
            decoder.push(names.value(i), key, components.value(i), values.value(i))?;
        }
    }
    decoder.finish()
}

/// Look up the blob at `path` for inputs with `fingerprint`.
pub fn load(
    path: &Path,
    fingerprint: &Fingerprint,
    registry: &FieldRegistry,
) -> CacheResult<CacheLookup> {
    let bytes = match storage::read_all_bytes(path) {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => return Ok(CacheLookup::Missing),
        Err(e) => return Err(e).context(StorageSnafu),
    };

    let corrupt = |detail: String| CacheError::CacheCorrupt {
        path: path.display().to_string(),
        detail,
    };

    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))
        .map_err(|e| corrupt(e.to_string()))?;
    let kv = builder.metadata().file_metadata().key_value_metadata();
    let version = metadata_value(kv, VERSION_KEY);
    let recorded = metadata_value(kv, FINGERPRINT_KEY);
    if version != Some(CACHE_FORMAT_VERSION) || recorded != Some(fingerprint.0.as_str()) {
        debug!(path = %path.display(), ?version, ?recorded, "field cache is stale");
        return Ok(CacheLookup::Stale);
    }

    let set = decode(builder, registry).map_err(corrupt)?;
    info!(path = %path.display(), fields = set.len(), "loaded field cache");
    Ok(CacheLookup::Hit(set))
}
