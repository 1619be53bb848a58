//! Strongly-typed field tables.
//!
//! A [`FieldTable`] stores one field's full time series as row-major
//! component values plus a [`RowKey`] per row. The key replaces the
//! trailing timestep column of an untyped frame and additionally records
//! the row's position inside its dump, so tables can be joined on an
//! explicit `(step, index)` key rather than on position alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, UInt64Array};
use arrow::datatypes::{DataType, Field as ArrowField, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::field::Field;

/// Name of the leading per-step row index column in output tables.
pub const INDEX_COLUMN: &str = "index";

/// Name of the optional trailing timestep column.
pub const STEP_COLUMN: &str = "step";

/// Loaded tables keyed by field, iterated in canonical field order.
pub type FieldSet = BTreeMap<Field, FieldTable>;

/// Identity of one observation: the timestep and the row's position in that
/// timestep's dump (particle index, grid row or grid cell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    /// Timestep parsed from the dump filename.
    pub step: u64,
    /// Zero-based row position within the dump.
    pub index: u64,
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRow<'a> {
    /// Row identity.
    pub key: RowKey,
    /// The row's `width` component values.
    pub components: &'a [f64],
}

/// One field's rows across all timesteps, grouped by ascending step.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTable {
    field: Field,
    width: usize,
    keys: Vec<RowKey>,
    values: Vec<f64>,
}

impl FieldTable {
    /// Create an empty table whose rows hold `width` components.
    pub fn new(field: Field, width: usize) -> Self {
        Self {
            field,
            width,
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Append one reshaped dump. `payload.len()` must be a multiple of the width.
    pub(crate) fn push_step(&mut self, step: u64, payload: &[f64]) {
        debug_assert_eq!(payload.len() % self.width, 0);
        let rows = payload.len() / self.width;
        self.keys.extend((0..rows as u64).map(|index| RowKey { step, index }));
        self.values.extend_from_slice(payload);
    }

    /// Append a single row. `components.len()` must equal the width.
    pub(crate) fn push_row(&mut self, key: RowKey, components: &[f64]) {
        debug_assert_eq!(components.len(), self.width);
        self.keys.push(key);
        self.values.extend_from_slice(components);
    }

    /// The field this table holds.
    pub fn field(&self) -> Field {
        self.field
    }

    /// Components per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Row keys in table order.
    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    /// All rows in table order.
    pub fn rows(&self) -> impl Iterator<Item = FieldRow<'_>> {
        self.keys
            .iter()
            .zip(self.values.chunks_exact(self.width))
            .map(|(key, components)| FieldRow {
                key: *key,
                components,
            })
    }

    /// `(step, row count)` for every step, in table order.
    pub fn step_counts(&self) -> Vec<(u64, usize)> {
        let mut out: Vec<(u64, usize)> = Vec::new();
        for key in &self.keys {
            match out.last_mut() {
                Some((step, count)) if *step == key.step => *count += 1,
                _ => out.push((key.step, 1)),
            }
        }
        out
    }

    /// Values of component `c` for every row.
    pub fn component(&self, c: usize) -> Vec<f64> {
        self.values
            .chunks_exact(self.width)
            .map(|row| row[c])
            .collect()
    }

    /// Output column names: `<field>_<i>` when multi-component, else `<field>`.
    pub fn column_names(&self) -> Vec<String> {
        let name = self.field.name();
        if self.width == 1 {
            vec![name.to_string()]
        } else {
            (0..self.width).map(|i| format!("{name}_{i}")).collect()
        }
    }

    /// Component columns as Arrow arrays, paired with their output names.
    pub fn component_columns(&self) -> Vec<(ArrowField, ArrayRef)> {
        self.column_names()
            .into_iter()
            .enumerate()
            .map(|(c, name)| {
                let array: ArrayRef = Arc::new(Float64Array::from(self.component(c)));
                (ArrowField::new(name, DataType::Float64, false), array)
            })
            .collect()
    }

    /// Per-step row indices as an Arrow array.
    pub fn index_column(&self) -> ArrayRef {
        Arc::new(UInt64Array::from_iter_values(
            self.keys.iter().map(|k| k.index),
        ))
    }

    /// Convert to a record batch: `index`, the component columns and, when
    /// `with_step` is set, a trailing `step` column.
    pub fn to_record_batch(&self, with_step: bool) -> Result<RecordBatch, ArrowError> {
        let mut fields = vec![ArrowField::new(INDEX_COLUMN, DataType::UInt64, false)];
        let mut columns = vec![self.index_column()];

        for (field, array) in self.component_columns() {
            fields.push(field);
            columns.push(array);
        }

        if with_step {
            fields.push(ArrowField::new(STEP_COLUMN, DataType::UInt64, false));
            columns.push(Arc::new(UInt64Array::from_iter_values(
                self.keys.iter().map(|k| k.step),
            )));
        }

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
    }
}
