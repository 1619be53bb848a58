//! Table Assembler: join per-particle fields into one wide table.
//!
//! `x` fixes the canonical row keys. Every other per-particle field must
//! carry exactly the same `(step, index)` keys before its columns are
//! appended; the first step where the row counts disagree is reported as
//! an [`AssembleError::Alignment`]. Grid fields keep their own tables since
//! their rows are grid cells, not particles.

use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{DataType, Field as ArrowField, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::info;

use crate::field::{Domain, Field};
use crate::table::{FieldSet, FieldTable, INDEX_COLUMN};

/// Result type for assembly.
pub type AssembleResult<T> = Result<T, AssembleError>;

/// Errors raised while assembling output tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AssembleError {
    /// A field required for assembly is absent from the loaded set.
    #[snafu(display("Field {field} was not loaded"))]
    MissingTable {
        /// The absent field.
        field: Field,
    },

    /// A per-particle field's rows do not line up with the reference field.
    #[snafu(display(
        "Field {field} is misaligned with {reference} at timestep {step}: \
         expected {expected} rows, found {actual}"
    ))]
    Alignment {
        /// Field being joined.
        field: Field,
        /// Field defining the canonical rows.
        reference: Field,
        /// First timestep where the fields disagree.
        step: u64,
        /// Rows the reference field has at `step`.
        expected: usize,
        /// Rows the joined field has at `step`.
        actual: usize,
    },

    /// Building an Arrow batch failed.
    #[snafu(display("Arrow error while assembling tables: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// The three durable outputs of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTables {
    /// Every per-particle field joined on `(step, index)`.
    pub particles: RecordBatch,
    /// Grid velocity, one row per grid cell per timestep.
    pub velocity: RecordBatch,
    /// Grid mass, one row per grid row per timestep.
    pub mass: RecordBatch,
}

/// Per-particle fields in join order: `x`, `v`, then the rest canonically.
pub fn particle_fields() -> impl Iterator<Item = Field> {
    Field::ALL
        .into_iter()
        .filter(|f| f.domain() == Domain::Particle)
}

fn table(fields: &FieldSet, field: Field) -> AssembleResult<&FieldTable> {
    fields.get(&field).context(MissingTableSnafu { field })
}

/// Verify that `other` has exactly the row keys of `reference`.
pub fn check_alignment(reference: &FieldTable, other: &FieldTable) -> AssembleResult<()> {
    if reference.keys() == other.keys() {
        return Ok(());
    }

    let expected = reference.step_counts();
    let actual = other.step_counts();
    let count_at = |counts: &[(u64, usize)], step: u64| {
        counts
            .iter()
            .find(|(s, _)| *s == step)
            .map_or(0, |(_, n)| *n)
    };

    let steps: BTreeSet<u64> = expected
        .iter()
        .chain(actual.iter())
        .map(|(s, _)| *s)
        .collect();
    let mismatch = steps
        .into_iter()
        .map(|step| (step, count_at(&expected, step), count_at(&actual, step)))
        .find(|(_, e, a)| e != a);

    let (step, expected, actual) = match mismatch {
        Some(found) => found,
        // Same counts per step but different keys: report the first divergent row.
        None => {
            let step = reference
                .keys()
                .iter()
                .zip(other.keys())
                .find(|(a, b)| a != b)
                .map_or(0, |(a, _)| a.step);
            let n = count_at(&expected, step);
            (step, n, n)
        }
    };

    AlignmentSnafu {
        field: other.field(),
        reference: reference.field(),
        step,
        expected,
        actual,
    }
    .fail()
}

/// Join every per-particle field column-wise into one batch.
pub fn assemble_particles(fields: &FieldSet) -> AssembleResult<RecordBatch> {
    let reference = table(fields, Field::X)?;

    let mut schema_fields = vec![ArrowField::new(INDEX_COLUMN, DataType::UInt64, false)];
    let mut columns: Vec<ArrayRef> = vec![reference.index_column()];

    for field in particle_fields() {
        let t = table(fields, field)?;
        check_alignment(reference, t)?;
        for (f, array) in t.component_columns() {
            schema_fields.push(f);
            columns.push(array);
        }
    }

    RecordBatch::try_new(Arc::new(Schema::new(schema_fields)), columns).context(ArrowSnafu)
}

/// Produce the assembled particle table and the two grid tables.
pub fn assemble(fields: &FieldSet) -> AssembleResult<OutputTables> {
    let particles = assemble_particles(fields)?;
    let velocity = table(fields, Field::Velocity)?
        .to_record_batch(false)
        .context(ArrowSnafu)?;
    let mass = table(fields, Field::Mass)?
        .to_record_batch(false)
        .context(ArrowSnafu)?;

    info!(
        particle_rows = particles.num_rows(),
        particle_columns = particles.num_columns(),
        velocity_rows = velocity.num_rows(),
        mass_rows = mass.num_rows(),
        "assembled tables"
    );

    Ok(OutputTables {
        particles,
        velocity,
        mass,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, UInt64Array};

    const RES: usize = 2;

    /// A set where particle fields have `counts[i]` rows at step `i`.
    fn field_set(counts: &[usize]) -> FieldSet {
        let mut set = FieldSet::new();
        for field in Field::ALL {
            let width = field.width(RES);
            let mut t = FieldTable::new(field, width);
            for (step, &n) in counts.iter().enumerate() {
                let rows = match field {
                    Field::Mass => RES,
                    Field::Velocity => RES * RES,
                    _ => n,
                };
                let payload: Vec<f64> = (0..rows * width)
                    .map(|i| (step * 1000 + i) as f64)
                    .collect();
                t.push_step(step as u64, &payload);
            }
            set.insert(field, t);
        }
        set
    }

    fn f64_col<'a>(batch: &'a RecordBatch, name: &str) -> &'a Float64Array {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
    }

    #[test]
    fn particle_table_joins_all_particle_fields() {
        let set = field_set(&[2, 3]);
        let out = assemble(&set).expect("assemble");

        assert_eq!(out.particles.num_rows(), 5);
        let names: Vec<String> = out
            .particles
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(
            names,
            vec![
                "index", "x_0", "x_1", "v_0", "v_1", "F_0", "F_1", "F_2", "F_3", "C_0", "C_1",
                "C_2", "C_3", "Jp", "lame", "timestep",
            ]
        );
        assert!(out.particles.column_by_name("velocity_0").is_none());
        assert!(out.particles.column_by_name("mass_0").is_none());
    }

    #[test]
    fn rows_pair_observations_of_the_same_particle() {
        let set = field_set(&[2, 3]);
        let out = assemble(&set).expect("assemble");

        let index = out
            .particles
            .column(0)
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        assert_eq!(index.values().to_vec(), vec![0u64, 1, 0, 1, 2]);

        // Row 3 is particle 1 at step 1: x starts at payload offset 2, v too.
        assert_eq!(f64_col(&out.particles, "x_0").value(3), 1002.0);
        assert_eq!(f64_col(&out.particles, "v_1").value(3), 1003.0);
        assert_eq!(f64_col(&out.particles, "F_0").value(3), 1004.0);
        assert_eq!(f64_col(&out.particles, "Jp").value(3), 1001.0);
    }

    #[test]
    fn grid_tables_stay_separate() {
        let set = field_set(&[1, 1]);
        let out = assemble(&set).expect("assemble");

        assert_eq!(out.velocity.num_rows(), 2 * RES * RES);
        assert_eq!(out.velocity.num_columns(), 3);
        assert_eq!(out.mass.num_rows(), 2 * RES);
        assert_eq!(out.mass.num_columns(), 1 + RES);
        assert!(out.mass.column_by_name("mass_1").is_some());
    }

    #[test]
    fn misaligned_field_is_reported_with_step() {
        let mut set = field_set(&[2, 3]);
        let mut lame = FieldTable::new(Field::Lame, 1);
        lame.push_step(0, &[1.0, 2.0]);
        lame.push_step(1, &[1.0, 2.0]);
        set.insert(Field::Lame, lame);

        let err = assemble(&set).expect_err("misaligned");
        match err {
            AssembleError::Alignment {
                field,
                reference,
                step,
                expected,
                actual,
            } => {
                assert_eq!(field, Field::Lame);
                assert_eq!(reference, Field::X);
                assert_eq!(step, 1);
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("expected Alignment, got {other:?}"),
        }
    }

    #[test]
    fn missing_step_in_joined_field_is_misaligned() {
        let mut set = field_set(&[1, 1]);
        let mut v = FieldTable::new(Field::V, 2);
        v.push_step(0, &[0.0, 1.0]);
        set.insert(Field::V, v);

        let err = assemble(&set).expect_err("misaligned");
        assert!(matches!(
            err,
            AssembleError::Alignment {
                field: Field::V,
                step: 1,
                expected: 1,
                actual: 0,
                ..
            }
        ));
    }

    #[test]
    fn same_counts_with_different_keys_are_misaligned() {
        use crate::table::RowKey;

        let key = |index| RowKey { step: 0, index };
        let mut x = FieldTable::new(Field::X, 1);
        x.push_row(key(0), &[0.0]);
        x.push_row(key(1), &[1.0]);
        let mut jp = FieldTable::new(Field::Jp, 1);
        jp.push_row(key(0), &[0.0]);
        jp.push_row(key(2), &[1.0]);

        let err = check_alignment(&x, &jp).expect_err("misaligned");
        assert!(matches!(
            err,
            AssembleError::Alignment {
                field: Field::Jp,
                reference: Field::X,
                step: 0,
                expected: 2,
                actual: 2,
            }
        ));
    }

    #[test]
    fn absent_field_is_reported() {
        let mut set = field_set(&[1]);
        set.remove(&Field::Mass);
        let err = assemble(&set).expect_err("missing");
        assert!(matches!(err, AssembleError::MissingTable { field: Field::Mass }));
    }
}
