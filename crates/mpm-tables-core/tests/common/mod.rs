#![allow(dead_code)]

use std::path::Path;

use mpm_tables_core::{Field, FieldRegistry};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Grid resolution used by the integration fixtures.
pub const RES: usize = 3;

pub fn registry() -> FieldRegistry {
    FieldRegistry::with_resolution(RES).expect("registry")
}

/// Deterministic value `i` of `field`'s dump at `step`.
pub fn value(field: Field, step: u64, i: usize) -> f64 {
    let offset = Field::ALL.iter().position(|f| *f == field).unwrap_or(0) as f64;
    step as f64 * 1000.0 + offset * 100.0 + i as f64 * 0.5
}

/// Number of values in `field`'s dump for `particles` particles.
pub fn payload_len(field: Field, particles: usize) -> usize {
    match field {
        Field::Mass => RES * RES,
        Field::Velocity => RES * RES * 2,
        other => particles * other.width(RES),
    }
}

/// Write one dump with a comment header and a few values per line.
pub fn write_dump(dir: &Path, field: Field, step: u64, len: usize) -> TestResult {
    let reg = registry();
    let mut text = format!("# {field} at step {step}\n");
    for i in 0..len {
        text.push_str(&format!("{}", value(field, step, i)));
        text.push(if i % 4 == 3 { '\n' } else { ' ' });
    }
    std::fs::write(dir.join(reg.file_name(field, step, "particles")), text)?;
    Ok(())
}

/// Write every field at every `(step, particles)` pair.
pub fn write_run(dir: &Path, steps: &[(u64, usize)]) -> TestResult {
    std::fs::create_dir_all(dir)?;
    for &(step, particles) in steps {
        for field in Field::ALL {
            write_dump(dir, field, step, payload_len(field, particles))?;
        }
    }
    Ok(())
}

/// Overwrite a file with the same number of bytes of non-numeric text.
pub fn clobber_same_size(path: &Path) -> TestResult {
    let len = std::fs::metadata(path)?.len() as usize;
    std::fs::write(path, "z".repeat(len))?;
    Ok(())
}
