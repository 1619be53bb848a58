#![allow(dead_code)]

use std::path::Path;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Grid resolution the solver is built with.
pub const RES: usize = 65;

/// (token, values per particle) for the per-particle fields.
pub const PARTICLE_FIELDS: [(&str, usize); 7] = [
    ("x", 2),
    ("v", 2),
    ("F", 4),
    ("C", 4),
    ("Jp", 1),
    ("lame", 1),
    ("timestep", 1),
];

fn numbers(n: usize, step: u64) -> String {
    (0..n)
        .map(|i| format!("{}", step as f64 + i as f64 * 0.25))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write a full dump set for `particles` particles at each step.
pub fn write_dumps(dir: &Path, steps: &[u64], particles: usize) -> TestResult {
    std::fs::create_dir_all(dir)?;
    for &step in steps {
        for (token, width) in PARTICLE_FIELDS {
            let path = dir.join(format!("{step}_particles_{token}.txt"));
            std::fs::write(path, numbers(particles * width, step))?;
        }
        std::fs::write(
            dir.join(format!("{step}_grid_mass.txt")),
            numbers(RES * RES, step),
        )?;
        std::fs::write(
            dir.join(format!("{step}_grid_velocity.txt")),
            numbers(RES * RES * 2, step),
        )?;
    }
    Ok(())
}
