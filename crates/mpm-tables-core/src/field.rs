//! Physical fields dumped by the solver and their reshape geometry.
//!
//! Every field has a fixed [`Domain`] and a fixed [`Shape`]. The shape turns
//! the flat payload of one timestep dump into `rows x width` values:
//!
//! | Field | Width | Rows |
//! |---|---|---|
//! | `x`, `v` | 2 | len / 2 |
//! | `F`, `C` | 4 | len / 4 |
//! | `Jp`, `lame`, `timestep` | 1 | len |
//! | `mass` | resolution | resolution |
//! | `velocity` | 2 | resolution² |
//!
//! The naming and validation of the per-field file patterns lives in
//! [`registry`].

pub mod registry;

use std::fmt;
use std::str::FromStr;

use snafu::Snafu;

pub use registry::{FieldRegistry, FieldSpec, Naming, RegistryError};

/// Grid side length the solver dumps grid fields at.
pub const RESOLUTION: usize = 65;

/// A named physical quantity written by the solver once per timestep.
///
/// The declaration order is the canonical field order: it drives loading,
/// the column order of the assembled table and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    /// Particle position.
    X,
    /// Particle velocity.
    V,
    /// Deformation gradient, a flattened 2x2 tensor.
    F,
    /// APIC affine momentum, a flattened 2x2 tensor.
    C,
    /// Plastic volume ratio.
    Jp,
    /// Lame parameter.
    Lame,
    /// Grid velocity.
    Velocity,
    /// Grid mass.
    Mass,
    /// Per-particle timestep value.
    Timestep,
}

/// Which index space a field's rows live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// One row per particle; the count may differ between timesteps.
    Particle,
    /// A fixed number of rows derived from the grid resolution.
    Grid,
}

/// Reshape rule for one timestep payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `len / components` rows of `components` values; `len` must divide evenly.
    Components(usize),
    /// A `resolution x resolution` scalar grid.
    GridSquare,
    /// `resolution²` rows of `components` values.
    GridVector(usize),
}

/// A payload that cannot be reshaped under a field's [`Shape`].
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("payload of {len} values {expected}"))]
pub struct ShapeMismatch {
    /// Number of values parsed from the file.
    pub len: usize,
    /// Human-readable statement of the requirement that failed.
    pub expected: String,
}

/// Error returned when parsing an unknown field name.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("unknown field name '{name}'"))]
pub struct UnknownField {
    /// The rejected name.
    pub name: String,
}

impl Field {
    /// All fields in canonical order.
    pub const ALL: [Field; 9] = [
        Field::X,
        Field::V,
        Field::F,
        Field::C,
        Field::Jp,
        Field::Lame,
        Field::Velocity,
        Field::Mass,
        Field::Timestep,
    ];

    /// The canonical name, also used as the default file token and column prefix.
    pub fn name(self) -> &'static str {
        match self {
            Field::X => "x",
            Field::V => "v",
            Field::F => "F",
            Field::C => "C",
            Field::Jp => "Jp",
            Field::Lame => "lame",
            Field::Velocity => "velocity",
            Field::Mass => "mass",
            Field::Timestep => "timestep",
        }
    }

    /// The field's index space.
    pub fn domain(self) -> Domain {
        match self {
            Field::Velocity | Field::Mass => Domain::Grid,
            _ => Domain::Particle,
        }
    }

    /// The field's reshape rule.
    pub fn shape(self) -> Shape {
        match self {
            Field::X | Field::V => Shape::Components(2),
            Field::F | Field::C => Shape::Components(4),
            Field::Jp | Field::Lame | Field::Timestep => Shape::Components(1),
            Field::Mass => Shape::GridSquare,
            Field::Velocity => Shape::GridVector(2),
        }
    }

    /// Number of value columns per row at the given resolution.
    pub fn width(self, resolution: usize) -> usize {
        self.shape().width(resolution)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| UnknownField {
                name: s.to_string(),
            })
    }
}

impl Shape {
    /// Number of value columns per row.
    pub fn width(self, resolution: usize) -> usize {
        match self {
            Shape::Components(n) | Shape::GridVector(n) => n,
            Shape::GridSquare => resolution,
        }
    }

    /// Number of rows a payload of `len` values produces, or why it cannot be reshaped.
    pub fn rows(self, len: usize, resolution: usize) -> Result<usize, ShapeMismatch> {
        match self {
            Shape::Components(n) => {
                if len % n != 0 {
                    return Err(ShapeMismatch {
                        len,
                        expected: format!("is not divisible by {n} components"),
                    });
                }
                Ok(len / n)
            }
            Shape::GridSquare => {
                let cells = resolution * resolution;
                if len != cells {
                    return Err(ShapeMismatch {
                        len,
                        expected: format!(
                            "does not match the {resolution}x{resolution} grid ({cells} values)"
                        ),
                    });
                }
                Ok(resolution)
            }
            Shape::GridVector(n) => {
                let cells = resolution * resolution;
                if len != cells * n {
                    return Err(ShapeMismatch {
                        len,
                        expected: format!(
                            "does not match {cells} grid cells x {n} components ({} values)",
                            cells * n
                        ),
                    });
                }
                Ok(cells)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_and_tensor_fields_divide_payload() {
        assert_eq!(Field::X.shape().rows(6, RESOLUTION), Ok(3));
        assert_eq!(Field::F.shape().rows(8, RESOLUTION), Ok(2));
        assert_eq!(Field::Jp.shape().rows(5, RESOLUTION), Ok(5));
        assert_eq!(Field::C.width(RESOLUTION), 4);
    }

    #[test]
    fn tensor_payload_must_divide_by_four() {
        let err = Field::C.shape().rows(6, RESOLUTION).unwrap_err();
        assert_eq!(err.len, 6);
        assert!(err.to_string().contains("4 components"));
    }

    #[test]
    fn grid_fields_require_exact_grid_size() {
        assert_eq!(Field::Mass.shape().rows(9, 3), Ok(3));
        assert_eq!(Field::Mass.width(3), 3);
        assert_eq!(Field::Velocity.shape().rows(18, 3), Ok(9));
        assert!(Field::Mass.shape().rows(10, 3).is_err());
        assert!(Field::Velocity.shape().rows(9, 3).is_err());
    }

    #[test]
    fn only_velocity_and_mass_are_grid_fields() {
        let grid: Vec<Field> = Field::ALL
            .into_iter()
            .filter(|f| f.domain() == Domain::Grid)
            .collect();
        assert_eq!(grid, vec![Field::Velocity, Field::Mass]);
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for field in Field::ALL {
            assert_eq!(field.name().parse::<Field>(), Ok(field));
        }
        assert!("jp".parse::<Field>().is_err());
    }
}
