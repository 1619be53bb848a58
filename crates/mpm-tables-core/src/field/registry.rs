//! Validated per-field filename patterns.
//!
//! Dump files are named `<step><sep><anything><sep><token>.<ext>`. The step
//! is the leading integer before the first separator and the token is the
//! text after the last separator of the stem. Tokens are matched exactly, so
//! a registry whose tokens are unique cannot assign one file to two fields.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

use super::{Field, RESOLUTION};

/// Errors raised while validating a registry.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RegistryError {
    /// A field token was empty.
    #[snafu(display("token for field {field} is empty"))]
    EmptyToken {
        /// Field whose token is empty.
        field: Field,
    },

    /// A field token contains a character reserved by the naming scheme.
    #[snafu(display("token '{token}' for field {field} must not contain '{reserved}'"))]
    ReservedCharacter {
        /// Field whose token is invalid.
        field: Field,
        /// The rejected token.
        token: String,
        /// The reserved character found in the token.
        reserved: char,
    },

    /// Two fields share a token.
    #[snafu(display("token '{token}' is used by both {first} and {second}"))]
    DuplicateToken {
        /// The shared token.
        token: String,
        /// First field using the token.
        first: Field,
        /// Second field using the token.
        second: Field,
    },

    /// The file extension was empty or contained a dot.
    #[snafu(display("invalid dump file extension '{extension}'"))]
    InvalidExtension {
        /// The rejected extension.
        extension: String,
    },

    /// The separator is a character that cannot delimit filename parts.
    #[snafu(display("invalid filename separator '{separator}'"))]
    InvalidSeparator {
        /// The rejected separator.
        separator: char,
    },

    /// Grid resolution must be positive.
    #[snafu(display("grid resolution must be positive"))]
    ZeroResolution,
}

/// Filename conventions shared by every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Naming {
    /// Separator between the step prefix, free text and the field token.
    pub separator: char,
    /// File extension without the leading dot.
    pub extension: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            separator: '_',
            extension: "txt".to_string(),
        }
    }
}

/// One field together with the token identifying its dump files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// The field.
    pub field: Field,
    /// Exact filename token, e.g. `x` in `12_particles_x.txt`.
    pub token: String,
}

/// How a filename relates to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMatch {
    /// The file is the dump of `field` at `step`.
    Dump {
        /// Matched field.
        field: Field,
        /// Timestep parsed from the filename prefix.
        step: u64,
    },
    /// The token names a field but the step prefix is not an integer.
    InvalidStep {
        /// Matched field.
        field: Field,
    },
    /// The file belongs to no registered field.
    Unrelated,
}

/// The validated set of fields to load, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRegistry {
    specs: Vec<FieldSpec>,
    naming: Naming,
    resolution: usize,
}

impl Default for FieldRegistry {
    /// Every field under its canonical name, default naming, [`RESOLUTION`].
    fn default() -> Self {
        Self {
            specs: Field::ALL
                .into_iter()
                .map(|field| FieldSpec {
                    field,
                    token: field.name().to_string(),
                })
                .collect(),
            naming: Naming::default(),
            resolution: RESOLUTION,
        }
    }
}

impl FieldRegistry {
    /// Build a registry covering every field, applying token overrides.
    ///
    /// Fields absent from `tokens` use their canonical name.
    pub fn new(
        naming: Naming,
        tokens: &BTreeMap<Field, String>,
        resolution: usize,
    ) -> Result<Self, RegistryError> {
        ensure!(resolution > 0, ZeroResolutionSnafu);
        ensure!(
            !naming.extension.is_empty() && !naming.extension.contains('.'),
            InvalidExtensionSnafu {
                extension: naming.extension.clone(),
            }
        );
        ensure!(
            naming.separator != '.' && !naming.separator.is_ascii_digit(),
            InvalidSeparatorSnafu {
                separator: naming.separator,
            }
        );

        let mut seen: HashMap<String, Field> = HashMap::new();
        let mut specs = Vec::with_capacity(Field::ALL.len());
        for field in Field::ALL {
            let token = tokens
                .get(&field)
                .cloned()
                .unwrap_or_else(|| field.name().to_string());

            ensure!(!token.is_empty(), EmptyTokenSnafu { field });
            for reserved in [naming.separator, '.'] {
                ensure!(
                    !token.contains(reserved),
                    ReservedCharacterSnafu {
                        field,
                        token: token.clone(),
                        reserved,
                    }
                );
            }
            if let Some(first) = seen.insert(token.clone(), field) {
                return DuplicateTokenSnafu {
                    token,
                    first,
                    second: field,
                }
                .fail();
            }

            specs.push(FieldSpec { field, token });
        }

        Ok(Self {
            specs,
            naming,
            resolution,
        })
    }

    /// Default naming and tokens at a custom grid resolution.
    pub fn with_resolution(resolution: usize) -> Result<Self, RegistryError> {
        Self::new(Naming::default(), &BTreeMap::new(), resolution)
    }

    /// Field specs in canonical order.
    pub fn specs(&self) -> &[FieldSpec] {
        &self.specs
    }

    /// Shared filename conventions.
    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// Grid side length used to reshape grid fields.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Token registered for `field`.
    pub fn token(&self, field: Field) -> &str {
        self.specs
            .iter()
            .find(|s| s.field == field)
            .map(|s| s.token.as_str())
            .unwrap_or_else(|| field.name())
    }

    /// Build the filename for `field` at `step` with the given free-text middle part.
    pub fn file_name(&self, field: Field, step: u64, middle: &str) -> String {
        let sep = self.naming.separator;
        format!(
            "{step}{sep}{middle}{sep}{}.{}",
            self.token(field),
            self.naming.extension
        )
    }

    /// Classify a filename against the registered patterns.
    pub fn classify(&self, file_name: &str) -> FileMatch {
        let Some(stem) = file_name
            .strip_suffix(self.naming.extension.as_str())
            .and_then(|s| s.strip_suffix('.'))
        else {
            return FileMatch::Unrelated;
        };

        let sep = self.naming.separator;
        let token = stem.rsplit(sep).next().unwrap_or(stem);
        let Some(spec) = self.specs.iter().find(|s| s.token == token) else {
            return FileMatch::Unrelated;
        };

        let step = stem
            .split_once(sep)
            .and_then(|(prefix, _)| prefix.parse::<u64>().ok());
        match step {
            Some(step) => FileMatch::Dump {
                field: spec.field,
                step,
            },
            None => FileMatch::InvalidStep { field: spec.field },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_exact_token_only() {
        let reg = FieldRegistry::default();
        assert_eq!(
            reg.classify("12_particles_x.txt"),
            FileMatch::Dump {
                field: Field::X,
                step: 12
            }
        );
        assert_eq!(
            reg.classify("3_grid_velocity.txt"),
            FileMatch::Dump {
                field: Field::Velocity,
                step: 3
            }
        );
        // A `*v.txt` suffix glob would claim this file for `v`.
        assert_eq!(reg.classify("3_dump_xv.txt"), FileMatch::Unrelated);
        assert_eq!(reg.classify("3_dump_x.csv"), FileMatch::Unrelated);
    }

    #[test]
    fn classify_accepts_empty_middle_part() {
        let reg = FieldRegistry::default();
        assert_eq!(
            reg.classify("7_Jp.txt"),
            FileMatch::Dump {
                field: Field::Jp,
                step: 7
            }
        );
    }

    #[test]
    fn classify_flags_non_integer_step() {
        let reg = FieldRegistry::default();
        assert_eq!(
            reg.classify("final_dump_mass.txt"),
            FileMatch::InvalidStep { field: Field::Mass }
        );
        assert_eq!(
            reg.classify("lame.txt"),
            FileMatch::InvalidStep { field: Field::Lame }
        );
    }

    #[test]
    fn duplicate_tokens_are_rejected() {
        let tokens = BTreeMap::from([(Field::Lame, "x".to_string())]);
        let err = FieldRegistry::new(Naming::default(), &tokens, 4).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateToken {
                token: "x".to_string(),
                first: Field::X,
                second: Field::Lame,
            }
        );
    }

    #[test]
    fn tokens_with_separator_are_rejected() {
        let tokens = BTreeMap::from([(Field::Jp, "j_p".to_string())]);
        let err = FieldRegistry::new(Naming::default(), &tokens, 4).unwrap_err();
        assert!(matches!(err, RegistryError::ReservedCharacter { .. }));
    }

    #[test]
    fn token_override_changes_file_name() {
        let tokens = BTreeMap::from([(Field::Lame, "lambda".to_string())]);
        let reg = FieldRegistry::new(Naming::default(), &tokens, 4).unwrap();
        assert_eq!(reg.file_name(Field::Lame, 5, "p"), "5_p_lambda.txt");
        assert_eq!(reg.classify("lame.txt"), FileMatch::Unrelated);
    }

    #[test]
    fn default_registry_is_valid() {
        let built = FieldRegistry::new(Naming::default(), &BTreeMap::new(), RESOLUTION).unwrap();
        assert_eq!(built, FieldRegistry::default());
    }

    #[test]
    fn empty_token_is_rejected() {
        let tokens = BTreeMap::from([(Field::V, String::new())]);
        let err = FieldRegistry::new(Naming::default(), &tokens, 4).unwrap_err();
        assert_eq!(err, RegistryError::EmptyToken { field: Field::V });
    }

    #[test]
    fn dotted_token_is_rejected() {
        let tokens = BTreeMap::from([(Field::C, "c.0".to_string())]);
        let err = FieldRegistry::new(Naming::default(), &tokens, 4).unwrap_err();
        assert_eq!(
            err,
            RegistryError::ReservedCharacter {
                field: Field::C,
                token: "c.0".to_string(),
                reserved: '.',
            }
        );
    }

    #[test]
    fn bad_extensions_are_rejected() {
        for extension in ["", "tar.gz"] {
            let naming = Naming {
                separator: '_',
                extension: extension.to_string(),
            };
            let err = FieldRegistry::new(naming, &BTreeMap::new(), 4).unwrap_err();
            assert_eq!(
                err,
                RegistryError::InvalidExtension {
                    extension: extension.to_string()
                }
            );
        }
    }

    #[test]
    fn bad_separators_are_rejected() {
        for separator in ['.', '7'] {
            let naming = Naming {
                separator,
                extension: "txt".to_string(),
            };
            let err = FieldRegistry::new(naming, &BTreeMap::new(), 4).unwrap_err();
            assert_eq!(err, RegistryError::InvalidSeparator { separator });
        }
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let err = FieldRegistry::with_resolution(0).unwrap_err();
        assert_eq!(err, RegistryError::ZeroResolution);
    }
}
