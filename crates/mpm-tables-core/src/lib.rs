//! Ingestion of MPM solver dumps into tabular outputs.
//!
//! The solver writes one plain-text file per field per timestep. This crate
//! turns a directory of such dumps into three CSV tables:
//!
//! - A field registry fixing each field's filename token, component count
//!   and domain (`field` module).
//! - The Field Loader, which discovers, orders and reshapes dumps into
//!   keyed field tables (`loader`, `dump` and `table` modules).
//! - The Table Assembler, which joins the per-particle fields on their
//!   `(step, index)` keys and keeps the grid fields separate (`assemble`).
//! - Output persistence with a fingerprinted manifest so unchanged inputs
//!   are never re-read (`output`, `fingerprint`, `layout`), plus an optional
//!   Parquet field cache (`cache`).
//! - A [`pipeline::Pipeline`] tying these together from a
//!   [`config::PipelineConfig`].
#![deny(missing_docs)]
pub mod assemble;
pub mod cache;
pub mod config;
pub mod dump;
pub mod field;
pub mod fingerprint;
pub mod layout;
pub mod loader;
pub mod output;
pub mod pipeline;
pub mod storage;
pub mod table;

pub use assemble::OutputTables;
pub use config::PipelineConfig;
pub use field::{Field, FieldRegistry};
pub use pipeline::{Pipeline, PipelineError, PipelineOutput};
