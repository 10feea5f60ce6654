//! Structural diff engine for consecutive inventory snapshots (spec §4.4):
//! a depth-first JSON tree walk plus a static category/severity rule table.

pub mod engine;
pub mod rules;
pub mod types;

pub use engine::{diff, filter_significant, max_severity, FieldDiff};
pub use types::{Category, DiffType, Severity};
