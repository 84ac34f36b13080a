//! Status model for version-controlled paths.
//!
//! This module provides:
//! - Combinable status tags and an importance-ordered flag set
//! - Per-path status entries with short and long rendering
//! - Classification of raw three-way comparisons into flag combinations

mod classify;
mod entry;
mod flags;

pub use classify::{classify, to_entry, Change, Classification, RawStatus, Rule};
pub use entry::{ConflictKind, Mode, StatusEntry, Summary};
pub use flags::{Status, StatusSet};
