//! Screenpack Updater: migrates IKEMEN GO screenpack `system.def` files
//!
//! Older screenpacks use key names, sections and value formats that the 1.0
//! engine no longer reads. This crate rewrites such a file in place, driven by
//! a declarative table of migration rules.
//!
//! # Architecture
//!
//! A file is parsed into a [`ConfigDocument`] that keeps every line it does
//! not understand. An idempotency guard ([`version::check`]) stops files that
//! already declare the target `ikemenversion`. The rewrite engine
//! ([`rules::rewrite`]) then runs a fixed sequence of pure passes over the
//! document, and the serializer renders it back with the original line endings
//! and byte-order mark.
//!
//! # Safety
//!
//! - Nothing is written when the guard reports the file as already patched
//! - The original is saved to `<file>.bak` before the file is replaced
//! - Writes are atomic (tempfile + fsync + rename)
//! - The file is re-read and compared before it is overwritten
//!
//! # Example
//!
//! ```no_run
//! use screenpack_updater::{patch_file, PatchOptions, Ruleset};
//! use std::path::Path;
//!
//! let rules = Ruleset::builtin()?;
//! let report = patch_file(Path::new("data/system.def"), &rules, PatchOptions::default())?;
//! for change in &report.changes {
//!     println!("{change}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ini;
pub mod patch;
pub mod picker;
pub mod rules;
pub mod version;

// Re-exports
pub use ini::{parse, parse_bytes, serialize, ConfigDocument, Entry, IniError, KeyValue, Section};
pub use patch::{
    backup_path, patch_file, patch_with, DiskStore, PatchError, PatchOptions, PatchOutcome,
    PatchReport, Store,
};
pub use picker::{ArgumentPath, PathProvider, PickerError, PromptPath};
pub use rules::{load_from_path, load_from_str, rewrite, RulesError, Ruleset};
pub use version::{DottedVersion, PatchReason, VersionCheck};
