pub mod aggregate;
pub mod engine;
pub mod loader;
pub mod schema;
pub mod transforms;

pub use aggregate::format_number;
pub use engine::{diagnose, rewrite, Change, ChangeKind, ChangeLog, Rewrite, Warning};
pub use loader::{load_from_path, load_from_str, RulesError, Ruleset, BUILTIN_RULES};
pub use schema::RulesConfig;
