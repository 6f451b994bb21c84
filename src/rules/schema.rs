use serde::Deserialize;
use std::fmt;

pub const DEFAULT_TARGET_VERSION: &str = "1.0";

/// Migration rules as written in a rules TOML file.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RulesConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub section_renames: Vec<SectionRename>,
    #[serde(default)]
    pub deprecated_keys: Vec<DeprecatedKeys>,
    #[serde(default)]
    pub value_rewrites: Vec<ValueRewrite>,
    #[serde(default)]
    pub key_renames: Vec<KeyRename>,
    #[serde(default)]
    pub append_if_missing: Vec<AppendIfMissing>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_target_version")]
    pub target_version: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            target_version: default_target_version(),
        }
    }
}

fn default_target_version() -> String {
    DEFAULT_TARGET_VERSION.to_string()
}

/// `[from]` becomes `[to]`; `from` matches case-insensitively, `to` is the
/// exact output spelling.
#[derive(Debug, Deserialize, Clone)]
pub struct SectionRename {
    pub from: String,
    pub to: String,
}

/// Keys removed outright from a section.
#[derive(Debug, Deserialize, Clone)]
pub struct DeprecatedKeys {
    pub section: String,
    pub keys: Vec<String>,
}

/// Regex substitution applied to the value of matching keys.
#[derive(Debug, Deserialize, Clone)]
pub struct ValueRewrite {
    pub section: String,
    /// Case-insensitive key pattern.
    pub key: String,
    /// Key pattern that vetoes the rule when it also matches.
    #[serde(default)]
    pub exclude: Option<String>,
    /// Case-sensitive value pattern; every match is replaced.
    pub pattern: String,
    pub replace: String,
}

/// Renames a key, possibly fanning one line out into several.
#[derive(Debug, Deserialize, Clone)]
pub struct KeyRename {
    pub section: String,
    /// Case-insensitive key pattern; capture groups feed `to`.
    pub key: String,
    #[serde(default)]
    pub exclude: Option<String>,
    pub to: Vec<String>,
}

/// Default value added to a section that lacks the key.
#[derive(Debug, Deserialize, Clone)]
pub struct AppendIfMissing {
    pub section: String,
    pub key: String,
    pub value: String,
}

impl RulesConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.meta.target_version.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                table: "meta",
                field: "target_version",
            });
        }

        for rename in &self.section_renames {
            if rename.from.trim().is_empty() || rename.to.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    table: "section_renames",
                    field: "from/to",
                });
            }
        }

        for deprecated in &self.deprecated_keys {
            if deprecated.section.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    table: "deprecated_keys",
                    field: "section",
                });
            }
            if deprecated.keys.iter().any(|key| key.trim().is_empty()) {
                issues.push(ValidationIssue::EmptyKey {
                    table: "deprecated_keys",
                    section: deprecated.section.clone(),
                });
            }
        }

        for rewrite in &self.value_rewrites {
            if rewrite.section.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    table: "value_rewrites",
                    field: "section",
                });
            }
            if rewrite.key.trim().is_empty() || rewrite.pattern.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    table: "value_rewrites",
                    field: "key/pattern",
                });
            }
        }

        for rename in &self.key_renames {
            if rename.section.trim().is_empty() || rename.key.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    table: "key_renames",
                    field: "section/key",
                });
            }
            if rename.to.is_empty() || rename.to.iter().any(|to| to.trim().is_empty()) {
                issues.push(ValidationIssue::EmptyKey {
                    table: "key_renames",
                    section: rename.section.clone(),
                });
            }
        }

        for append in &self.append_if_missing {
            if append.section.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    table: "append_if_missing",
                    field: "section",
                });
            }
            if append.key.trim().is_empty() {
                issues.push(ValidationIssue::EmptyKey {
                    table: "append_if_missing",
                    section: append.section.clone(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", issue)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        table: &'static str,
        field: &'static str,
    },
    EmptyKey {
        table: &'static str,
        section: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { table, field } => {
                write!(f, "{}: missing or empty {}", table, field)
            }
            ValidationIssue::EmptyKey { table, section } => {
                write!(f, "{} [{}]: empty key name", table, section)
            }
        }
    }
}
