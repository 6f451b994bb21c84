use crate::rules::schema::{RulesConfig, ValidationError};
use crate::version::{DottedVersion, VersionError};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Rules shipped with the binary.
pub const BUILTIN_RULES: &str = include_str!("../../rules/ikemen-1.0.toml");

#[derive(Debug)]
pub enum RulesError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    InvalidPattern {
        path: Option<PathBuf>,
        pattern: String,
        source: regex::Error,
    },
    InvalidTargetVersion {
        path: Option<PathBuf>,
        source: VersionError,
    },
}

impl RulesError {
    fn with_path(self, path: &Path) -> Self {
        let path = Some(path.to_path_buf());
        match self {
            RulesError::Io { .. } => self,
            RulesError::Toml { path: None, source } => RulesError::Toml { path, source },
            RulesError::Validation { path: None, source } => {
                RulesError::Validation { path, source }
            }
            RulesError::InvalidPattern {
                path: None,
                pattern,
                source,
            } => RulesError::InvalidPattern {
                path,
                pattern,
                source,
            },
            RulesError::InvalidTargetVersion { path: None, source } => {
                RulesError::InvalidTargetVersion { path, source }
            }
            other => other,
        }
    }

    fn origin(path: &Option<PathBuf>) -> String {
        match path {
            Some(path) => format!(" ({})", path.display()),
            None => String::new(),
        }
    }
}

impl fmt::Display for RulesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulesError::Io { path, source } => {
                write!(f, "failed to read rules from {}: {}", path.display(), source)
            }
            RulesError::Toml { path, source } => {
                write!(f, "failed to parse rules TOML{}: {}", Self::origin(path), source)
            }
            RulesError::Validation { path, source } => {
                write!(f, "invalid rules{}: {}", Self::origin(path), source)
            }
            RulesError::InvalidPattern {
                path,
                pattern,
                source,
            } => write!(
                f,
                "invalid pattern '{}' in rules{}: {}",
                pattern,
                Self::origin(path),
                source
            ),
            RulesError::InvalidTargetVersion { path, source } => {
                write!(f, "invalid target_version in rules{}: {}", Self::origin(path), source)
            }
        }
    }
}

impl std::error::Error for RulesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RulesError::Io { source, .. } => Some(source),
            RulesError::Toml { source, .. } => Some(source),
            RulesError::Validation { source, .. } => Some(source),
            RulesError::InvalidPattern { source, .. } => Some(source),
            RulesError::InvalidTargetVersion { source, .. } => Some(source),
        }
    }
}

/// A key pattern plus an optional veto pattern.
#[derive(Debug, Clone)]
pub struct KeyMatcher {
    pattern: Regex,
    exclude: Option<Regex>,
}

impl KeyMatcher {
    pub fn captures<'k>(&self, key: &'k str) -> Option<regex::Captures<'k>> {
        if self.exclude.as_ref().is_some_and(|rx| rx.is_match(key)) {
            return None;
        }
        self.pattern.captures(key)
    }

    pub fn is_match(&self, key: &str) -> bool {
        self.captures(key).is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CompiledValueRewrite {
    pub key: KeyMatcher,
    pub pattern: Regex,
    pub replace: String,
}

#[derive(Debug, Clone)]
pub struct CompiledKeyRename {
    pub key: KeyMatcher,
    pub to: Vec<String>,
}

/// Validated, compiled migration rules. Section keys are lowercase.
#[derive(Debug, Clone)]
pub struct Ruleset {
    pub name: String,
    pub target_version: DottedVersion,
    /// Target version as written, used for the stamped value.
    pub target_version_text: String,
    pub section_renames: HashMap<String, String>,
    pub deprecated_keys: HashMap<String, Vec<String>>,
    pub value_rewrites: HashMap<String, Vec<CompiledValueRewrite>>,
    pub key_renames: HashMap<String, Vec<CompiledKeyRename>>,
    pub append_if_missing: HashMap<String, Vec<(String, String)>>,
}

impl Ruleset {
    /// The embedded IKEMEN 1.0 rules.
    pub fn builtin() -> Result<Self, RulesError> {
        load_from_str(BUILTIN_RULES)
    }

    /// Rules with no migrations, only the version stamp.
    pub fn stamp_only(target_version: &str) -> Result<Self, RulesError> {
        let mut config = RulesConfig::default();
        config.meta.target_version = target_version.to_string();
        compile(config)
    }

    pub fn is_deprecated(&self, section: &str, key: &str) -> bool {
        self.deprecated_keys
            .get(section)
            .is_some_and(|keys| keys.iter().any(|k| k.eq_ignore_ascii_case(key)))
    }

    pub fn value_rewrites_for(&self, section: &str) -> &[CompiledValueRewrite] {
        self.value_rewrites.get(section).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn key_renames_for(&self, section: &str) -> &[CompiledKeyRename] {
        self.key_renames.get(section).map(Vec::as_slice).unwrap_or_default()
    }
}

pub fn load_from_str(input: &str) -> Result<Ruleset, RulesError> {
    let config: RulesConfig = toml_edit::de::from_str(input)
        .map_err(|source| RulesError::Toml { path: None, source })?;
    compile(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Ruleset, RulesError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| RulesError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

fn compile(config: RulesConfig) -> Result<Ruleset, RulesError> {
    config
        .validate()
        .map_err(|source| RulesError::Validation { path: None, source })?;

    let target_version_text = config.meta.target_version.trim().to_string();
    let target_version = target_version_text
        .parse::<DottedVersion>()
        .map_err(|source| RulesError::InvalidTargetVersion { path: None, source })?;

    let section_renames = config
        .section_renames
        .iter()
        .map(|rename| (section_key(&rename.from), rename.to.trim().to_string()))
        .collect();

    let mut deprecated_keys: HashMap<String, Vec<String>> = HashMap::new();
    for deprecated in &config.deprecated_keys {
        deprecated_keys
            .entry(section_key(&deprecated.section))
            .or_default()
            .extend(deprecated.keys.iter().map(|key| key.trim().to_string()));
    }

    let mut value_rewrites: HashMap<String, Vec<CompiledValueRewrite>> = HashMap::new();
    for rewrite in &config.value_rewrites {
        value_rewrites
            .entry(section_key(&rewrite.section))
            .or_default()
            .push(CompiledValueRewrite {
                key: key_matcher(&rewrite.key, rewrite.exclude.as_deref())?,
                pattern: compile_pattern(&rewrite.pattern, false)?,
                replace: rewrite.replace.clone(),
            });
    }

    let mut key_renames: HashMap<String, Vec<CompiledKeyRename>> = HashMap::new();
    for rename in &config.key_renames {
        key_renames
            .entry(section_key(&rename.section))
            .or_default()
            .push(CompiledKeyRename {
                key: key_matcher(&rename.key, rename.exclude.as_deref())?,
                to: rename.to.iter().map(|to| to.trim().to_string()).collect(),
            });
    }

    let mut append_if_missing: HashMap<String, Vec<(String, String)>> = HashMap::new();
    for append in &config.append_if_missing {
        append_if_missing
            .entry(section_key(&append.section))
            .or_default()
            .push((append.key.trim().to_string(), append.value.trim().to_string()));
    }

    Ok(Ruleset {
        name: config.meta.name,
        target_version,
        target_version_text,
        section_renames,
        deprecated_keys,
        value_rewrites,
        key_renames,
        append_if_missing,
    })
}

fn section_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

fn key_matcher(pattern: &str, exclude: Option<&str>) -> Result<KeyMatcher, RulesError> {
    Ok(KeyMatcher {
        pattern: compile_pattern(pattern, true)?,
        exclude: exclude.map(|rx| compile_pattern(rx, true)).transpose()?,
    })
}

fn compile_pattern(pattern: &str, case_insensitive: bool) -> Result<Regex, RulesError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|source| RulesError::InvalidPattern {
            path: None,
            pattern: pattern.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_load() {
        let rules = Ruleset::builtin().unwrap();
        assert_eq!(rules.name, "ikemen-1.0");
        assert_eq!(rules.target_version_text, "1.0");
        assert_eq!(
            rules.section_renames.get("menu info").map(String::as_str),
            Some("Pause Menu")
        );
        assert!(rules.is_deprecated("vs screen", "P2.Accept.Key"));
        assert!(!rules.is_deprecated("vs screen", "p1.accept.key"));
        assert!(!rules.key_renames_for("title info").is_empty());
        assert_eq!(rules.append_if_missing["option info"].len(), 3);
    }

    #[test]
    fn exclude_pattern_vetoes_match() {
        let rules = Ruleset::builtin().unwrap();
        let cursor = rules
            .key_renames_for("title info")
            .iter()
            .find(|rule| rule.to == ["cursor.done.${1}.snd"])
            .unwrap();
        assert!(cursor.key.is_match("cursor.move.snd"));
        assert!(cursor.key.is_match("CURSOR.Move.SND"));
        assert!(!cursor.key.is_match("cursor.done.snd"));
    }

    #[test]
    fn minimal_rules_default_target_version() {
        let rules = load_from_str("[meta]\nname = \"empty\"\n").unwrap();
        assert_eq!(rules.target_version, "1.0".parse().unwrap());
        assert!(rules.section_renames.is_empty());
    }

    #[test]
    fn stamp_only_rules() {
        let rules = Ruleset::stamp_only("1.1").unwrap();
        assert_eq!(rules.target_version_text, "1.1");
        assert!(rules.key_renames.is_empty());
    }

    #[test]
    fn invalid_regex_is_reported() {
        let input = r#"
[[key_renames]]
section = "music"
key = '^(unclosed$'
to = ["x"]
"#;
        let err = load_from_str(input).unwrap_err();
        assert!(matches!(err, RulesError::InvalidPattern { .. }));
        assert!(err.to_string().contains("^(unclosed$"));
    }

    #[test]
    fn empty_fields_fail_validation() {
        let input = r#"
[[deprecated_keys]]
section = ""
keys = ["a"]
"#;
        assert!(matches!(
            load_from_str(input),
            Err(RulesError::Validation { .. })
        ));
    }

    #[test]
    fn bad_target_version() {
        let input = "[meta]\ntarget_version = \"one\"\n";
        assert!(matches!(
            load_from_str(input),
            Err(RulesError::InvalidTargetVersion { .. })
        ));
    }

    #[test]
    fn load_from_path_attaches_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        fs::write(&path, "[meta\n").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, RulesError::Toml { path: Some(_), .. }));

        let missing = load_from_path(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, RulesError::Io { .. }));
    }
}
