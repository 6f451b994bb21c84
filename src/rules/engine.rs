//! Rewrite pipeline
//!
//! Every pass takes the document by value and hands back the rewritten one,
//! recording what it did in a [`ChangeLog`]. Nothing here touches the
//! filesystem.

use crate::ini::{ConfigDocument, Entry, KeyValue, LineEnding, Section};
use crate::rules::aggregate;
use crate::rules::loader::Ruleset;
use crate::rules::transforms;
use crate::version::{INFO_SECTION, VERSION_KEY};
use std::fmt;

/// One edit made by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// Key or value whitespace was tidied.
    Normalized { key: String },
    SectionRenamed { from: String, to: String },
    KeyDeleted { key: String },
    ValueRewritten { key: String, from: String, to: String },
    KeyRenamed { from: String, to: Vec<String> },
    /// Line produced by folding several entries together.
    Merged { key: String, value: String },
    KeyAppended { key: String, value: String },
    SectionAppended,
    VersionStamped { previous: Option<String>, value: String },
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Normalized { key } => write!(f, "normalized {}", key),
            ChangeKind::SectionRenamed { from, to } => {
                write!(f, "renamed section [{}] => [{}]", from, to)
            }
            ChangeKind::KeyDeleted { key } => write!(f, "deleted {}", key),
            ChangeKind::ValueRewritten { key, from, to } => {
                write!(f, "{}: '{}' => '{}'", key, from, to)
            }
            ChangeKind::KeyRenamed { from, to } => write!(f, "{} => {}", from, to.join(", ")),
            ChangeKind::Merged { key, value } => write!(f, "merged {} = {}", key, value),
            ChangeKind::KeyAppended { key, value } => write!(f, "added {} = {}", key, value),
            ChangeKind::SectionAppended => write!(f, "added section"),
            ChangeKind::VersionStamped { previous, value } => match previous {
                Some(previous) => write!(f, "{} {} => {}", VERSION_KEY, previous, value),
                None => write!(f, "{} = {}", VERSION_KEY, value),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Lowercase section name; empty for lines before the first section.
    pub section: String,
    pub kind: ChangeKind,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.section.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "[{}] {}", self.section, self.kind)
        }
    }
}

#[derive(Debug, Default)]
pub struct ChangeLog {
    changes: Vec<Change>,
}

impl ChangeLog {
    pub fn record(&mut self, section: &str, kind: ChangeKind) {
        tracing::debug!(section, change = %kind, "rewrite");
        self.changes.push(Change {
            section: section.to_string(),
            kind,
        });
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

/// Something odd about the input that did not stop the rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The section appears more than once; only the first is used.
    DuplicateSection { name: String, count: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DuplicateSection { name, count } => write!(
                f,
                "[{}] appears {} times; only the first one is used",
                name, count
            ),
        }
    }
}

/// Ambiguities in a parsed document.
pub fn diagnose(doc: &ConfigDocument) -> Vec<Warning> {
    let mut warnings = Vec::new();
    let count = doc.count_sections(INFO_SECTION);
    if count > 1 {
        tracing::warn!(section = INFO_SECTION, count, "duplicate section");
        warnings.push(Warning::DuplicateSection {
            name: INFO_SECTION.to_string(),
            count,
        });
    }
    warnings
}

/// Result of running every pass.
#[derive(Debug)]
pub struct Rewrite {
    pub document: ConfigDocument,
    pub changes: Vec<Change>,
}

/// Run the full pipeline over `doc`.
pub fn rewrite(doc: ConfigDocument, rules: &Ruleset) -> Rewrite {
    let mut log = ChangeLog::default();
    let doc = normalize_whitespace(doc, &mut log);
    let doc = rename_sections(doc, rules, &mut log);
    let doc = remove_deprecated_keys(doc, rules, &mut log);
    let doc = map_sections(doc, |section| aggregate::merge_member_params(section, &mut log));
    // Speeds and facings are read from the keys as written, before member remapping.
    let doc = map_sections(doc, |section| {
        aggregate::slide_speed_to_velocity(section, &mut log)
    });
    let doc = rewrite_entries(doc, rules, &mut log);
    let doc = append_missing_keys(doc, rules, &mut log);
    let doc = stamp_version(doc, rules, &mut log);
    Rewrite {
        document: doc,
        changes: log.into_changes(),
    }
}

fn map_sections(mut doc: ConfigDocument, f: impl FnMut(Section) -> Section) -> ConfigDocument {
    doc.sections = doc.sections.into_iter().map(f).collect();
    doc
}

/// Drop the raw text of every entry so it renders as `key = value`.
pub(crate) fn normalize_whitespace(mut doc: ConfigDocument, log: &mut ChangeLog) -> ConfigDocument {
    let ending = doc.line_ending;
    normalize_entries("", &mut doc.preamble, ending, log);
    for section in &mut doc.sections {
        let key = section.key();
        normalize_entries(&key, &mut section.entries, ending, log);
    }
    doc
}

fn normalize_entries(
    section: &str,
    entries: &mut [Entry],
    ending: LineEnding,
    log: &mut ChangeLog,
) {
    for entry in entries {
        let Entry::KeyValue(kv) = entry else {
            continue;
        };
        if let Some(raw) = kv.raw.take() {
            if raw != kv.render(ending) {
                log.record(
                    section,
                    ChangeKind::Normalized {
                        key: kv.key.clone(),
                    },
                );
            }
        }
    }
}

pub(crate) fn rename_sections(
    doc: ConfigDocument,
    rules: &Ruleset,
    log: &mut ChangeLog,
) -> ConfigDocument {
    map_sections(doc, |section| {
        let Some(to) = rules.section_renames.get(&section.key()) else {
            return section;
        };
        log.record(
            &section.key(),
            ChangeKind::SectionRenamed {
                from: section.name.clone(),
                to: to.clone(),
            },
        );
        Section {
            header: section.header.as_deref().map(|header| rename_header(header, to)),
            name: to.clone(),
            entries: section.entries,
        }
    })
}

/// Swap the bracketed name, keeping indentation and any trailing comment.
fn rename_header(header: &str, to: &str) -> String {
    let (Some(open), Some(close)) = (header.find('['), header.find(']')) else {
        return format!("[{to}]");
    };
    format!("{}[{}]{}", &header[..open], to, &header[close + 1..])
}

pub(crate) fn remove_deprecated_keys(
    doc: ConfigDocument,
    rules: &Ruleset,
    log: &mut ChangeLog,
) -> ConfigDocument {
    map_sections(doc, |mut section| {
        let key = section.key();
        section.entries.retain(|entry| match entry {
            Entry::KeyValue(kv) if rules.is_deprecated(&key, &kv.key) => {
                log.record(
                    &key,
                    ChangeKind::KeyDeleted {
                        key: kv.key.clone(),
                    },
                );
                false
            }
            _ => true,
        });
        section
    })
}

fn rewrite_entries(doc: ConfigDocument, rules: &Ruleset, log: &mut ChangeLog) -> ConfigDocument {
    map_sections(doc, |section| {
        let key = section.key();
        let Section {
            name,
            header,
            entries,
        } = section;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Entry::KeyValue(kv) => out.extend(
                    transforms::rewrite_entry(&key, kv, rules, log)
                        .into_iter()
                        .map(Entry::KeyValue),
                ),
                other => out.push(other),
            }
        }
        Section {
            name,
            header,
            entries: out,
        }
    })
}

pub(crate) fn append_missing_keys(
    doc: ConfigDocument,
    rules: &Ruleset,
    log: &mut ChangeLog,
) -> ConfigDocument {
    map_sections(doc, |mut section| {
        let key = section.key();
        let Some(defaults) = rules.append_if_missing.get(&key) else {
            return section;
        };
        let mut at = section.insertion_point();
        for (name, value) in defaults {
            if section.find(name).is_some() {
                continue;
            }
            log.record(
                &key,
                ChangeKind::KeyAppended {
                    key: name.clone(),
                    value: value.clone(),
                },
            );
            section
                .entries
                .insert(at, Entry::KeyValue(KeyValue::new(name.clone(), value.clone())));
            at += 1;
        }
        section
    })
}

/// Write the target version into the first `[Info]`, creating it if needed.
pub(crate) fn stamp_version(
    mut doc: ConfigDocument,
    rules: &Ruleset,
    log: &mut ChangeLog,
) -> ConfigDocument {
    let target = rules.target_version_text.clone();
    let section_key = INFO_SECTION.to_ascii_lowercase();

    let Some(idx) = doc
        .sections
        .iter()
        .position(|section| section.is_named(INFO_SECTION))
    else {
        log.record(&section_key, ChangeKind::SectionAppended);
        log.record(
            &section_key,
            ChangeKind::VersionStamped {
                previous: None,
                value: target.clone(),
            },
        );
        let mut info = Section::new(INFO_SECTION);
        info.entries
            .push(Entry::KeyValue(KeyValue::new(VERSION_KEY, target)));
        doc.sections.push(info);
        return doc;
    };

    let info = &mut doc.sections[idx];
    match info.find_mut(VERSION_KEY) {
        Some(marker) => {
            if marker.value != target || marker.raw.is_some() {
                let previous = std::mem::replace(&mut marker.value, target.clone());
                marker.raw = None;
                log.record(
                    &section_key,
                    ChangeKind::VersionStamped {
                        previous: Some(previous),
                        value: target,
                    },
                );
            }
        }
        None => {
            info.entries
                .push(Entry::KeyValue(KeyValue::new(VERSION_KEY, target.clone())));
            log.record(
                &section_key,
                ChangeKind::VersionStamped {
                    previous: None,
                    value: target,
                },
            );
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ini::{parse, serialize};

    fn run(input: &str) -> (String, Vec<Change>) {
        let rules = Ruleset::builtin().unwrap();
        let out = rewrite(parse(input), &rules);
        (serialize(&out.document), out.changes)
    }

    #[test]
    fn stamps_and_normalizes() {
        let (out, changes) = run("[Info]\nname=Pack\nikemenversion=0.9\n");
        assert_eq!(out, "[Info]\nname = Pack\nikemenversion = 1.0\n");
        assert!(changes.iter().any(|c| matches!(
            &c.kind,
            ChangeKind::VersionStamped { previous: Some(p), .. } if p == "0.9"
        )));
    }

    #[test]
    fn missing_info_section_is_appended_at_end() {
        let (out, _) = run("[Files]\nspr = system.sff\n\n");
        assert_eq!(out, "[Files]\nspr = system.sff\n\n[Info]\nikemenversion = 1.0\n");
    }

    #[test]
    fn marker_is_appended_after_the_last_entry() {
        let (out, _) = run("[Info]\nname = a\n; trailing note\n");
        assert_eq!(out, "[Info]\nname = a\n; trailing note\nikemenversion = 1.0\n");

        let (out, _) = run("[Info]\nname = Pack\n\n; files\n[Files]\n");
        assert_eq!(out, "[Info]\nname = Pack\n\n; files\nikemenversion = 1.0\n[Files]\n");
    }

    #[test]
    fn member_facing_does_not_flip_remapped_player() {
        let (out, _) = run("[VS Screen]\np1.member2.facing = -1\np3.slide.speed = 2, 0\n");
        assert_eq!(
            out,
            "[VS Screen]\np3.facing = -1\np3.velocity = 2, 0\n[Info]\nikemenversion = 1.0\n"
        );
    }

    #[test]
    fn mixed_endings_keep_untouched_lines() {
        let (out, _) = run("[Info]\r\nname = x\n; note\n\r\n");
        assert_eq!(out, "[Info]\r\nname = x\r\n; note\n\r\nikemenversion = 1.0\r\n");
    }

    #[test]
    fn marker_keeps_inline_comment() {
        let (out, _) = run("[Info]\nIkemenVersion = 0.99 ; old\n");
        assert_eq!(out, "[Info]\nIkemenVersion = 1.0 ; old\n");
    }

    #[test]
    fn only_first_info_is_stamped() {
        let input = "[Info]\nname = a\n[Info]\nname = b\n";
        let doc = parse(input);
        let warnings = diagnose(&doc);
        assert_eq!(
            warnings,
            vec![Warning::DuplicateSection {
                name: "Info".to_string(),
                count: 2
            }]
        );
        let (out, _) = run(input);
        assert_eq!(out, "[Info]\nname = a\nikemenversion = 1.0\n[Info]\nname = b\n");
    }

    #[test]
    fn deprecated_keys_are_removed() {
        let (out, changes) = run("[VS Screen]\np2.accept.key = a\nP2.Skip.Key = b\np1.name.font = 1\n");
        assert!(!out.to_ascii_lowercase().contains("p2.accept.key"));
        assert!(!out.to_ascii_lowercase().contains("p2.skip.key"));
        assert!(out.contains("p1.name.font = 1"));
        assert_eq!(
            changes
                .iter()
                .filter(|c| matches!(c.kind, ChangeKind::KeyDeleted { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn sections_are_renamed_with_surroundings_kept() {
        let (out, _) = run("  [menu info] ; pause\nmenu.pos = 1, 2\n");
        assert!(out.starts_with("  [Pause Menu] ; pause\nmenu.pos = 1, 2\n"));
        assert_eq!(rename_header("[MenuBGdef]", "PauseBGdef"), "[PauseBGdef]");
    }

    #[test]
    fn renamed_sections_pick_up_their_new_rules() {
        let (out, _) = run("[Menu Info]\nmenu.uselocalcoord = 1\nmenu.pos = 0, 0\n");
        assert!(!out.contains("uselocalcoord"));
    }

    #[test]
    fn option_info_gains_defaults_before_trailing_comments() {
        let (out, _) = run("[Option Info]\ntitle.text = Options\n; keys\n");
        assert_eq!(
            out,
            "[Option Info]\ntitle.text = Options\nkeymenu.pos = 0, 0\nkeymenu.window.margins.y = 0, 0\nkeymenu.window.visibleitems = 0\n; keys\n[Info]\nikemenversion = 1.0\n"
        );
    }

    #[test]
    fn commented_keys_pass_through() {
        let (out, _) = run("[VS Screen]\n;p2.accept.key = a\n");
        assert!(out.starts_with("[VS Screen]\n;p2.accept.key = a\n"));
    }

    #[test]
    fn preamble_lines_are_normalized() {
        let (out, changes) = run("stray=1\n[Info]\nikemenversion = 0.5\n");
        assert!(out.starts_with("stray = 1\n"));
        assert_eq!(changes[0].to_string(), "normalized stray");
    }

    #[test]
    fn rewrite_is_deterministic() {
        let input = "[VS Screen]\np1.offset = 1, 2\np1.member2.offset = 3, 4\np2.member2.scale = 2, 2\n";
        assert_eq!(run(input).0, run(input).0);
    }
}
