//! Per-entry rewrites
//!
//! Everything here looks at one `key = value` line at a time. Rules that need
//! to see a whole section (offset merging, velocity) live in `aggregate`.

use crate::ini::KeyValue;
use crate::rules::engine::{ChangeKind, ChangeLog};
use crate::rules::loader::Ruleset;
use regex::Regex;
use std::sync::LazyLock;

/// Sections whose `*.itemname.*empty` entries become spacers.
const MENU_SECTIONS: [&str; 7] = [
    "title info",
    "select info",
    "option info",
    "attract mode",
    "pause menu",
    "training pause menu",
    "replay info",
];

const HISCORE_TITLES: [(&str, &str); 6] = [
    ("arcade", "Ranking Arcade"),
    ("teamarcade", "Ranking Team Arcade"),
    ("teamcoop", "Ranking Team Cooperative"),
    ("timeattack", "Ranking Time Attack"),
    ("survival", "Ranking Survival"),
    ("survivalcoop", "Ranking Survival Cooperative"),
];

const PULSE_VALUE: &str = "30, 20, 30";

static PLAYER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(p)([12])(\..*)$").expect("static regex must compile"));
static MEMBER_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.member([1-4])").expect("static regex must compile"));
static BOXCURSOR_ALPHARANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.*\bboxcursor)\.alpharange$").expect("static regex must compile")
});
static EMPTY_ITEMNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+\.itemname\..*)empty$").expect("static regex must compile")
});
static SELECT_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^cell\.([0-9]+)\.([0-9]+)\.(offset|facing|skip)$")
        .expect("static regex must compile")
});
static SELECT_CURSOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^p([12])\.cursor\.(active|done)\.([0-9]+)\.([0-9]+)\.(anim|spr|offset|facing|scale)$",
    )
    .expect("static regex must compile")
});

/// Rewrite one entry of `section` (lowercase name).
///
/// Returns the replacement lines: usually one, several when a key fans out,
/// never none. An entry no rule touches comes back unchanged.
pub(crate) fn rewrite_entry(
    section: &str,
    kv: KeyValue,
    rules: &Ruleset,
    log: &mut ChangeLog,
) -> Vec<KeyValue> {
    let strip_all = strips_all_quotes(&kv.key);
    let (was_wrapped, inner) = unwrap_quotes(&kv.value);
    let mut changed = false;
    let mut value = inner.to_string();

    for rule in rules.value_rewrites_for(section) {
        if !rule.key.is_match(&kv.key) {
            continue;
        }
        let rewritten = rule
            .pattern
            .replace_all(&value, rule.replace.as_str())
            .into_owned();
        if rewritten != value {
            log.record(
                section,
                ChangeKind::ValueRewritten {
                    key: kv.key.clone(),
                    from: value.clone(),
                    to: rewritten.clone(),
                },
            );
            value = rewritten;
            changed = true;
        }
    }

    if strip_all {
        let stripped = value.replace('"', "");
        if was_wrapped || stripped != value {
            changed = true;
        }
        value = stripped;
    }

    if is_key_binding(&kv.key) {
        let normalized = normalize_key_list(&value);
        if normalized != value {
            log.record(
                section,
                ChangeKind::ValueRewritten {
                    key: kv.key.clone(),
                    from: value.clone(),
                    to: normalized.clone(),
                },
            );
            value = normalized;
            changed = true;
        }
    }

    let mut key = kv.key.clone();
    if let Some(remapped) = remap_member_key(&key) {
        log.record(
            section,
            ChangeKind::KeyRenamed {
                from: key.clone(),
                to: vec![remapped.clone()],
            },
        );
        key = remapped;
        changed = true;
    }

    if let Some(pulse) = boxcursor_pulse_key(&key) {
        log.record(
            section,
            ChangeKind::KeyRenamed {
                from: key.clone(),
                to: vec![pulse.clone()],
            },
        );
        key = pulse;
        value = PULSE_VALUE.to_string();
        changed = true;
    }

    if MENU_SECTIONS.contains(&section) && value.trim().is_empty() {
        if let Some(spacer) = spacer_key(&key) {
            log.record(
                section,
                ChangeKind::KeyRenamed {
                    from: key,
                    to: vec![spacer.clone()],
                },
            );
            return vec![KeyValue::new(spacer, "-").with_comment(kv.comment)];
        }
    }

    if section == "hiscore info" && key.eq_ignore_ascii_case("title.text") {
        let quote = if was_wrapped && !strip_all { "\"" } else { "" };
        let expanded: Vec<KeyValue> = HISCORE_TITLES
            .iter()
            .map(|(mode, title)| {
                KeyValue::new(format!("title.text.{mode}"), format!("{quote}{title}{quote}"))
            })
            .collect();
        log.record(
            section,
            ChangeKind::KeyRenamed {
                from: key,
                to: expanded.iter().map(|kv| kv.key.clone()).collect(),
            },
        );
        return expanded;
    }

    let value = if was_wrapped && !strip_all {
        format!("\"{value}\"")
    } else {
        value.trim().to_string()
    };

    if let Some(keys) = rename_key(section, &key, rules) {
        log.record(
            section,
            ChangeKind::KeyRenamed {
                from: key,
                to: keys.clone(),
            },
        );
        return keys
            .into_iter()
            .map(|key| KeyValue::new(key, value.clone()).with_comment(kv.comment.clone()))
            .collect();
    }

    if !changed && value == kv.value {
        return vec![kv];
    }
    vec![KeyValue {
        key,
        value,
        comment: kv.comment,
        raw: None,
    }]
}

/// `*.key` bindings and `glyphs` lose every double quote.
fn strips_all_quotes(key: &str) -> bool {
    key.eq_ignore_ascii_case("glyphs") || is_key_binding(key)
}

fn is_key_binding(key: &str) -> bool {
    key.to_ascii_lowercase().ends_with(".key")
}

/// Split off one pair of quotes wrapping the whole value.
fn unwrap_quotes(value: &str) -> (bool, &str) {
    let trimmed = value.trim();
    match trimmed
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
    {
        Some(inner) => (true, inner),
        None => (false, value),
    }
}

/// `a&b & c` becomes `a, b, c`.
fn normalize_key_list(value: &str) -> String {
    let parts: Vec<&str> = value
        .split('&')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        value.trim().to_string()
    } else {
        parts.join(", ")
    }
}

/// `p1.member3.icon.offset` becomes `p5.icon.offset`.
///
/// Members of p1 map to p1, p3, p5, p7 and members of p2 to p2, p4, p6, p8.
pub(crate) fn remap_member_key(key: &str) -> Option<String> {
    let caps = PLAYER_KEY.captures(key)?;
    let rest = &caps[3];
    let member = MEMBER_SEGMENT.captures(rest)?;
    let segment = member.get(0)?;

    let base: u32 = caps[2].parse().ok()?;
    let index: u32 = member[1].parse().ok()?;
    let player = base + 2 * (index - 1);

    Some(format!(
        "{}{}{}{}",
        &caps[1],
        player,
        &rest[..segment.start()],
        &rest[segment.end()..]
    ))
}

fn boxcursor_pulse_key(key: &str) -> Option<String> {
    let caps = BOXCURSOR_ALPHARANGE.captures(key)?;
    Some(format!("{}.pulse", &caps[1]))
}

fn spacer_key(key: &str) -> Option<String> {
    let caps = EMPTY_ITEMNAME.captures(key)?;
    Some(format!("{}spacer", &caps[1]))
}

/// New key names for `key`, or `None` when no rename applies.
fn rename_key(section: &str, key: &str, rules: &Ruleset) -> Option<Vec<String>> {
    if section == "select info" {
        if let Some(shifted) = zero_based_select_key(key) {
            return Some(vec![shifted]);
        }
    }

    rules.key_renames_for(section).iter().find_map(|rule| {
        let caps = rule.key.captures(key)?;
        Some(
            rule.to
                .iter()
                .map(|template| {
                    let mut expanded = String::new();
                    caps.expand(template, &mut expanded);
                    expanded
                })
                .collect(),
        )
    })
}

/// `cell.R.C.*` and `pN.cursor.(active|done).R.C.*` use 1-based `R.C`
/// indices; the new engine expects 0-based `R-C`.
fn zero_based_select_key(key: &str) -> Option<String> {
    if let Some(caps) = SELECT_CELL.captures(key) {
        let (row, col) = shift_index(&caps[1], &caps[2])?;
        return Some(format!(
            "cell.{row}-{col}.{}",
            caps[3].to_ascii_lowercase()
        ));
    }

    let caps = SELECT_CURSOR.captures(key)?;
    let (row, col) = shift_index(&caps[3], &caps[4])?;
    Some(format!(
        "p{}.cursor.{}.{row}-{col}.{}",
        &caps[1],
        caps[2].to_ascii_lowercase(),
        caps[5].to_ascii_lowercase()
    ))
}

fn shift_index(row: &str, col: &str) -> Option<(i64, i64)> {
    Some((row.parse::<i64>().ok()? - 1, col.parse::<i64>().ok()? - 1))
}
