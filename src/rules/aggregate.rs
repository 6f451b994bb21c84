//! Rewrites that fold several entries of a section into new ones
//!
//! Team member offsets and scales are merged into one line per final player,
//! and slide speeds become velocities once the facing of the same player is
//! known.

use crate::ini::{Entry, KeyValue, Section};
use crate::rules::engine::{ChangeKind, ChangeLog};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

/// Sections holding per-player portrait parameters.
pub(crate) const TEAM_SECTIONS: [&str; 3] = ["select info", "vs screen", "victory screen"];

/// Sections that also get `.done.offset` / `.done.scale` twins.
const DONE_TWIN_SECTIONS: [&str; 2] = ["select info", "vs screen"];

static MEMBER_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^p([12])(?:\.member([1-4]))?(?:\.(face|face2))?\.(offset|scale)$")
        .expect("static regex must compile")
});
static FACING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^p([0-9]+)(?:\.(face|face2))?\.facing$").expect("static regex must compile")
});
static SELECT_SLIDE_SPEED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^p([0-9]+)\.(face|face2)\.slide\.speed$").expect("static regex must compile")
});
static SCREEN_SLIDE_SPEED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^p([0-9]+)(?:\.(face2))?\.slide\.speed$").expect("static regex must compile")
});

/// Which portrait a parameter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Part {
    Plain,
    Face,
    Face2,
}

impl Part {
    fn from_capture(capture: Option<regex::Match<'_>>) -> Self {
        match capture.map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
            Some("face") => Part::Face,
            Some("face2") => Part::Face2,
            _ => Part::Plain,
        }
    }

    fn prefix(self, player: u32) -> String {
        match self {
            Part::Plain => format!("p{player}"),
            Part::Face => format!("p{player}.face"),
            Part::Face2 => format!("p{player}.face2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Combine {
    Offset,
    Scale,
}

impl Combine {
    fn suffix(self) -> &'static str {
        match self {
            Combine::Offset => "offset",
            Combine::Scale => "scale",
        }
    }

    fn identity(self) -> f64 {
        match self {
            Combine::Offset => 0.0,
            Combine::Scale => 1.0,
        }
    }

    fn apply(self, base: (f64, f64), member: (f64, f64)) -> (f64, f64) {
        match self {
            Combine::Offset => (base.0 + member.0, base.1 + member.1),
            Combine::Scale => (base.0 * member.0, base.1 * member.1),
        }
    }
}

/// Base value plus member overrides for one (kind, player, portrait).
#[derive(Debug)]
struct MemberGroup {
    anchor: usize,
    base: Option<(f64, f64)>,
    members: BTreeMap<u32, (f64, f64)>,
}

type GroupKey = (Combine, u32, Part);

/// Merge `pN[.memberM][.face|.face2].(offset|scale)` into one line per
/// final player.
pub(crate) fn merge_member_params(section: Section, log: &mut ChangeLog) -> Section {
    let section_key = section.key();
    if !TEAM_SECTIONS.contains(&section_key.as_str()) {
        return section;
    }

    let mut groups: BTreeMap<GroupKey, MemberGroup> = BTreeMap::new();
    let mut consumed = BTreeSet::new();
    for (idx, entry) in section.entries.iter().enumerate() {
        let Some(kv) = entry.as_key_value() else {
            continue;
        };
        let Some(caps) = MEMBER_PARAM.captures(&kv.key) else {
            continue;
        };
        let Ok(base_player) = caps[1].parse::<u32>() else {
            continue;
        };
        let member = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        let part = Part::from_capture(caps.get(3));
        let combine = if caps[4].eq_ignore_ascii_case("offset") {
            Combine::Offset
        } else {
            Combine::Scale
        };

        let pair = parse_pair(&kv.value, combine.identity());
        let group = groups
            .entry((combine, base_player, part))
            .or_insert_with(|| MemberGroup {
                anchor: idx,
                base: None,
                members: BTreeMap::new(),
            });
        match member {
            Some(member) => {
                group.members.insert(member, pair);
            }
            None => group.base = Some(pair),
        }
        consumed.insert(idx);
    }

    if groups.is_empty() {
        return section;
    }

    let mut generated: HashMap<usize, Vec<KeyValue>> = HashMap::new();
    let twins = DONE_TWIN_SECTIONS.contains(&section_key.as_str());
    for ((combine, base_player, part), group) in &groups {
        let lines = generated.entry(group.anchor).or_default();
        for (key, value) in merged_lines(*combine, *base_player, *part, group, twins) {
            log.record(
                &section_key,
                ChangeKind::Merged {
                    key: key.clone(),
                    value: value.clone(),
                },
            );
            lines.push(KeyValue::new(key, value));
        }
    }

    let Section {
        name,
        header,
        entries,
    } = section;
    let mut out = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        if !consumed.contains(&idx) {
            out.push(entry);
            continue;
        }
        if let Some(lines) = generated.remove(&idx) {
            out.extend(lines.into_iter().map(Entry::KeyValue));
        }
    }
    Section {
        name,
        header,
        entries: out,
    }
}

fn merged_lines(
    combine: Combine,
    base_player: u32,
    part: Part,
    group: &MemberGroup,
    twins: bool,
) -> Vec<(String, String)> {
    let identity = (combine.identity(), combine.identity());
    let mut members: BTreeSet<u32> = group.members.keys().copied().collect();
    if group.base.is_some() {
        members.insert(1);
    }

    let mut lines = Vec::new();
    for member in members {
        let player = base_player + 2 * (member - 1);
        let base = group.base.unwrap_or(identity);
        let own = group.members.get(&member).copied().unwrap_or(identity);
        let (x, y) = combine.apply(base, own);
        let value = format!("{}, {}", format_number(x), format_number(y));
        let prefix = part.prefix(player);
        lines.push((format!("{prefix}.{}", combine.suffix()), value.clone()));
        if twins {
            lines.push((format!("{prefix}.done.{}", combine.suffix()), value));
        }
    }
    lines
}

/// Replace `slide.speed` entries with `velocity`, flipping x by the facing
/// of the same player.
pub(crate) fn slide_speed_to_velocity(section: Section, log: &mut ChangeLog) -> Section {
    let section_key = section.key();
    let speed_pattern: &Regex = match section_key.as_str() {
        "select info" => &*SELECT_SLIDE_SPEED,
        "vs screen" | "victory screen" => &*SCREEN_SLIDE_SPEED,
        _ => return section,
    };

    let mut facings: HashMap<(u32, Part), f64> = HashMap::new();
    for kv in section.key_values() {
        let Some(caps) = FACING.captures(&kv.key) else {
            continue;
        };
        let Ok(player) = caps[1].parse::<u32>() else {
            continue;
        };
        facings.insert((player, Part::from_capture(caps.get(2))), parse_facing(&kv.value));
    }

    // (player, part) -> (anchor index, last speed seen)
    let mut speeds: BTreeMap<(u32, Part), (usize, String)> = BTreeMap::new();
    let mut consumed = BTreeSet::new();
    for (idx, entry) in section.entries.iter().enumerate() {
        let Some(kv) = entry.as_key_value() else {
            continue;
        };
        let Some(caps) = speed_pattern.captures(&kv.key) else {
            continue;
        };
        let Ok(player) = caps[1].parse::<u32>() else {
            continue;
        };
        let part = Part::from_capture(caps.get(2));
        speeds
            .entry((player, part))
            .and_modify(|(_, value)| *value = kv.value.clone())
            .or_insert_with(|| (idx, kv.value.clone()));
        consumed.insert(idx);
    }

    if speeds.is_empty() {
        return section;
    }

    let mut generated: HashMap<usize, KeyValue> = HashMap::new();
    for ((player, part), (anchor, speed)) in speeds {
        let facing = lookup_facing(&facings, player, part);
        let (x, y) = parse_pair(&speed, 0.0);
        let key = format!("{}.velocity", part.prefix(player));
        let value = format!("{}, {}", format_number(x * facing), format_number(y));
        log.record(
            &section_key,
            ChangeKind::Merged {
                key: key.clone(),
                value: value.clone(),
            },
        );
        generated.insert(anchor, KeyValue::new(key, value));
    }

    let Section {
        name,
        header,
        entries,
    } = section;
    let entries = entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            if !consumed.contains(&idx) {
                return Some(entry);
            }
            generated.remove(&idx).map(Entry::KeyValue)
        })
        .collect();
    Section {
        name,
        header,
        entries,
    }
}

/// Facing for the portrait, falling back to its sibling, then to 1.
fn lookup_facing(facings: &HashMap<(u32, Part), f64>, player: u32, part: Part) -> f64 {
    let fallback = match part {
        Part::Plain => Part::Face,
        Part::Face | Part::Face2 => Part::Plain,
    };
    facings
        .get(&(player, part))
        .or_else(|| facings.get(&(player, fallback)))
        .copied()
        .unwrap_or(1.0)
}

fn parse_facing(value: &str) -> f64 {
    value
        .split(',')
        .next()
        .and_then(|first| first.trim().parse::<f64>().ok())
        .unwrap_or(1.0)
}

/// First two comma-separated numbers; missing or malformed ones use `default`.
fn parse_pair(value: &str, default: f64) -> (f64, f64) {
    let mut parts = value.split(',').map(|part| {
        let part = part.trim();
        if part.is_empty() {
            default
        } else {
            part.parse::<f64>().unwrap_or(default)
        }
    });
    let x = parts.next().unwrap_or(default);
    let y = parts.next().unwrap_or(default);
    (x, y)
}

/// `%g` rendering: six significant digits, trailing zeros dropped, exponent
/// form (`1e-05`, `1.23457e+06`) below 1e-4 or from 1e6 up.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    // The exponent is the one left after rounding to six digits.
    let scientific = format!("{:.5e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..6).contains(&exponent) {
        let decimals = (5 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    }
}

fn trim_fraction(text: &str) -> String {
    if !text.contains('.') {
        return text.to_string();
    }
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
