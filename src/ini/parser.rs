use crate::ini::document::{ConfigDocument, Entry, KeyValue, LineEnding, Section};
use crate::ini::errors::IniError;

const BOM: &str = "\u{feff}";

/// Decode raw file bytes and parse them.
///
/// Only a decoding failure is an error; any line the parser does not
/// understand is kept as a comment.
pub fn parse_bytes(bytes: &[u8]) -> Result<ConfigDocument, IniError> {
    let text = std::str::from_utf8(bytes).map_err(|source| IniError::Decode {
        offset: source.valid_up_to(),
        source,
    })?;
    Ok(parse(text))
}

/// Parse text into a [`ConfigDocument`].
pub fn parse(text: &str) -> ConfigDocument {
    let (bom, body) = match text.strip_prefix(BOM) {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let line_ending = detect_line_ending(body);
    let mut doc = ConfigDocument {
        bom,
        line_ending,
        trailing_newline: true,
        ..Default::default()
    };

    let mut lines: Vec<&str> = body.split('\n').collect();
    // `split` yields one trailing piece after the final terminator; it is
    // empty exactly when the text ends with a newline.
    if let Some(last) = lines.pop() {
        if !last.is_empty() {
            lines.push(last);
            doc.trailing_newline = false;
        }
    }

    let count = lines.len();
    for (idx, line) in lines.into_iter().enumerate() {
        // Raw text keeps its own `\r`, so mixed endings survive untouched.
        let mut raw = line.to_string();
        if !doc.trailing_newline && idx + 1 == count && line_ending == LineEnding::CrLf {
            // The unterminated last line is stored as if it ended like the
            // rest of the file; the serializer drops this `\r` again.
            raw.push('\r');
        }
        let text = line.strip_suffix('\r').unwrap_or(line);

        if let Some(name) = parse_header(text) {
            doc.sections.push(Section {
                name,
                header: Some(raw),
                entries: Vec::new(),
            });
            continue;
        }

        let entry = parse_entry(text, raw);
        match doc.sections.last_mut() {
            Some(section) => section.entries.push(entry),
            None => doc.preamble.push(entry),
        }
    }

    doc
}

fn detect_line_ending(text: &str) -> LineEnding {
    match text.find('\n') {
        Some(idx) if text[..idx].ends_with('\r') => LineEnding::CrLf,
        _ => LineEnding::Lf,
    }
}

/// Section name for a `[Name]` line, optionally followed by a `;` comment.
pub(crate) fn parse_header(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix('[')?;
    let close = rest.find(']')?;
    let name = rest[..close].trim();
    let tail = rest[close + 1..].trim_start();
    if name.is_empty() || !(tail.is_empty() || tail.starts_with(';')) {
        return None;
    }
    Some(name.to_string())
}

fn parse_entry(text: &str, raw: String) -> Entry {
    if text.trim().is_empty() {
        return Entry::Blank(raw);
    }
    match parse_key_value(text) {
        Some((key, value, comment)) => Entry::KeyValue(KeyValue {
            key: key.to_string(),
            value: value.trim().to_string(),
            comment: comment.to_string(),
            raw: Some(raw),
        }),
        None => Entry::Comment(raw),
    }
}

fn parse_key_value(line: &str) -> Option<(&str, &str, &str)> {
    if line.trim_start().starts_with(';') {
        return None;
    }
    let eq = line.find('=')?;
    // An `=` that only appears after a `;` belongs to a comment.
    if line[..eq].contains(';') {
        return None;
    }
    let key = line[..eq].trim();
    if key.is_empty() {
        return None;
    }

    let (value, comment) = split_inline_comment(&line[eq + 1..]);
    Some((key, value, comment))
}

/// Split `value  ; note` into `("value", "  ; note")`.
///
/// The comment keeps the spaces and tabs that preceded the semicolon so that
/// aligned comments stay aligned after a rewrite.
pub fn split_inline_comment(text: &str) -> (&str, &str) {
    match text.find(';') {
        Some(idx) => {
            let body = text[..idx].trim_end_matches([' ', '\t']);
            (body, &text[body.len()..])
        }
        None => (text, ""),
    }
}
