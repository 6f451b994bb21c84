use crate::ini::document::{ConfigDocument, LineEnding};

/// Render a document back to text.
///
/// Untouched lines come out byte-for-byte as they were read, each with its own
/// line ending; rewritten and generated lines use the canonical `key = value`
/// form and the ending detected for the document.
pub fn serialize(doc: &ConfigDocument) -> String {
    let ending = doc.line_ending;
    let mut lines: Vec<String> = Vec::new();
    lines.extend(doc.preamble.iter().map(|entry| entry.render(ending)));
    for section in &doc.sections {
        lines.push(section.render_header(ending));
        lines.extend(section.entries.iter().map(|entry| entry.render(ending)));
    }

    let mut out = String::new();
    if doc.bom {
        out.push('\u{feff}');
    }
    out.push_str(&lines.join("\n"));
    if !lines.is_empty() {
        if doc.trailing_newline {
            out.push('\n');
        } else if ending == LineEnding::CrLf && out.ends_with('\r') {
            out.pop();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ini::document::{Entry, KeyValue, Section};
    use crate::ini::parser::parse;
    use proptest::prelude::*;

    #[test]
    fn round_trip_preserves_formatting() {
        let input = "; top\n[Info]\n  name=Pack   ; c\n\t\n[Files]\nspr = system.sff\n;x=1\nnot a key\n";
        assert_eq!(serialize(&parse(input)), input);
    }

    #[test]
    fn round_trip_crlf_bom_no_final_newline() {
        let input = "\u{feff}[Info]\r\nname = Pack\r\n\r\n[Music]\r\ntitle.bgm = x.mp3";
        assert_eq!(serialize(&parse(input)), input);
    }

    #[test]
    fn rewritten_entries_use_canonical_form() {
        let mut doc = parse("[Info]\r\nname=Pack\r\n");
        if let Entry::KeyValue(kv) = &mut doc.sections[0].entries[0] {
            kv.raw = None;
        }
        doc.sections.push(Section {
            entries: vec![Entry::KeyValue(KeyValue::new("ikemenversion", "1.0"))],
            ..Section::new("Extra")
        });
        assert_eq!(
            serialize(&doc),
            "[Info]\r\nname = Pack\r\n[Extra]\r\nikemenversion = 1.0\r\n"
        );
    }

    #[test]
    fn empty_document_gains_final_newline_once_content_exists() {
        let mut doc = parse("");
        assert_eq!(serialize(&doc), "");
        doc.sections.push(Section::new("Info"));
        assert_eq!(serialize(&doc), "[Info]\n");
    }

    #[test]
    fn round_trip_mixed_line_endings() {
        for input in [
            "[Info]\r\nname = x\n; note\r\n",
            "[Info]\nname = x\r\n\r\n; note\n",
            "[Info]\r\nname = x\r",
            "[Info]\r\nname = x",
            "[Info]\nname = x\r",
        ] {
            assert_eq!(serialize(&parse(input)), input, "{input:?}");
        }
    }

    #[test]
    fn generated_lines_after_unterminated_crlf_line() {
        let mut doc = parse("[Info]\r\nname = x");
        doc.sections[0]
            .entries
            .push(Entry::KeyValue(KeyValue::new("ikemenversion", "1.0")));
        assert_eq!(serialize(&doc), "[Info]\r\nname = x\r\nikemenversion = 1.0");
    }

    proptest! {
        #[test]
        fn parse_then_serialize_is_identity(
            lines in prop::collection::vec(
                ("[ \\t;=\\[\\]a-zA-Z0-9.,\"%]{0,24}", any::<bool>()),
                0..16,
            ),
            trailing in any::<bool>(),
        ) {
            let mut text = String::new();
            for (line, crlf) in &lines {
                text.push_str(line);
                text.push_str(if *crlf { "\r\n" } else { "\n" });
            }
            if !trailing {
                if let Some((_, crlf)) = lines.last() {
                    let cut = if *crlf { 2 } else { 1 };
                    text.truncate(text.len() - cut);
                }
            }
            prop_assert_eq!(serialize(&parse(&text)), text);
        }
    }
}
