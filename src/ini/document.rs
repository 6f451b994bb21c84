/// Line terminator style of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// What a generated line carries before the `\n` that ends it.
    pub fn line_suffix(self) -> &'static str {
        match self {
            LineEnding::Lf => "",
            LineEnding::CrLf => "\r",
        }
    }
}

/// A `key = value` line.
///
/// `raw` holds the line exactly as read, up to but excluding its `\n`. Rules
/// that rewrite the entry clear it, after which the serializer renders the
/// canonical form in the document's line ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    /// Inline `; comment` tail, including the whitespace before the semicolon.
    pub comment: String,
    pub raw: Option<String>,
}

impl KeyValue {
    /// Build a freshly generated entry with no raw text.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            comment: String::new(),
            raw: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Case-insensitive key comparison.
    pub fn key_is(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }

    /// `key = value<comment>`, or `key =<comment>` for an empty value.
    pub fn canonical(&self) -> String {
        if self.value.is_empty() {
            format!("{} ={}", self.key, self.comment)
        } else {
            format!("{} = {}{}", self.key, self.value, self.comment)
        }
    }

    pub fn render(&self, ending: LineEnding) -> String {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => self.canonical() + ending.line_suffix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    KeyValue(KeyValue),
    /// `;` comments and any line the parser does not recognize.
    Comment(String),
    /// Empty or whitespace-only line, kept verbatim.
    Blank(String),
}

impl Entry {
    pub fn as_key_value(&self) -> Option<&KeyValue> {
        match self {
            Entry::KeyValue(kv) => Some(kv),
            _ => None,
        }
    }

    pub fn render(&self, ending: LineEnding) -> String {
        match self {
            Entry::KeyValue(kv) => kv.render(ending),
            Entry::Comment(raw) | Entry::Blank(raw) => raw.clone(),
        }
    }

    /// True for blank lines and comments, the lines that tend to introduce the
    /// next section rather than belong to the current one.
    pub fn is_trivia(&self) -> bool {
        matches!(self, Entry::Comment(_) | Entry::Blank(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Header line as read; `None` for sections created by a rule.
    pub header: Option<String>,
    pub entries: Vec<Entry>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: None,
            entries: Vec::new(),
        }
    }

    pub fn render_header(&self, ending: LineEnding) -> String {
        match &self.header {
            Some(raw) => raw.clone(),
            None => format!("[{}]{}", self.name, ending.line_suffix()),
        }
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name)
    }

    /// Lowercased name, the form rule tables are keyed by.
    pub fn key(&self) -> String {
        self.name.trim().to_ascii_lowercase()
    }

    pub fn key_values(&self) -> impl Iterator<Item = &KeyValue> {
        self.entries.iter().filter_map(Entry::as_key_value)
    }

    pub fn find(&self, key: &str) -> Option<&KeyValue> {
        self.key_values().find(|kv| kv.key_is(key))
    }

    pub fn find_mut(&mut self, key: &str) -> Option<&mut KeyValue> {
        self.entries.iter_mut().find_map(|entry| match entry {
            Entry::KeyValue(kv) if kv.key_is(key) => Some(kv),
            _ => None,
        })
    }

    /// Index just past the last non-trivia entry.
    ///
    /// New keys go here so that comments and blank lines heading the next
    /// section stay attached to it.
    pub fn insertion_point(&self) -> usize {
        self.entries
            .iter()
            .rposition(|entry| !entry.is_trivia())
            .map_or(0, |idx| idx + 1)
    }
}

/// An INI-like document: preamble lines followed by sections, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigDocument {
    pub bom: bool,
    pub line_ending: LineEnding,
    /// Whether the last line carried a terminator.
    pub trailing_newline: bool,
    /// Lines before the first section header.
    pub preamble: Vec<Entry>,
    pub sections: Vec<Section>,
}

impl ConfigDocument {
    /// First section with the given name.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.is_named(name))
    }

    pub fn count_sections(&self, name: &str) -> usize {
        self.sections
            .iter()
            .filter(|section| section.is_named(name))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.preamble.is_empty() && self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_keeps_inline_comment() {
        let kv = KeyValue::new("name", "Pack").with_comment("  ; title");
        assert_eq!(kv.canonical(), "name = Pack  ; title");
    }

    #[test]
    fn canonical_form_of_empty_value() {
        assert_eq!(KeyValue::new("menu.itemname.empty", "").canonical(), "menu.itemname.empty =");
    }

    #[test]
    fn raw_text_wins_over_canonical_form() {
        let mut kv = KeyValue::new("a", "1");
        kv.raw = Some("a=1".to_string());
        assert_eq!(kv.render(LineEnding::CrLf), "a=1");
    }

    #[test]
    fn generated_lines_follow_document_ending() {
        let kv = KeyValue::new("a", "1");
        assert_eq!(kv.render(LineEnding::Lf), "a = 1");
        assert_eq!(kv.render(LineEnding::CrLf), "a = 1\r");
        assert_eq!(Section::new("Info").render_header(LineEnding::CrLf), "[Info]\r");
    }

    #[test]
    fn insertion_point_skips_trailing_trivia() {
        let mut section = Section::new("Info");
        section.entries = vec![
            Entry::KeyValue(KeyValue::new("name", "x")),
            Entry::Blank(String::new()),
            Entry::Comment("; next".to_string()),
        ];
        assert_eq!(section.insertion_point(), 1);

        let empty = Section::new("Info");
        assert_eq!(empty.insertion_point(), 0);
    }

    #[test]
    fn section_lookup_ignores_case() {
        let doc = ConfigDocument {
            sections: vec![Section::new("Info"), Section::new("info")],
            ..Default::default()
        };
        assert!(doc.section("INFO").is_some());
        assert_eq!(doc.count_sections("Info"), 2);
    }
}
