use crate::error::ParseError;
use crate::path::build_tag_path;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every pseudo-tag (`!_TAG_FILE_FORMAT`, `!_TAG_PROGRAM_NAME`, ...).
pub const HEADER_MARKER: &str = "!_";

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}

/// `symbol<TAB>filename<TAB>ex_command;"<TAB>kind[<TAB>key:value]*`
///
/// `ex_command` is matched lazily up to the first `;"<TAB>`.
static TAG_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    compile_regex(concat!(
        r#"^(?P<symbol>[^\t]+)\t"#,
        r#"(?P<filename>[^\t]+)\t"#,
        r#"(?P<ex_command>.*?);"\t"#,
        r#"(?P<kind>[^\t\r\n]+)"#,
        r#"(?:\t(?P<fields>.*))?$"#,
    ))
});

static PATTERN_ESCAPE_REGEX: Lazy<Regex> = Lazy::new(|| compile_regex(r"\\([$/^\\])"));

/// Returns true for `!_` pseudo-tag lines.
pub fn is_header_line(line: &[u8]) -> bool {
    line.starts_with(HEADER_MARKER.as_bytes())
}

/// Search pattern form of an ex command, with its delimiters and anchors
/// removed and `\$ \/ \^ \\` unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPattern {
    pub text: String,
    /// `/` for forward searches, `?` for backward ones
    pub delimiter: char,
    pub anchored_start: bool,
    pub anchored_end: bool,
    /// The pattern exactly as written in the tag file.
    raw: String,
}

impl SearchPattern {
    fn parse(raw: &str) -> Option<Self> {
        let delimiter = raw.chars().next().filter(|c| *c == '/' || *c == '?')?;
        if raw.len() < 2 || !raw.ends_with(delimiter) {
            return None;
        }
        let mut inner = &raw[1..raw.len() - 1];

        let anchored_start = match inner.strip_prefix('^') {
            Some(rest) => {
                inner = rest;
                true
            }
            None => false,
        };

        // A trailing `$` is an anchor unless it is itself escaped.
        let anchored_end = inner.ends_with('$') && {
            let backslashes = inner[..inner.len() - 1]
                .bytes()
                .rev()
                .take_while(|b| *b == b'\\')
                .count();
            backslashes % 2 == 0
        };
        if anchored_end {
            inner = &inner[..inner.len() - 1];
        }

        Some(Self {
            text: unescape_pattern(inner),
            delimiter,
            anchored_start,
            anchored_end,
            raw: raw.to_string(),
        })
    }

    /// The delimited form ctags wrote, escapes included.
    pub fn to_raw(&self) -> String {
        self.raw.clone()
    }
}

/// Single-pass removal of the backslash in `\$`, `\/`, `\^` and `\\`.
pub fn unescape_pattern(pattern: &str) -> String {
    PATTERN_ESCAPE_REGEX.replace_all(pattern, "$1").into_owned()
}

/// How to find the definition line inside its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExCommand {
    /// 1-based line number, kept verbatim.
    Line(String),
    Pattern(SearchPattern),
    /// Anything ctags may emit that is neither of the above.
    Other(String),
}

impl ExCommand {
    pub fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            return ExCommand::Line(raw.to_string());
        }
        match SearchPattern::parse(raw) {
            Some(pattern) => ExCommand::Pattern(pattern),
            None => ExCommand::Other(raw.to_string()),
        }
    }

    pub fn line_number(&self) -> Option<usize> {
        match self {
            ExCommand::Line(line) => line.parse().ok(),
            _ => None,
        }
    }

    /// Line number digits, or the unescaped pattern text.
    pub fn as_str(&self) -> &str {
        match self {
            ExCommand::Line(line) => line,
            ExCommand::Pattern(pattern) => &pattern.text,
            ExCommand::Other(raw) => raw,
        }
    }

    pub fn to_raw(&self) -> String {
        match self {
            ExCommand::Line(line) => line.clone(),
            ExCommand::Pattern(pattern) => pattern.to_raw(),
            ExCommand::Other(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for ExCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed tag-file line. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    symbol: String,
    filename: String,
    ex_command: ExCommand,
    kind: String,
    fields: BTreeMap<String, String>,
    tag_path: Vec<String>,
}

impl TagRecord {
    /// Parse one line of a tag file.
    ///
    /// Header lines, lines not matching the grammar, and lines carrying an
    /// extension field without a `:` are all rejected; callers scanning whole
    /// files skip such lines.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if is_header_line(line.as_bytes()) {
            return Err(ParseError::Header);
        }

        let caps = TAG_LINE_REGEX.captures(line).ok_or(ParseError::Grammar)?;
        let symbol = &caps["symbol"];
        let filename = &caps["filename"];
        let fields = parse_fields(caps.name("fields").map(|found| found.as_str()))?;
        let tag_path = build_tag_path(symbol, filename, &fields);

        Ok(Self {
            symbol: symbol.to_string(),
            filename: filename.to_string(),
            ex_command: ExCommand::parse(&caps["ex_command"]),
            kind: caps["kind"].to_string(),
            fields,
            tag_path,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn ex_command(&self) -> &ExCommand {
        &self.ex_command
    }

    /// Language-defined kind code (`f`, `c`, `m`, ...).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Extension field keys in sorted order.
    pub fn field_keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// `(filename, containers..., symbol)`
    pub fn tag_path(&self) -> &[String] {
        &self.tag_path
    }

    /// Look up a core attribute or an extension field by name.
    ///
    /// `kind` is also reachable as `type`, the name older tag tooling uses.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "symbol" => Some(&self.symbol),
            "filename" => Some(&self.filename),
            "ex_command" => Some(self.ex_command.as_str()),
            "kind" | "type" => Some(&self.kind),
            _ => self.field(key),
        }
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl AsRef<TagRecord> for TagRecord {
    fn as_ref(&self) -> &TagRecord {
        self
    }
}

impl FromStr for TagRecord {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        Self::parse(line)
    }
}

fn parse_fields(raw: Option<&str>) -> Result<BTreeMap<String, String>, ParseError> {
    let mut fields = BTreeMap::new();
    let Some(raw) = raw else {
        return Ok(fields);
    };

    for piece in raw.split('\t').filter(|piece| !piece.is_empty()) {
        let (key, value) = piece
            .split_once(':')
            .ok_or_else(|| ParseError::MalformedField {
                field: piece.to_string(),
            })?;
        fields.insert(key.to_string(), value.to_string());
    }

    Ok(fields)
}
