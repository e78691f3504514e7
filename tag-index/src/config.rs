use crate::error::IndexError;
use crate::error::Result;
use ctagnav_tag_rank::SyntaxTable;
use ctagnav_tag_rank::rank::DEFAULT_SCOPE_RE;
use ctagnav_tag_store::FilterSet;
use log::warn;
use regex::Regex;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const DEFAULT_SETTINGS: &str = include_str!("../assets/default-settings.json");

/// `{field: regex}` rules keyed by language selector.
pub type SelectorFilters = BTreeMap<String, BTreeMap<String, String>>;

/// Tag generator invocation: a shell-style string or an argv list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Line(String),
    Argv(Vec<String>),
}

impl CommandLine {
    pub fn argv(&self) -> Result<Vec<String>> {
        let argv = match self {
            CommandLine::Line(line) => shlex::split(line)
                .ok_or_else(|| IndexError::Config(format!("cannot parse command {line:?}")))?,
            CommandLine::Argv(argv) => argv.clone(),
        };
        if argv.first().is_none_or(String::is_empty) {
            return Err(IndexError::Config("command is empty".to_string()));
        }
        Ok(argv)
    }
}

impl Default for CommandLine {
    fn default() -> Self {
        CommandLine::Line("ctags".to_string())
    }
}

/// A library tag directory searched for references in matching languages on
/// one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ExtraTagPathRepr")]
pub struct ExtraTagPath {
    pub selector: String,
    /// `linux`, `osx` or `windows`
    pub platform: String,
    pub path: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtraTagPathRepr {
    Object {
        selector: String,
        platform: String,
        path: String,
    },
    /// `[[selector, platform], path]`
    Pair((String, String), String),
}

impl From<ExtraTagPathRepr> for ExtraTagPath {
    fn from(repr: ExtraTagPathRepr) -> Self {
        match repr {
            ExtraTagPathRepr::Object {
                selector,
                platform,
                path,
            }
            | ExtraTagPathRepr::Pair((selector, platform), path) => Self {
                selector,
                platform,
                path,
            },
        }
    }
}

/// Settings for tag generation, lookup and ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsConfig {
    /// Name of the tag file searched for upwards from a source file
    #[serde(default = "default_tag_file")]
    pub tag_file: String,

    /// Additional tag file names looked up next to the tag file and in
    /// project folders
    #[serde(default = "default_extra_tag_files")]
    pub extra_tag_files: Vec<String>,

    #[serde(default)]
    pub extra_tag_paths: Vec<ExtraTagPath>,

    /// Tag generator command
    #[serde(default)]
    pub command: CommandLine,

    /// Extra arguments passed to the tag generator
    #[serde(default)]
    pub opts: Vec<String>,

    /// Build directories recursively (`-R`)
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Applied to every lookup
    #[serde(default = "default_filters")]
    pub filters: SelectorFilters,

    /// Applied to definition candidates before ranking
    #[serde(default)]
    pub definition_filters: SelectorFilters,

    /// Regex with four captures: start line, start column, end line, end column
    #[serde(default = "default_scope_re")]
    pub scope_re: String,

    /// Per-language rules, merged over the built-in table
    #[serde(
        default = "default_language_syntax",
        deserialize_with = "merge_language_syntax"
    )]
    pub language_syntax: SyntaxTable,

    #[serde(default)]
    pub autocomplete: bool,

    /// Tag files larger than this yield no completions
    #[serde(default = "default_autocomplete_max_bytes")]
    pub autocomplete_max_bytes: u64,
}

fn default_tag_file() -> String {
    ".tags".to_string()
}

fn default_extra_tag_files() -> Vec<String> {
    vec![".gemtags".to_string(), "tags".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_filters() -> SelectorFilters {
    BTreeMap::from([(
        "source.python".to_string(),
        BTreeMap::from([("kind".to_string(), "^i$".to_string())]),
    )])
}

fn default_scope_re() -> String {
    DEFAULT_SCOPE_RE.to_string()
}

fn default_autocomplete_max_bytes() -> u64 {
    100 * 1024 * 1024
}

#[derive(Deserialize)]
struct BuiltinSettings {
    language_syntax: SyntaxTable,
}

/// The built-in language table.
pub fn default_language_syntax() -> SyntaxTable {
    match serde_json::from_str::<BuiltinSettings>(DEFAULT_SETTINGS) {
        Ok(settings) => settings.language_syntax,
        Err(err) => {
            warn!("Built-in language settings are invalid: {err}");
            SyntaxTable::default()
        }
    }
}

fn merge_language_syntax<'de, D>(deserializer: D) -> std::result::Result<SyntaxTable, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = SyntaxTable::deserialize(deserializer)?;
    let mut table = default_language_syntax();
    table.extend(overrides);
    Ok(table)
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            tag_file: default_tag_file(),
            extra_tag_files: default_extra_tag_files(),
            extra_tag_paths: Vec::new(),
            command: CommandLine::default(),
            opts: Vec::new(),
            recursive: true,
            filters: default_filters(),
            definition_filters: SelectorFilters::new(),
            scope_re: default_scope_re(),
            language_syntax: default_language_syntax(),
            autocomplete: false,
            autocomplete_max_bytes: default_autocomplete_max_bytes(),
        }
    }
}

impl TagsConfig {
    /// Read a JSON settings file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => IndexError::NotFound(path.to_path_buf()),
            _ => IndexError::Io(err),
        })?;
        let config: TagsConfig = serde_json::from_str(&content)?;
        config.validate().map_err(IndexError::Config)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.tag_file.trim().is_empty() {
            return Err("tag_file must not be empty".to_string());
        }

        if let Err(err) = self.command.argv() {
            return Err(err.to_string());
        }

        let scope_re =
            Regex::new(&self.scope_re).map_err(|err| format!("invalid scope_re: {err}"))?;
        if scope_re.captures_len() < 5 {
            return Err("scope_re must have four capture groups".to_string());
        }

        if self.autocomplete_max_bytes == 0 {
            return Err("autocomplete_max_bytes must be > 0".to_string());
        }

        Ok(())
    }

    /// Lookup filters whose selector matches `source`.
    pub fn filters_for(&self, source: &str) -> FilterSet {
        compile_selector_filters(&self.filters, source)
    }

    pub fn definition_filters_for(&self, source: &str) -> FilterSet {
        compile_selector_filters(&self.definition_filters, source)
    }

    /// Extra tag paths that apply to `source` on `platform`.
    pub fn extra_tag_paths_for<'a>(
        &'a self,
        source: &'a str,
        platform: &'a str,
    ) -> impl Iterator<Item = &'a ExtraTagPath> {
        self.extra_tag_paths
            .iter()
            .filter(move |extra| extra.platform == platform && selector_matches(&extra.selector, source))
    }
}

fn compile_selector_filters(filters: &SelectorFilters, source: &str) -> FilterSet {
    FilterSet::from_maps(
        filters
            .iter()
            .filter(|(selector, _)| selector_matches(selector, source))
            .map(|(_, rules)| rules),
    )
}

/// Whether a scope selector matches the source scope name.
///
/// A selector matches when it is empty, `*`, equal to the scope name, or a
/// dotted prefix of it (`source` matches `source.python`). Comma-separated
/// selectors match if any part does.
pub fn selector_matches(selector: &str, source: &str) -> bool {
    selector.split(',').map(str::trim).any(|part| {
        part.is_empty()
            || part == "*"
            || source
                .strip_prefix(part)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    })
}

/// The platform name used by `extra_tag_paths`.
pub fn current_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "osx",
        "windows" => "windows",
        _ => "linux",
    }
}
