//! Per-language syntax rules used to read receiver chains and to guess which
//! kinds of definition a reference expects.

use crate::error::RankError;
use crate::error::Result;
use regex::Regex;
use regex::RegexBuilder;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// Token lists driving the backward receiver-chain scan. Every entry is a regex.
///
/// Fields are optional so a language can override only some of the lists it
/// inherits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberExpSyntax {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,
    /// Whitespace-like tokens that end the chain outside brackets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Member access operators (`\.`, `->`, `::`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splitters: Option<Vec<String>>,
    /// Receivers naming the current object (`this`, `self`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this: Option<Vec<String>>,
}

impl MemberExpSyntax {
    pub fn open(&self) -> &[String] {
        self.open.as_deref().unwrap_or_default()
    }

    pub fn close(&self) -> &[String] {
        self.close.as_deref().unwrap_or_default()
    }

    pub fn ignore(&self) -> &[String] {
        self.ignore.as_deref().unwrap_or_default()
    }

    pub fn stop(&self) -> &[String] {
        self.stop.as_deref().unwrap_or_default()
    }

    pub fn splitters(&self) -> &[String] {
        self.splitters.as_deref().unwrap_or_default()
    }

    pub fn this(&self) -> &[String] {
        self.this.as_deref().unwrap_or_default()
    }

    /// Lists set on `self` win over `base`.
    fn merged_over(&self, base: &MemberExpSyntax) -> MemberExpSyntax {
        MemberExpSyntax {
            open: self.open.clone().or_else(|| base.open.clone()),
            close: self.close.clone().or_else(|| base.close.clone()),
            ignore: self.ignore.clone().or_else(|| base.ignore.clone()),
            stop: self.stop.clone().or_else(|| base.stop.clone()),
            splitters: self.splitters.clone().or_else(|| base.splitters.clone()),
            this: self.this.clone().or_else(|| base.this.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSyntax {
    /// Source scope to inherit unset rules from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_exp: Option<MemberExpSyntax>,

    /// `regex containing __symbol__ -> kinds`; when the regex matches the
    /// reference line, definitions of those kinds are preferred.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reference_types: BTreeMap<String, Vec<String>>,
}

impl LanguageSyntax {
    fn merged_over(&self, base: &LanguageSyntax) -> LanguageSyntax {
        let member_exp = match (&self.member_exp, &base.member_exp) {
            (Some(own), Some(base)) => Some(own.merged_over(base)),
            (own, base) => own.clone().or_else(|| base.clone()),
        };
        let mut reference_types = base.reference_types.clone();
        reference_types.extend(
            self.reference_types
                .iter()
                .map(|(pattern, kinds)| (pattern.clone(), kinds.clone())),
        );
        LanguageSyntax {
            inherit: self.inherit.clone(),
            member_exp,
            reference_types,
        }
    }
}

/// Language rules keyed by source scope (`source.python`, `source.js`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyntaxTable(BTreeMap<String, LanguageSyntax>);

impl SyntaxTable {
    pub fn new(languages: BTreeMap<String, LanguageSyntax>) -> Self {
        Self(languages)
    }

    pub fn get(&self, source: &str) -> Option<&LanguageSyntax> {
        self.0.get(source)
    }

    pub fn insert(&mut self, source: impl Into<String>, syntax: LanguageSyntax) {
        self.0.insert(source.into(), syntax);
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Rules for `source` with one level of `inherit` applied.
    pub fn resolve(&self, source: &str) -> Option<LanguageSyntax> {
        let own = self.0.get(source)?;
        let base = own.inherit.as_deref().and_then(|name| self.0.get(name));
        Some(match base {
            Some(base) => own.merged_over(base),
            None => own.clone(),
        })
    }

    /// Entries from `overrides` replace same-named entries here.
    pub fn extend(&mut self, overrides: SyntaxTable) {
        self.0.extend(overrides.0);
    }
}

/// `a|b|c` as one regex, wrapped per `anchor`. `None` for an empty list.
pub(crate) fn compile_alternation(
    patterns: &[String],
    anchor: Anchor,
    case_insensitive: bool,
) -> Result<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let joined = patterns.join("|");
    let pattern = match anchor {
        Anchor::None => format!("(?:{joined})"),
        Anchor::Start => format!("^(?:{joined})"),
        Anchor::Full => format!("^(?:{joined})$"),
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map(Some)
        .map_err(|source| RankError::InvalidRegex { pattern, source })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Anchor {
    None,
    Start,
    Full,
}
