//! Ordering of candidate definitions for a reference.
//!
//! Candidates are first narrowed by scope, then by the definition filters,
//! then sorted by the sum of three heuristics: the kind the reference line
//! suggests, whether the definition lives in the referencing file, and how
//! well the definition's path resembles the receiver chain.

use crate::grams::PathGramWeights;
use crate::grams::Trigram;
use crate::grams::receiver_grams;
use crate::syntax::Anchor;
use crate::syntax::LanguageSyntax;
use crate::syntax::compile_alternation;
use ctagnav_tag_store::FilterSet;
use ctagnav_tag_store::TagRecord;
use log::debug;
use log::warn;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;

pub const RANK_MATCH_TYPE: f64 = 30.0;
pub const RANK_EQ_FILENAME: f64 = 10.0;
pub const RANK_EXACT_MATCH_RIGHTMOST_PART: f64 = 20.0;

pub const DEFAULT_SCOPE_RE: &str = r"(\d+):(\d+)-(\d+):(\d+)";
const SYMBOL_PLACEHOLDER: &str = "__symbol__";

/// Zero-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TextPosition {
    pub line: usize,
    pub column: usize,
}

impl TextPosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Selection or caret covering the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorRegion {
    pub begin: TextPosition,
    pub end: TextPosition,
}

impl CursorRegion {
    pub fn new(begin: TextPosition, end: TextPosition) -> Self {
        Self { begin, end }
    }

    pub fn caret(position: TextPosition) -> Self {
        Self::new(position, position)
    }
}

/// Everything known about the reference being resolved.
#[derive(Debug, Clone)]
pub struct RankContext {
    pub symbol: String,
    /// The full source line containing the reference.
    pub symbol_line: String,
    pub receiver_chain: Vec<String>,
    /// Absolute path of the referencing file, if it has one.
    pub file_name: Option<PathBuf>,
    pub region: Option<CursorRegion>,
    pub syntax: Option<LanguageSyntax>,
    pub definition_filters: FilterSet,
    pub scope_re: String,
}

impl RankContext {
    pub fn new(symbol: impl Into<String>, symbol_line: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            symbol_line: symbol_line.into(),
            receiver_chain: Vec::new(),
            file_name: None,
            region: None,
            syntax: None,
            definition_filters: FilterSet::default(),
            scope_re: DEFAULT_SCOPE_RE.to_string(),
        }
    }

    pub fn with_receiver_chain(mut self, receiver_chain: Vec<String>) -> Self {
        self.receiver_chain = receiver_chain;
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<PathBuf>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_region(mut self, region: CursorRegion) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_syntax(mut self, syntax: Option<LanguageSyntax>) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_definition_filters(mut self, filters: FilterSet) -> Self {
        self.definition_filters = filters;
        self
    }

    pub fn with_scope_re(mut self, scope_re: impl Into<String>) -> Self {
        self.scope_re = scope_re.into();
        self
    }
}

/// Per-reference ranking state, compiled once from a [`RankContext`].
#[derive(Debug)]
pub struct RankManager {
    context: RankContext,
    file_name_lower: Option<String>,
    receiver_grams: HashSet<Trigram>,
    preferred_kinds: HashSet<String>,
    this_re: Option<Regex>,
    scope_re: Option<Regex>,
}

impl RankManager {
    pub fn new(context: RankContext) -> Self {
        let file_name_lower = context
            .file_name
            .as_deref()
            .map(|path| normalize_separators(&path.to_string_lossy()).to_lowercase());
        let receiver_grams = receiver_grams(&context.receiver_chain);
        let preferred_kinds = preferred_kinds(&context);
        let this_re = this_regex(context.syntax.as_ref());
        let scope_re = match Regex::new(&context.scope_re) {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!("Invalid scope_re {:?}: {err}", context.scope_re);
                None
            }
        };

        Self {
            context,
            file_name_lower,
            receiver_grams,
            preferred_kinds,
            this_re,
            scope_re,
        }
    }

    pub fn context(&self) -> &RankContext {
        &self.context
    }

    /// Whether `rel_path` names the referencing file.
    ///
    /// Case-insensitive suffix match after stripping leading dots.
    pub fn eq_filename(&self, rel_path: &str) -> bool {
        let Some(file_name) = &self.file_name_lower else {
            return false;
        };
        let rel_path = normalize_separators(rel_path.trim_start_matches('.')).to_lowercase();
        !rel_path.is_empty() && file_name.ends_with(&rel_path)
    }

    /// Split into `(in_scope, no_scope)`.
    ///
    /// A candidate is in scope when its `scope` range lies in the
    /// referencing file and contains the cursor region.
    pub fn scope_filter<T: AsRef<TagRecord>>(&self, candidates: Vec<T>) -> (Vec<T>, Vec<T>) {
        let mut in_scope = Vec::new();
        let mut no_scope = Vec::new();
        for candidate in candidates {
            if self.contains_cursor(candidate.as_ref()) {
                in_scope.push(candidate);
            } else {
                no_scope.push(candidate);
            }
        }
        (in_scope, no_scope)
    }

    fn contains_cursor(&self, record: &TagRecord) -> bool {
        let Some(region) = self.context.region else {
            return false;
        };
        let Some(scope) = record.field("scope").filter(|scope| *scope != "global") else {
            return false;
        };
        if !self.eq_filename(record.filename()) {
            return false;
        }
        let Some((begin, end)) = self.scope_re.as_ref().and_then(|re| parse_scope(re, scope)) else {
            debug!("Unrecognised scope {scope:?} on {}", record.symbol());
            return false;
        };
        region.begin >= begin && region.end <= end
    }

    fn type_rank(&self, record: &TagRecord) -> f64 {
        if self.preferred_kinds.contains(record.kind()) {
            RANK_MATCH_TYPE
        } else {
            0.0
        }
    }

    fn same_file_rank(&self, rel_path: &str) -> f64 {
        if !self.eq_filename(rel_path) {
            return 0.0;
        }
        let chain = &self.context.receiver_chain;
        let is_this = chain.len() == 1
            && self
                .this_re
                .as_ref()
                .is_some_and(|re| re.is_match(&chain[0]));
        if is_this {
            RANK_EQ_FILENAME * 2.0
        } else {
            RANK_EQ_FILENAME
        }
    }

    fn path_rank(&self, rel_path: &str) -> f64 {
        let chain = &self.context.receiver_chain;
        let Some(last_part) = chain.last() else {
            return 0.0;
        };
        let segments = path_segments(rel_path);

        let mut rank = 0.0;
        if segments
            .last()
            .is_some_and(|segment| segment.to_lowercase() == last_part.to_lowercase())
        {
            rank += RANK_EXACT_MATCH_RIGHTMOST_PART;
        }
        rank + PathGramWeights::new(&segments).score(&self.receiver_grams)
    }

    /// Total score of one candidate.
    pub fn score(&self, record: &TagRecord) -> f64 {
        let rel_path = record
            .tag_path()
            .first()
            .map_or(record.filename(), String::as_str);
        self.type_rank(record) + self.same_file_rank(rel_path) + self.path_rank(rel_path)
    }

    /// Narrow `candidates` by scope and definition filters, then order them by
    /// descending score. Equal scores keep their input order.
    pub fn sort_tags<T: AsRef<TagRecord>>(&self, candidates: Vec<T>) -> Vec<T> {
        let (in_scope, no_scope) = self.scope_filter(candidates);
        let pool = if self.context.receiver_chain.is_empty() && !in_scope.is_empty() {
            in_scope
        } else {
            no_scope
        };

        let mut scored: Vec<(f64, T)> = pool
            .into_iter()
            .filter(|candidate| self.context.definition_filters.passes(candidate.as_ref()))
            .map(|candidate| (self.score(candidate.as_ref()), candidate))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().map(|(_, candidate)| candidate).collect()
    }
}

/// Rank `candidates` for the reference described by `context`.
pub fn rank_and_filter<T: AsRef<TagRecord>>(candidates: Vec<T>, context: RankContext) -> Vec<T> {
    RankManager::new(context).sort_tags(candidates)
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Directory and file-stem segments of a tag's relative path.
fn path_segments(rel_path: &str) -> Vec<String> {
    let trimmed = rel_path.trim_start_matches(['.', '/', '\\']);
    let mut segments: Vec<String> = trimmed
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(last) = segments.last_mut()
        && let Some(dot) = last.rfind('.')
        && dot > 0
    {
        last.truncate(dot);
    }
    segments
}

/// Kinds implied by the reference line, from the language's `reference_types`.
fn preferred_kinds(context: &RankContext) -> HashSet<String> {
    let Some(syntax) = &context.syntax else {
        return HashSet::new();
    };
    let symbol = regex::escape(&context.symbol);
    let mut kinds = HashSet::new();
    for (pattern, types) in &syntax.reference_types {
        let pattern = pattern.replace(SYMBOL_PLACEHOLDER, &symbol);
        match Regex::new(&pattern) {
            Ok(regex) if regex.is_match(&context.symbol_line) => {
                kinds.extend(types.iter().cloned());
            }
            Ok(_) => {}
            Err(err) => warn!("Skipping reference type {pattern:?}: {err}"),
        }
    }
    kinds
}

fn this_regex(syntax: Option<&LanguageSyntax>) -> Option<Regex> {
    let member_exp = syntax?.member_exp.as_ref()?;
    if member_exp.this().is_empty() {
        warn!("Language has member_exp rules but no 'this' expressions");
        return None;
    }
    match compile_alternation(member_exp.this(), Anchor::Start, true) {
        Ok(regex) => regex,
        Err(err) => {
            warn!("{err}");
            None
        }
    }
}

/// `(begin, end)` of a 1-based `line:col-line:col` scope, as zero-based positions.
fn parse_scope(scope_re: &Regex, scope: &str) -> Option<(TextPosition, TextPosition)> {
    let caps = scope_re.captures(scope)?;
    let number = |index: usize| -> Option<usize> {
        caps.get(index)?
            .as_str()
            .parse::<usize>()
            .ok()
            .map(|n| n.saturating_sub(1))
    };
    Some((
        TextPosition::new(number(1)?, number(2)?),
        TextPosition::new(number(3)?, number(4)?),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::MemberExpSyntax;
    use ctagnav_tag_store::TagFilter;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn record(line: &str) -> TagRecord {
        TagRecord::parse(line).expect("valid tag line")
    }

    fn files(records: &[TagRecord]) -> Vec<&str> {
        records.iter().map(TagRecord::filename).collect()
    }

    fn java() -> LanguageSyntax {
        LanguageSyntax {
            inherit: None,
            member_exp: Some(MemberExpSyntax {
                stop: Some(vec![r"\s".to_string()]),
                splitters: Some(vec![r"\.".to_string()]),
                this: Some(vec!["this".to_string()]),
                ..Default::default()
            }),
            reference_types: BTreeMap::from([
                (r"\bnew\s+__symbol__".to_string(), vec!["c".to_string()]),
                (r"__symbol__\(".to_string(), vec!["m".to_string(), "f".to_string()]),
            ]),
        }
    }

    #[test]
    fn test_same_file_definition_ranks_first() {
        let candidates = vec![
            record("getSum\tHelpers.java\t/^\tpublic int getSum(int a, int b) {$/;\"\tm\tclass:Helpers"),
            record("getSum\tDemoClass.java\t/^\tprivate int getSum(int a, int b) {$/;\"\tm\tclass:DemoClass"),
        ];
        let context = RankContext::new("getSum", "\t\tSystem.out.printf(\"Sum %d\\n\", demo.getSum(5,6));")
            .with_receiver_chain(vec!["demo".to_string()])
            .with_file_name("/home/user/project/DemoClass.java")
            .with_syntax(Some(java()));

        let ranked = rank_and_filter(candidates, context);
        assert_eq!(files(&ranked), vec!["DemoClass.java", "Helpers.java"]);
    }

    #[test]
    fn test_equal_scores_keep_input_order() {
        let candidates = vec![
            record("run\tb/one.py\t1;\"\tf"),
            record("run\ta/two.py\t2;\"\tf"),
            record("run\tc/three.py\t3;\"\tf"),
        ];
        let ranked = rank_and_filter(candidates, RankContext::new("run", "run()"));
        assert_eq!(files(&ranked), vec!["b/one.py", "a/two.py", "c/three.py"]);
    }

    #[test]
    fn test_type_match_prefers_kind() {
        let candidates = vec![
            record("Point\tgeom.java\t1;\"\tm"),
            record("Point\tgeom.java\t2;\"\tc"),
        ];
        let context = RankContext::new("Point", "Point[] grid = new Point[4];").with_syntax(Some(java()));
        let ranked = rank_and_filter(candidates, context);
        assert_eq!(ranked[0].kind(), "c");
    }

    #[test]
    fn test_symbol_is_escaped_in_reference_types() {
        let context = RankContext::new("a+b", "x = new a+b").with_syntax(Some(java()));
        let manager = RankManager::new(context);
        assert_eq!(manager.score(&record("a+b\tx.java\t1;\"\tc")), RANK_MATCH_TYPE);
    }

    #[test]
    fn test_this_receiver_doubles_same_file_bonus() {
        let context = RankContext::new("mtd", "this.mtd()")
            .with_receiver_chain(vec!["this".to_string()])
            .with_file_name("/src/app/Widget.java")
            .with_syntax(Some(java()));
        let manager = RankManager::new(context);
        assert_eq!(manager.same_file_rank("app/Widget.java"), 20.0);
        assert_eq!(manager.same_file_rank("./app/Widget.java"), 20.0);
        assert_eq!(manager.same_file_rank("other/Widget2.java"), 0.0);
    }

    #[test]
    fn test_path_rank_for_receiver() {
        let context = RankContext::new("fetch", "youtube.fetch()")
            .with_receiver_chain(vec!["youtube".to_string()]);
        let manager = RankManager::new(context);
        // exact last segment (20) + you, out, utu, tub, ube at weight 3
        assert_eq!(manager.path_rank("a/b/YouTube.js"), 35.0);
        assert_eq!(manager.path_rank("a/b/cart.js"), 0.0);

        let fuzzy = RankManager::new(
            RankContext::new("fetch", "vidtube.fetch()").with_receiver_chain(vec!["vidtube".to_string()]),
        );
        let ranked = fuzzy.sort_tags(vec![
            record("fetch\tlib/cart.js\t1;\"\tf"),
            record("fetch\tgoogle/video/youtube.js\t1;\"\tf"),
        ]);
        assert_eq!(files(&ranked), vec!["google/video/youtube.js", "lib/cart.js"]);
    }

    #[test]
    fn test_local_scope_hides_globals_for_bare_identifier() {
        let candidates = vec![
            record("count\tmain.js\t1;\"\tv"),
            record("count\tmain.js\t12;\"\tv\tscope:10:1-20:2"),
            record("count\tmain.js\t40;\"\tv\tscope:30:1-50:2"),
        ];
        let at = |line: usize| {
            RankContext::new("count", "return count;")
                .with_file_name("/repo/main.js")
                .with_region(CursorRegion::caret(TextPosition::new(line, 4)))
        };

        let ranked = rank_and_filter(candidates.clone(), at(14));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].field("scope"), Some("10:1-20:2"));

        // Outside every local scope: scoped candidates fall back with the globals.
        let ranked = rank_and_filter(candidates.clone(), at(60));
        assert_eq!(ranked.len(), 3);

        // A receiver means a member, never a local.
        let ranked = rank_and_filter(
            candidates,
            at(14).with_receiver_chain(vec!["obj".to_string()]),
        );
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.field("scope") != Some("10:1-20:2")));
    }

    #[test]
    fn test_definition_filters_apply_after_scope() {
        let candidates = vec![
            record("get\tA.java\t3;\"\tm\taccess:private"),
            record("get\tB.java\t7;\"\tm\taccess:public"),
        ];
        let context = RankContext::new("get", "x.get()")
            .with_definition_filters(FilterSet::new(vec![TagFilter::compile([("access", "private")])]));
        let ranked = rank_and_filter(candidates, context);
        assert_eq!(files(&ranked), vec!["B.java"]);
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(path_segments("./src/pkg/mod.py"), vec!["src", "pkg", "mod"]);
        assert_eq!(path_segments(".\\a_folder\\DemoClass.java"), vec!["a_folder", "DemoClass"]);
        assert_eq!(path_segments("Makefile"), vec!["Makefile"]);
    }

    #[test]
    fn test_eq_filename_without_reference_file() {
        let manager = RankManager::new(RankContext::new("x", "x"));
        assert!(!manager.eq_filename("a.py"));
        let manager = RankManager::new(RankContext::new("x", "x").with_file_name("/a/b.py"));
        assert!(!manager.eq_filename("."));
        assert!(manager.eq_filename("B.PY"));
    }
}
