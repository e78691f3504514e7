//! Long-lived query state for one editor or CLI process.
//!
//! A [`TagSession`] owns the configuration, the memoised symbol listings and
//! completion lists, and the build guard. Lookups are synchronous and read
//! the memory-mapped tag files directly; rebuilds run on the Tokio runtime
//! and invalidate the caches of the directories they touch.

use crate::cache::QueryCache;
use crate::config::TagsConfig;
use crate::ctags_cmd::BuildOptions;
use crate::ctags_cmd::build_ctags;
use crate::error::IndexError;
use crate::error::Result;
use crate::guard::BuildGuard;
use crate::language::source_scope_for_path;
use crate::locate::alternate_tags_paths;
use crate::locate::current_file_suffix;
use crate::locate::find_tags_relative_to;
use crate::locate::rel_path_to_source;
use ctagnav_tag_rank::CursorRegion;
use ctagnav_tag_rank::RankContext;
use ctagnav_tag_rank::TextPosition;
use ctagnav_tag_rank::extract_receiver_chain_with;
use ctagnav_tag_rank::rank_and_filter;
use ctagnav_tag_store::Column;
use ctagnav_tag_store::TagEntry;
use ctagnav_tag_store::TagFile;
use ctagnav_tag_store::TagStoreError;
use ctagnav_tag_store::TagsByKey;
use ctagnav_tag_store::parse_tag_lines;
use ctagnav_tag_store::record::is_header_line;
use ctagnav_tag_store::resort_tag_file;
use ctagnav_tag_store::sorted_by_file_path;
use ctagnav_tag_store::store::column_of;
use log::debug;
use log::info;
use log::warn;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

const ALL_SYMBOLS_KEY: &str = "__all__";

/// Where a query comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    /// Absolute path of the file the query is made from.
    pub file_name: Option<PathBuf>,
    /// Language scope name, e.g. `source.python`. Empty when unknown.
    pub source: String,
    /// Open project folders.
    pub folders: Vec<PathBuf>,
}

impl QueryContext {
    /// Context for `file`, with the language guessed from its extension.
    pub fn for_file(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let source = source_scope_for_path(&file).unwrap_or_default().to_string();
        Self {
            file_name: Some(file),
            source,
            folders: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_folders(mut self, folders: Vec<PathBuf>) -> Self {
        self.folders = folders;
        self
    }
}

/// A reference to jump from.
#[derive(Debug, Clone, PartialEq)]
pub struct GotoRequest {
    pub symbol: String,
    /// Full text of the line holding the reference.
    pub line: String,
    /// Byte offset of the symbol in `line`.
    pub symbol_start: usize,
    pub region: Option<CursorRegion>,
    pub context: QueryContext,
}

impl GotoRequest {
    /// The identifier under `position` (zero-based line, byte column) of
    /// `line`, or `None` if the cursor is not on one.
    pub fn at_cursor(line: &str, position: TextPosition, context: QueryContext) -> Option<Self> {
        let (start, end) = word_bounds(line, position.column)?;
        Some(Self {
            symbol: line[start..end].to_string(),
            line: line.to_string(),
            symbol_start: start,
            region: Some(CursorRegion::caret(position)),
            context,
        })
    }

    /// Text before the symbol, where the receiver chain is read from.
    pub fn line_prefix(&self) -> &str {
        self.line.get(..self.symbol_start).unwrap_or_default()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Byte range of the identifier touching `column`.
fn word_bounds(line: &str, column: usize) -> Option<(usize, usize)> {
    let column = column.min(line.len());
    if !line.is_char_boundary(column) {
        return None;
    }
    let start = line[..column]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word_char(*c))
        .last()
        .map_or(column, |(index, _)| index);
    let end = line[column..]
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map_or(line.len(), |(index, _)| column + index);
    (start < end).then_some((start, end))
}

/// Which symbols [`TagSession::show_symbols`] lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// The current file
    File,
    /// Every file in the tag file
    Project,
    /// Every file with the current file's extension
    Language,
}

/// Files produced by a finished rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub tag_files: Vec<PathBuf>,
}

/// A rebuild running in the background.
#[derive(Debug)]
pub struct BuildHandle {
    handle: JoinHandle<Result<BuildReport>>,
}

impl BuildHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<BuildReport> {
        self.handle.await?
    }
}

/// Tag lookups, symbol listings, completions and rebuilds over one
/// configuration.
#[derive(Debug)]
pub struct TagSession {
    config: Arc<TagsConfig>,
    symbols: Arc<QueryCache<TagsByKey>>,
    completions: Arc<QueryCache<Vec<String>>>,
    guard: BuildGuard,
}

impl TagSession {
    pub fn new(config: TagsConfig) -> Self {
        Self {
            config: Arc::new(config),
            symbols: Arc::new(QueryCache::default()),
            completions: Arc::new(QueryCache::default()),
            guard: BuildGuard::new(),
        }
    }

    pub fn config(&self) -> &TagsConfig {
        &self.config
    }

    pub fn is_building(&self) -> bool {
        self.guard.is_running()
    }

    /// The tag file serving `context`: the deepest one above the current
    /// file, else the first project folder holding one.
    pub fn locate_tags_file(&self, context: &QueryContext) -> Result<PathBuf> {
        let tag_file = &self.config.tag_file;
        let found = match &context.file_name {
            Some(file) => find_tags_relative_to(file, tag_file),
            None => None,
        }
        .or_else(|| {
            context
                .folders
                .iter()
                .map(|folder| folder.join(tag_file))
                .find(|candidate| candidate.is_file())
        });

        found.ok_or_else(|| {
            let origin = context
                .file_name
                .clone()
                .or_else(|| context.folders.first().cloned())
                .unwrap_or_default();
            IndexError::NotFound(origin.join(tag_file))
        })
    }

    /// Ranked definitions of the symbol referenced by `request`.
    pub fn goto_definition(&self, request: &GotoRequest) -> Result<Vec<TagEntry>> {
        let context = &request.context;
        let syntax = self.config.language_syntax.resolve(&context.source);
        let receiver_chain: Vec<String> = extract_receiver_chain_with(request.line_prefix(), syntax.as_ref())
            .into_iter()
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect();
        debug!("Receiver chain for {:?}: {receiver_chain:?}", request.symbol);

        let mut rank_context = self
            .rank_context(&request.symbol, &request.line, context)
            .with_receiver_chain(receiver_chain)
            .with_syntax(syntax);
        if let Some(region) = request.region {
            rank_context = rank_context.with_region(region);
        }

        let candidates = self.lookup_definitions(&request.symbol, context)?;
        Ok(rank_and_filter(candidates, rank_context))
    }

    /// Definitions of `symbol` without a reference site.
    pub fn search_definition(&self, symbol: &str, context: &QueryContext) -> Result<Vec<TagEntry>> {
        let candidates = self.lookup_definitions(symbol, context)?;
        Ok(rank_and_filter(candidates, self.rank_context(symbol, "", context)))
    }

    fn rank_context(&self, symbol: &str, line: &str, context: &QueryContext) -> RankContext {
        let mut rank_context = RankContext::new(symbol, line)
            .with_definition_filters(self.config.definition_filters_for(&context.source))
            .with_scope_re(self.config.scope_re.clone());
        if let Some(file) = &context.file_name {
            rank_context = rank_context.with_file_name(file.clone());
        }
        rank_context
    }

    /// Tags for `symbol` from the first search path that has any.
    fn lookup_definitions(&self, symbol: &str, context: &QueryContext) -> Result<Vec<TagEntry>> {
        let tags_file = self.locate_tags_file(context)?;
        let filters = self.config.filters_for(&context.source);
        let search_paths = alternate_tags_paths(&tags_file, &self.config, &context.source, &context.folders);

        for path in &search_paths {
            let Some(file) = open_optional(path, Column::Symbol)? else {
                continue;
            };
            let found: Vec<TagEntry> = file
                .get_tags_dict(&[symbol], &filters)
                .into_values()
                .flatten()
                .collect();
            if !found.is_empty() {
                debug!("{} definitions of {symbol:?} in {}", found.len(), path.display());
                return Ok(found);
            }
        }
        debug!("No definitions of {symbol:?} in {} tag files", search_paths.len());
        Ok(Vec::new())
    }

    /// Symbols of the current file, the whole project, or every file of the
    /// current language, sorted by tag path.
    pub fn show_symbols(&self, context: &QueryContext, scope: SymbolScope) -> Result<Vec<TagEntry>> {
        let tags_file = self.locate_tags_file(context)?;
        let key = match (scope, &context.file_name) {
            (SymbolScope::Project, _) => ALL_SYMBOLS_KEY.to_string(),
            (SymbolScope::File, Some(file)) => rel_path_to_source(file, &tags_file),
            (SymbolScope::Language, Some(file)) => current_file_suffix(file),
            (_, None) => return Ok(Vec::new()),
        };
        if key.is_empty() {
            return Ok(Vec::new());
        }

        let tag_dir = tags_file.parent().unwrap_or_else(|| Path::new(""));
        let filters = self.config.filters_for(&context.source);
        let cache_key = format!("{key}\t{}", context.source);
        let grouped = self.symbols.get_or_try_insert(tag_dir, &cache_key, || {
            let sorted = by_file_companion(&tags_file)?;
            let file = TagFile::open(&sorted, Column::Filename)?;
            Ok::<_, IndexError>(match scope {
                SymbolScope::Project => file.get_tags_dict(&[], &filters),
                SymbolScope::File => file.get_tags_dict(&[key.as_str()], &filters),
                SymbolScope::Language => file.get_tags_dict_by_suffix(&key, &filters),
            })
        })?;

        let mut entries: Vec<TagEntry> = grouped.values().flatten().cloned().collect();
        entries.sort_by(|a, b| a.record.tag_path().cmp(b.record.tag_path()));
        Ok(entries)
    }

    /// Tags whose symbol starts with `prefix`, in tag file order.
    pub fn symbols_with_prefix(&self, prefix: &str, context: &QueryContext) -> Result<Vec<TagEntry>> {
        let tags_file = self.locate_tags_file(context)?;
        let Some(file) = open_optional(&tags_file, Column::Symbol)? else {
            return Ok(Vec::new());
        };
        let filters = self.config.filters_for(&context.source);
        let grouped = parse_tag_lines(file.lookup_prefix([prefix]), &filters, "symbol", file.dir());
        Ok(grouped.into_values().flatten().collect())
    }

    /// Distinct symbol names starting with `prefix`, ignoring case, sorted.
    ///
    /// Empty when completion is disabled or the tag file is larger than
    /// `autocomplete_max_bytes`.
    pub fn completions(&self, prefix: &str, context: &QueryContext) -> Result<Vec<String>> {
        if !self.config.autocomplete {
            return Ok(Vec::new());
        }
        let tags_file = self.locate_tags_file(context)?;
        let size = fs::metadata(&tags_file)?.len();
        if size > self.config.autocomplete_max_bytes {
            info!(
                "Skipping completions: {} is {size} bytes, limit {}",
                tags_file.display(),
                self.config.autocomplete_max_bytes
            );
            return Ok(Vec::new());
        }

        let tag_dir = tags_file.parent().unwrap_or_else(|| Path::new(""));
        let file_key = tags_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let symbols = self
            .completions
            .get_or_try_insert(tag_dir, &file_key, || distinct_symbols(&tags_file))?;

        let prefix = prefix.to_lowercase();
        Ok(symbols
            .iter()
            .filter(|symbol| symbol.to_lowercase().starts_with(&prefix))
            .cloned()
            .collect())
    }

    /// Regenerate the tags of each of `paths`, in order, in the background.
    ///
    /// Rejected with [`IndexError::ConcurrentBuildRejected`] while another
    /// rebuild is running. The first failure stops the remaining paths.
    /// Must be called from within a Tokio runtime.
    pub fn rebuild(&self, paths: Vec<PathBuf>) -> Result<BuildHandle> {
        let ticket = self.guard.try_start().ok_or(IndexError::ConcurrentBuildRejected)?;
        let options = BuildOptions::from_config(&self.config);
        let symbols = Arc::clone(&self.symbols);
        let completions = Arc::clone(&self.completions);

        let handle = tokio::spawn(async move {
            let _ticket = ticket;
            let mut report = BuildReport::default();
            for path in paths {
                let tag_file = build_ctags(&options, &path).await?;
                if let Some(dir) = tag_file.parent() {
                    let dropped = symbols.invalidate(dir) + completions.invalidate(dir);
                    debug!("Invalidated {dropped} cached queries under {}", dir.display());
                }
                report.tag_files.push(tag_file);
            }
            Ok::<_, IndexError>(report)
        });
        Ok(BuildHandle { handle })
    }
}

/// Open a tag file, treating a missing file as absent.
fn open_optional(path: &Path, column: Column) -> Result<Option<TagFile>> {
    match TagFile::open(path, column) {
        Ok(file) => Ok(Some(file)),
        Err(TagStoreError::NotFound(missing)) => {
            debug!("Tag file {} is gone", missing.display());
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// The `_sorted_by_file` companion of `tags_file`, created if missing.
fn by_file_companion(tags_file: &Path) -> Result<PathBuf> {
    let sorted = sorted_by_file_path(tags_file);
    if sorted.is_file() {
        return Ok(sorted);
    }
    warn!("{} is missing, sorting {} now", sorted.display(), tags_file.display());
    Ok(resort_tag_file(tags_file)?)
}

fn distinct_symbols(tags_file: &Path) -> Result<Vec<String>> {
    let file = TagFile::open(tags_file, Column::Symbol)?;
    let symbols: BTreeSet<String> = file
        .scan_all()
        .filter(|line| !is_header_line(line.bytes()))
        .map(|line| String::from_utf8_lossy(column_of(line.bytes(), Column::Symbol.index())).into_owned())
        .filter(|symbol| !symbol.is_empty())
        .collect();
    Ok(symbols.into_iter().collect())
}
