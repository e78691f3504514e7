use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use ctagnav_tag_index::GotoRequest;
use ctagnav_tag_index::QueryContext;
use ctagnav_tag_index::SymbolScope;
use ctagnav_tag_index::TagSession;
use ctagnav_tag_index::TagsConfig;
use ctagnav_tag_index::format_for_quick_open;
use ctagnav_tag_index::verify_tag_file;
use ctagnav_tag_rank::TextPosition;
use ctagnav_tag_store::Column;
use ctagnav_tag_store::TagEntry;
use owo_colors::OwoColorize;
use serde_json::Value;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ctagnav", version, about = "Jump to definitions through ctags tag files")]
pub struct Cli {
    /// JSON settings file (defaults to built-in settings)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: TagsCommand,
}

#[derive(Debug, Subcommand)]
pub enum TagsCommand {
    /// Generate the tag file (and its by-file companion) for files or directories
    Build(BuildArgs),

    /// Rank the definitions of the identifier at a cursor position
    Goto(GotoArgs),

    /// Find definitions of a symbol by name
    Search(SearchArgs),

    /// List the symbols of a file, the project, or a language
    Symbols(SymbolsArgs),

    /// Complete a symbol prefix
    Complete(CompleteArgs),

    /// Check that every line of a tag file parses and the file is sorted
    Verify(VerifyArgs),
}

/// Where the query is made from.
#[derive(Debug, Clone, Default, Args)]
pub struct ContextArgs {
    /// Project folder; repeat for several
    #[arg(long = "folder", value_name = "DIR")]
    pub folders: Vec<PathBuf>,

    /// Language scope name, e.g. source.python (guessed from the file extension otherwise)
    #[arg(long, value_name = "SCOPE")]
    pub language: Option<String>,
}

impl ContextArgs {
    fn query_context(&self, file: Option<&Path>) -> Result<QueryContext> {
        let mut context = match file {
            Some(file) => QueryContext::for_file(absolute(file)?),
            None => QueryContext::default(),
        };
        if let Some(language) = &self.language {
            context = context.with_source(language.clone());
        }
        let folders = self
            .folders
            .iter()
            .map(|folder| absolute(folder))
            .collect::<Result<Vec<_>>>()?;
        if folders.is_empty() && context.file_name.is_none() {
            context.folders = vec![std::env::current_dir().context("Failed to get current directory")?];
        } else {
            context.folders = folders;
        }
        Ok(context)
    }
}

#[derive(Debug, Parser)]
pub struct BuildArgs {
    /// Files or directories to build tags for (defaults to current directory)
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct GotoArgs {
    /// File containing the reference
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,

    /// 1-based line of the reference
    #[arg(long)]
    pub line: usize,

    /// 1-based byte column inside the identifier
    #[arg(long)]
    pub column: usize,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    #[arg(value_name = "SYMBOL")]
    pub symbol: String,

    /// File the search is made from; prefers definitions in it
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Match every symbol starting with SYMBOL instead
    #[arg(long)]
    pub prefix: bool,

    #[command(flatten)]
    pub context: ContextArgs,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    File,
    Project,
    Language,
}

impl From<ScopeArg> for SymbolScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::File => SymbolScope::File,
            ScopeArg::Project => SymbolScope::Project,
            ScopeArg::Language => SymbolScope::Language,
        }
    }
}

#[derive(Debug, Parser)]
pub struct SymbolsArgs {
    /// Current file
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ScopeArg::File)]
    pub scope: ScopeArg,

    #[command(flatten)]
    pub context: ContextArgs,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CompleteArgs {
    #[arg(value_name = "PREFIX", default_value = "")]
    pub prefix: String,

    /// Current file
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub context: ContextArgs,
}

#[derive(Debug, Parser)]
pub struct VerifyArgs {
    #[arg(value_name = "TAG_FILE")]
    pub tag_file: PathBuf,

    /// The file is sorted by filename (a `_sorted_by_file` companion)
    #[arg(long)]
    pub by_file: bool,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => TagsConfig::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => TagsConfig::default(),
        };

        match self.command {
            TagsCommand::Build(args) => run_build(config, args).await,
            TagsCommand::Goto(args) => run_goto(config, args),
            TagsCommand::Search(args) => run_search(config, args),
            TagsCommand::Symbols(args) => run_symbols(config, args),
            TagsCommand::Complete(args) => run_complete(config, args),
            TagsCommand::Verify(args) => run_verify(args),
        }
    }
}

async fn run_build(config: TagsConfig, args: BuildArgs) -> Result<()> {
    let paths = if args.paths.is_empty() {
        vec![std::env::current_dir().context("Failed to get current directory")?]
    } else {
        args.paths
            .iter()
            .map(|path| absolute(path))
            .collect::<Result<Vec<_>>>()?
    };

    let session = TagSession::new(config);
    let report = session
        .rebuild(paths)?
        .wait()
        .await
        .context("Tag build failed")?;
    for tag_file in &report.tag_files {
        println!("{} Built {}", "✓".bright_green(), tag_file.display());
    }
    Ok(())
}

fn run_goto(config: TagsConfig, args: GotoArgs) -> Result<()> {
    let context = args.context.query_context(Some(&args.file))?;
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let line_index = args.line.saturating_sub(1);
    let line = text
        .lines()
        .nth(line_index)
        .with_context(|| format!("{} has no line {}", args.file.display(), args.line))?;
    let position = TextPosition::new(line_index, args.column.saturating_sub(1));
    let Some(request) = GotoRequest::at_cursor(line, position, context) else {
        anyhow::bail!(
            "No identifier at {}:{}:{}",
            args.file.display(),
            args.line,
            args.column
        );
    };

    let session = TagSession::new(config);
    let ranked = session.goto_definition(&request)?;
    print_entries(&ranked, args.json, &format!("definitions of {}", request.symbol))
}

fn run_search(config: TagsConfig, args: SearchArgs) -> Result<()> {
    let context = args.context.query_context(args.file.as_deref())?;
    let session = TagSession::new(config);
    let found = if args.prefix {
        session.symbols_with_prefix(&args.symbol, &context)?
    } else {
        session.search_definition(&args.symbol, &context)?
    };
    print_entries(&found, args.json, &format!("definitions of {}", args.symbol))
}

fn run_symbols(config: TagsConfig, args: SymbolsArgs) -> Result<()> {
    let context = args.context.query_context(args.file.as_deref())?;
    let session = TagSession::new(config);
    let entries = session.show_symbols(&context, args.scope.into())?;
    print_entries(&entries, args.json, "symbols")
}

fn run_complete(mut config: TagsConfig, args: CompleteArgs) -> Result<()> {
    config.autocomplete = true;
    let context = args.context.query_context(args.file.as_deref())?;
    let session = TagSession::new(config);
    for symbol in session.completions(&args.prefix, &context)? {
        println!("{symbol}");
    }
    Ok(())
}

fn run_verify(args: VerifyArgs) -> Result<()> {
    let column = if args.by_file {
        Column::Filename
    } else {
        Column::Symbol
    };
    let report = verify_tag_file(&args.tag_file, column)
        .with_context(|| format!("Failed to read {}", args.tag_file.display()))?;

    println!("{} {}", "▶".bright_blue(), args.tag_file.display());
    println!("  Parsed: {}", report.parsed.bright_cyan());
    println!("  Headers: {}", report.headers.bright_cyan());
    println!("  Blank: {}", report.blank);
    println!("  Malformed: {}", report.malformed.len());
    for (line_no, err) in &report.malformed {
        println!("    line {line_no}: {err}");
    }
    if let Some(line_no) = report.first_unsorted {
        println!("  {} Out of order at line {line_no}", "✗".bright_red());
    }

    if !report.is_clean() {
        anyhow::bail!("{} failed verification", args.tag_file.display());
    }
    println!("{} OK", "✓".bright_green());
    Ok(())
}

fn print_entries(entries: &[TagEntry], as_json: bool, what: &str) -> Result<()> {
    if as_json {
        let values: Vec<Value> = entries.iter().map(entry_json).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }
    if entries.is_empty() {
        eprintln!("{} No {what} found", "✗".bright_red());
        return Ok(());
    }
    for entry in entries {
        println!("{}", entry_row(entry));
    }
    Ok(())
}

/// `label<TAB>path<TAB>location`
fn entry_row(entry: &TagEntry) -> String {
    let columns = format_for_quick_open(&entry.record, false);
    let label = columns.first().map_or("", String::as_str);
    let location = columns.last().map_or("", String::as_str);
    format!("{label}\t{}\t{location}", entry.absolute_path().display())
}

fn entry_json(entry: &TagEntry) -> Value {
    let record = &entry.record;
    json!({
        "symbol": record.symbol(),
        "kind": record.kind(),
        "path": entry.absolute_path(),
        "ex_command": record.ex_command().as_str(),
        "line": record.ex_command().line_number(),
        "fields": record.fields(),
    })
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path {}", path.display()))
}
