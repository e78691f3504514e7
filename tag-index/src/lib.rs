//! # Tag Index
//!
//! Everything between an editor and the tag files of a project.
//!
//! ```text
//! TagsConfig ──> TagSession ──┬─ locate: tag file above the current file + search paths
//!                             ├─ goto / search definition ──> tag-store lookup ──> tag-rank
//!                             ├─ show symbols (memoised in QueryCache)
//!                             ├─ completions (memoised per tag file)
//!                             └─ rebuild ──> BuildGuard ──> ctags ──> resort ──> invalidate caches
//! ```

pub mod cache;
pub mod config;
pub mod ctags_cmd;
pub mod error;
pub mod format;
pub mod guard;
pub mod language;
pub mod locate;
pub mod session;
pub mod verify;

pub use cache::QueryCache;
pub use config::CommandLine;
pub use config::ExtraTagPath;
pub use config::TagsConfig;
pub use ctags_cmd::BuildOptions;
pub use ctags_cmd::build_ctags;
pub use error::IndexError;
pub use error::Result;
pub use format::format_for_quick_open;
pub use guard::BuildGuard;
pub use language::source_scope_for_path;
pub use session::BuildHandle;
pub use session::BuildReport;
pub use session::GotoRequest;
pub use session::QueryContext;
pub use session::SymbolScope;
pub use session::TagSession;
pub use verify::VerifyReport;
pub use verify::verify_tag_file;
