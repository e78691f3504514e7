//! # Tag Store
//!
//! Read access to ctags files.
//!
//! - [`record`] parses one tag line into a [`TagRecord`]
//! - [`path`] builds the hierarchical tag path used for display and ranking
//! - [`store`] binary-searches a sorted, memory-mapped tag file and writes
//!   the filename-sorted companion file
//! - [`filter`] drops records by `{field: regex}` rules
//! - [`tags`] groups parsed records by symbol, filename or field

pub mod error;
pub mod filter;
pub mod path;
pub mod record;
pub mod store;
pub mod tags;

pub use error::ParseError;
pub use error::Result;
pub use error::TagStoreError;
pub use filter::FilterSet;
pub use filter::TagFilter;
pub use record::ExCommand;
pub use record::SearchPattern;
pub use record::TagRecord;
pub use store::Column;
pub use store::MatchMode;
pub use store::TagFile;
pub use store::TagLine;
pub use store::resort_tag_file;
pub use store::search_paths_path;
pub use store::sorted_by_file_path;
pub use tags::TagEntry;
pub use tags::TagsByKey;
pub use tags::parse_tag_lines;
