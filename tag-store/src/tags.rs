use crate::filter::FilterSet;
use crate::record::TagRecord;
use crate::record::is_header_line;
use indexmap::IndexMap;
use log::debug;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

/// A parsed tag together with the directory of the tag file it came from.
///
/// Filenames inside a tag file are relative to that directory.
#[derive(Debug, Clone, PartialEq)]
pub struct TagEntry {
    pub record: TagRecord,
    pub root_dir: Arc<Path>,
}

impl TagEntry {
    pub fn new(record: TagRecord, root_dir: Arc<Path>) -> Self {
        Self { record, root_dir }
    }

    /// Absolute location of the tagged file.
    pub fn absolute_path(&self) -> PathBuf {
        self.root_dir.join(self.record.filename())
    }
}

impl AsRef<TagRecord> for TagEntry {
    fn as_ref(&self) -> &TagRecord {
        &self.record
    }
}

/// Tags grouped by the value of one key, in first-seen order.
pub type TagsByKey = IndexMap<String, Vec<TagEntry>>;

/// Parse raw tag lines, drop rejected or filtered records, and group the
/// rest by `order_by` (`symbol`, `filename`, or any field).
pub fn parse_tag_lines<I>(lines: I, filters: &FilterSet, order_by: &str, root_dir: &Path) -> TagsByKey
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let root_dir: Arc<Path> = Arc::from(root_dir);
    let mut grouped = TagsByKey::new();

    for line in lines {
        let bytes = line.as_ref();
        if bytes.is_empty() || is_header_line(bytes) {
            continue;
        }
        let text = String::from_utf8_lossy(bytes);
        let record = match TagRecord::parse(&text) {
            Ok(record) => record,
            Err(err) => {
                debug!("Skipping tag line {text:?}: {err}");
                continue;
            }
        };
        if !filters.passes(&record) {
            continue;
        }
        let Some(key) = record.get(order_by).map(str::to_string) else {
            continue;
        };
        grouped
            .entry(key)
            .or_default()
            .push(TagEntry::new(record, Arc::clone(&root_dir)));
    }

    grouped
}
