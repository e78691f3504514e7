//! Binary search over a sorted, memory-mapped ctags file.
//!
//! Lines are compared byte-wise on one tab-separated column. The primary tag
//! file is sorted on the symbol column; the `_sorted_by_file` companion
//! written by [`TagFile::resort_by_filename`] is sorted on the filename
//! column.

use crate::error::Result;
use crate::error::TagStoreError;
use crate::filter::FilterSet;
use crate::tags::TagsByKey;
use crate::tags::parse_tag_lines;
use log::debug;
use log::info;
use memchr::memchr;
use memmap2::Mmap;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Suffix of the companion file sorted by filename.
pub const SORTED_BY_FILE_SUFFIX: &str = "_sorted_by_file";

/// Suffix of the optional sidecar listing extra tag files, one per line.
pub const SEARCH_PATHS_SUFFIX: &str = "_search_paths";

/// `<tag_file>_sorted_by_file`
pub fn sorted_by_file_path(tag_file: &Path) -> PathBuf {
    with_suffix(tag_file, SORTED_BY_FILE_SUFFIX)
}

/// `<tag_file>_search_paths`
pub fn search_paths_path(tag_file: &Path) -> PathBuf {
    with_suffix(tag_file, SEARCH_PATHS_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Which column a tag file is sorted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Symbol = 0,
    Filename = 1,
}

impl Column {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// How a search key is compared with the sorted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    Prefix,
}

impl MatchMode {
    fn accepts(self, value: &[u8], key: &[u8]) -> bool {
        match self {
            MatchMode::Exact => value == key,
            MatchMode::Prefix => value.starts_with(key),
        }
    }
}

/// Column `index` of a tab-separated line, or an empty slice.
pub fn column_of(line: &[u8], index: usize) -> &[u8] {
    line.split(|b| *b == b'\t').nth(index).unwrap_or(&[])
}

/// Drop leading `./` (or `.\`) components from a filename.
fn strip_dot_prefix(mut name: &[u8]) -> &[u8] {
    while let Some(rest) = name
        .strip_prefix(b"./")
        .or_else(|| name.strip_prefix(b".\\"))
    {
        name = rest;
    }
    name
}

/// One raw line borrowed from a [`TagFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagLine<'a>(&'a [u8]);

impl<'a> TagLine<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }

    pub fn text(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.0)
    }

    pub fn column(&self, column: Column) -> &'a [u8] {
        column_of(self.0, column.index())
    }
}

impl AsRef<[u8]> for TagLine<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0
    }
}

/// A sorted tag file, memory-mapped for the lifetime of the value.
#[derive(Debug)]
pub struct TagFile {
    path: PathBuf,
    column: Column,
    // Zero-length files cannot be mapped.
    map: Option<Mmap>,
}

impl TagFile {
    /// Open `path`, sorted on `column`.
    pub fn open(path: impl AsRef<Path>, column: Column) -> Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => TagStoreError::NotFound(path.to_path_buf()),
            _ => TagStoreError::Io(err),
        })?;
        if !metadata.is_file() {
            return Err(TagStoreError::NotFound(path.to_path_buf()));
        }

        let map = if metadata.len() == 0 {
            None
        } else {
            let file = File::open(path)?;
            // SAFETY: the map is read-only. Tag files are replaced by rename,
            // never rewritten in place, so an open map keeps seeing the old inode.
            Some(unsafe { Mmap::map(&file)? })
        };
        debug!("Opened tag file {} ({} bytes)", path.display(), metadata.len());

        Ok(Self {
            path: path.to_path_buf(),
            column,
            map,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the tag file lives in; tag filenames are relative to it.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn column(&self) -> Column {
        self.column
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Start of the first whole line at or after `offset`.
    ///
    /// `offset` itself when it follows a `\n` (or is 0), otherwise the byte
    /// after the next `\n`.
    pub fn next_line_start(&self, offset: usize) -> usize {
        let bytes = self.bytes();
        if offset >= bytes.len() {
            return bytes.len();
        }
        if offset == 0 || bytes[offset - 1] == b'\n' {
            return offset;
        }
        match memchr(b'\n', &bytes[offset..]) {
            Some(pos) => offset + pos + 1,
            None => bytes.len(),
        }
    }

    /// The line starting at `offset` (without its terminator) and the offset
    /// of the line after it. `None` at end of file.
    pub fn line_at_offset(&self, offset: usize) -> Option<(&[u8], usize)> {
        let bytes = self.bytes();
        if offset >= bytes.len() {
            return None;
        }
        let rest = &bytes[offset..];
        let (line, next) = match memchr(b'\n', rest) {
            Some(pos) => (&rest[..pos], offset + pos + 1),
            None => (rest, bytes.len()),
        };
        Some((line.strip_suffix(b"\r").unwrap_or(line), next))
    }

    /// Offset of the first line whose sort column is not less than `key`.
    fn lower_bound(&self, key: &[u8]) -> usize {
        let index = self.column.index();
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let less = self
                .line_at_offset(self.next_line_start(mid))
                .is_some_and(|(line, _)| column_of(line, index) < key);
            if less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        self.next_line_start(lo)
    }

    /// Every line, in file order.
    pub fn lines(&self) -> Lines<'_> {
        Lines {
            file: self,
            offset: 0,
        }
    }

    /// Lines whose sort column equals one of `keys`, grouped per key in the
    /// order the keys are given.
    pub fn lookup_exact<I, S>(&self, keys: I) -> Search<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search(MatchMode::Exact, keys)
    }

    /// Lines whose sort column starts with one of `keys`.
    pub fn lookup_prefix<I, S>(&self, keys: I) -> Search<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search(MatchMode::Prefix, keys)
    }

    pub fn search<I, S>(&self, mode: MatchMode, keys: I) -> Search<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Search {
            file: self,
            mode,
            keys: keys.into_iter().map(Into::into).collect::<Vec<_>>().into_iter(),
            current: None,
        }
    }

    /// Lines whose sort column ends with `suffix`. Linear scan.
    pub fn lookup_by_suffix<'a>(&'a self, suffix: &'a str) -> impl Iterator<Item = TagLine<'a>> {
        let index = self.column.index();
        self.lines()
            .filter(move |line| column_of(line.bytes(), index).ends_with(suffix.as_bytes()))
    }

    /// Every non-empty line. Linear scan.
    pub fn scan_all(&self) -> impl Iterator<Item = TagLine<'_>> {
        self.lines()
    }

    /// Parse and group the tags for `keys` by symbol. An empty `keys` slice
    /// means the whole file.
    pub fn get_tags_dict(&self, keys: &[&str], filters: &FilterSet) -> TagsByKey {
        self.get_tags_dict_by(keys, filters, "symbol")
    }

    /// Like [`TagFile::get_tags_dict`], grouped by `order_by`.
    pub fn get_tags_dict_by(&self, keys: &[&str], filters: &FilterSet, order_by: &str) -> TagsByKey {
        if keys.is_empty() {
            parse_tag_lines(self.scan_all(), filters, order_by, self.dir())
        } else {
            let keys = keys.iter().map(ToString::to_string);
            parse_tag_lines(self.lookup_exact(keys), filters, order_by, self.dir())
        }
    }

    /// Parse and group, by symbol, the tags whose sort column ends with `suffix`.
    pub fn get_tags_dict_by_suffix(&self, suffix: &str, filters: &FilterSet) -> TagsByKey {
        parse_tag_lines(self.lookup_by_suffix(suffix), filters, "symbol", self.dir())
    }

    /// Write a copy of this file sorted by filename to `output`.
    ///
    /// Leading `./` is stripped from every filename. Lines are grouped by
    /// filename in byte order and keep their original relative order inside
    /// a group, so the result is sorted on [`Column::Filename`]. The output
    /// is replaced atomically. Returns the number of lines written.
    pub fn resort_by_filename(&self, output: &Path) -> Result<usize> {
        let mut groups: BTreeMap<&[u8], Vec<&[u8]>> = BTreeMap::new();
        for line in self.lines() {
            let bytes = line.bytes();
            let filename = strip_dot_prefix(column_of(bytes, Column::Filename.index()));
            groups.entry(filename).or_default().push(bytes);
        }

        let dir = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        let mut written = 0;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for (filename, lines) in &groups {
                for line in lines {
                    write_with_filename(&mut writer, line, filename)?;
                    written += 1;
                }
            }
            writer.flush()?;
        }
        tmp.persist(output).map_err(|err| TagStoreError::Io(err.error))?;

        info!("Wrote {written} lines to {}", output.display());
        Ok(written)
    }
}

fn write_with_filename(writer: &mut impl Write, line: &[u8], filename: &[u8]) -> io::Result<()> {
    match memchr(b'\t', line) {
        Some(first) => {
            let rest = &line[first + 1..];
            let after = memchr(b'\t', rest).map_or(&[][..], |second| &rest[second..]);
            writer.write_all(&line[..=first])?;
            writer.write_all(filename)?;
            writer.write_all(after)?;
        }
        None => writer.write_all(line)?,
    }
    writer.write_all(b"\n")
}

/// Sort `tag_file` by filename into `<tag_file>_sorted_by_file`.
pub fn resort_tag_file(tag_file: &Path) -> Result<PathBuf> {
    let output = sorted_by_file_path(tag_file);
    TagFile::open(tag_file, Column::Symbol)?.resort_by_filename(&output)?;
    Ok(output)
}

/// Iterator over the non-empty lines of a [`TagFile`].
pub struct Lines<'a> {
    file: &'a TagFile,
    offset: usize,
}

impl<'a> Iterator for Lines<'a> {
    type Item = TagLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (line, next) = self.file.line_at_offset(self.offset)?;
            self.offset = next;
            if !line.is_empty() {
                return Some(TagLine(line));
            }
        }
    }
}

/// Lazy multi-key binary search, see [`TagFile::search`].
///
/// The run of matching lines for a key ends at the first non-matching or
/// empty line.
pub struct Search<'a> {
    file: &'a TagFile,
    mode: MatchMode,
    keys: std::vec::IntoIter<String>,
    current: Option<(String, usize)>,
}

impl<'a> Iterator for Search<'a> {
    type Item = TagLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.file.column.index();
        loop {
            if let Some((key, offset)) = &mut self.current {
                if let Some((line, next)) = self.file.line_at_offset(*offset)
                    && !line.is_empty()
                    && self.mode.accepts(column_of(line, index), key.as_bytes())
                {
                    *offset = next;
                    return Some(TagLine(line));
                }
                self.current = None;
            }
            let key = self.keys.next()?;
            let start = self.file.lower_bound(key.as_bytes());
            self.current = Some((key, start));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SORTED: &str = "\
!_TAG_FILE_FORMAT\t2\t/extended format/
!_TAG_FILE_SORTED\t1\t/0=unsorted, 1=sorted/
Bar\tb.py\t1;\"\tc
Foo\t./a.py\t/^class Foo:$/;\"\tc
Foo\tc.py\t3;\"\tv
FooBar\ta.py\t7;\"\tc
baz\tb.py\t9;\"\tf
";

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).expect("write tag file");
        path
    }

    fn symbols<'a>(lines: impl Iterator<Item = TagLine<'a>>) -> Vec<String> {
        lines
            .map(|line| String::from_utf8_lossy(line.column(Column::Symbol)).into_owned())
            .collect()
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let err = TagFile::open(dir.path().join("tags"), Column::Symbol).unwrap_err();
        assert!(matches!(err, TagStoreError::NotFound(_)));

        let err = TagFile::open(dir.path(), Column::Symbol).unwrap_err();
        assert!(matches!(err, TagStoreError::NotFound(_)));
    }

    #[test]
    fn test_exact_lookup() {
        let dir = TempDir::new().expect("tempdir");
        let file = TagFile::open(write(&dir, "tags", SORTED), Column::Symbol).expect("open");

        let files: Vec<_> = file
            .lookup_exact(["Foo"])
            .map(|line| line.text().into_owned())
            .map(|text| text.split('\t').nth(1).unwrap_or_default().to_string())
            .collect();
        assert_eq!(files, vec!["./a.py", "c.py"]);
        assert_eq!(symbols(file.lookup_exact(["Missing"])), Vec::<String>::new());
        assert_eq!(symbols(file.lookup_exact(["baz", "Bar"])), vec!["baz", "Bar"]);
    }

    #[test]
    fn test_first_and_last_lines_are_reachable() {
        let dir = TempDir::new().expect("tempdir");
        let file = TagFile::open(write(&dir, "tags", SORTED), Column::Symbol).expect("open");
        assert_eq!(symbols(file.lookup_exact(["!_TAG_FILE_FORMAT"])), vec!["!_TAG_FILE_FORMAT"]);
        assert_eq!(symbols(file.lookup_exact(["baz"])), vec!["baz"]);
    }

    #[test]
    fn test_prefix_lookup_is_case_sensitive() {
        let dir = TempDir::new().expect("tempdir");
        let file = TagFile::open(write(&dir, "tags", SORTED), Column::Symbol).expect("open");
        assert_eq!(symbols(file.lookup_prefix(["Foo"])), vec!["Foo", "Foo", "FooBar"]);
        assert_eq!(symbols(file.lookup_prefix(["foo"])), Vec::<String>::new());
    }

    #[test]
    fn test_suffix_lookup_scans_whole_file() {
        let dir = TempDir::new().expect("tempdir");
        let file = TagFile::open(write(&dir, "tags", SORTED), Column::Symbol).expect("open");
        assert_eq!(symbols(file.lookup_by_suffix("Bar")), vec!["Bar", "FooBar"]);
    }

    #[test]
    fn test_empty_file() {
        let dir = TempDir::new().expect("tempdir");
        let file = TagFile::open(write(&dir, "tags", ""), Column::Symbol).expect("open");
        assert!(file.is_empty());
        assert_eq!(file.lookup_exact(["a"]).count(), 0);
        assert_eq!(file.lookup_prefix(["a"]).count(), 0);
        assert_eq!(file.lookup_prefix([""]).count(), 0);
        assert_eq!(file.scan_all().count(), 0);
    }

    #[test]
    fn test_blank_lines_before_first_tag() {
        let dir = TempDir::new().expect("tempdir");
        for content in [
            "\nfoo\tx.c\t1;\"\tf\nzed\tz.c\t2;\"\tf\n",
            "\n\nfoo\tx.c\t1;\"\tf\nzed\tz.c\t2;\"\tf\n",
        ] {
            let file = TagFile::open(write(&dir, "tags", content), Column::Symbol).expect("open");
            assert_eq!(file.lookup_exact(["foo"]).count(), 1, "{content:?}");
            assert_eq!(file.lookup_exact(["zed"]).count(), 1, "{content:?}");
            assert_eq!(file.lookup_prefix(["f"]).count(), 1, "{content:?}");
        }
    }

    #[test]
    fn test_next_line_start() {
        let dir = TempDir::new().expect("tempdir");
        let file = TagFile::open(write(&dir, "tags", "\nab\ncd\n"), Column::Symbol).expect("open");
        assert_eq!(file.next_line_start(0), 0);
        assert_eq!(file.next_line_start(1), 1);
        assert_eq!(file.next_line_start(2), 4);
        assert_eq!(file.next_line_start(4), 4);
        assert_eq!(file.next_line_start(5), 7);
        assert_eq!(file.next_line_start(99), 7);
    }

    #[test]
    fn test_crlf_lines() {
        let dir = TempDir::new().expect("tempdir");
        let content = "a\tx.c\t1;\"\tf\r\nb\tx.c\t2;\"\tf\r\n";
        let file = TagFile::open(write(&dir, "tags", content), Column::Symbol).expect("open");
        let tags = file.get_tags_dict(&["b"], &FilterSet::default());
        assert_eq!(tags["b"][0].record.kind(), "f");
    }

    #[test]
    fn test_get_tags_dict_whole_file_and_root_dir() {
        let dir = TempDir::new().expect("tempdir");
        let file = TagFile::open(write(&dir, "tags", SORTED), Column::Symbol).expect("open");
        let tags = file.get_tags_dict(&[], &FilterSet::default());
        let keys: Vec<_> = tags.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Bar", "Foo", "FooBar", "baz"]);
        assert_eq!(tags["Bar"][0].absolute_path(), dir.path().join("b.py"));
    }

    #[test]
    fn test_resort_by_filename() {
        let dir = TempDir::new().expect("tempdir");
        let tags = write(&dir, "tags", SORTED);
        let sorted = resort_tag_file(&tags).expect("resort");
        assert_eq!(sorted, dir.path().join("tags_sorted_by_file"));

        let by_file = TagFile::open(&sorted, Column::Filename).expect("open");
        let names: Vec<_> = by_file
            .scan_all()
            .map(|line| String::from_utf8_lossy(line.column(Column::Filename)).into_owned())
            .collect();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(names, expected);

        assert_eq!(symbols(by_file.lookup_exact(["a.py"])), vec!["Foo", "FooBar"]);
        let grouped = by_file.get_tags_dict_by(&["b.py"], &FilterSet::default(), "filename");
        assert_eq!(grouped["b.py"].len(), 2);
    }
}
