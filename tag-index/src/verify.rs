//! Whole-file consistency check of a tag file.

use crate::error::Result;
use ctagnav_tag_store::Column;
use ctagnav_tag_store::ParseError;
use ctagnav_tag_store::TagFile;
use ctagnav_tag_store::TagRecord;
use ctagnav_tag_store::record::is_header_line;
use ctagnav_tag_store::store::column_of;
use log::debug;
use std::path::Path;

/// Outcome of [`verify_tag_file`]. Line numbers are 1-based.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifyReport {
    pub parsed: usize,
    pub headers: usize,
    pub blank: usize,
    pub malformed: Vec<(usize, ParseError)>,
    /// First line whose sort column is smaller than the line before it.
    pub first_unsorted: Option<usize>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty() && self.first_unsorted.is_none()
    }
}

/// Parse every line of `path`, sorted on `column`, and tally the results.
pub fn verify_tag_file(path: &Path, column: Column) -> Result<VerifyReport> {
    let file = TagFile::open(path, column)?;
    let mut report = VerifyReport::default();
    let mut previous: Option<&[u8]> = None;
    let mut offset = 0;
    let mut line_no = 0;

    while let Some((line, next)) = file.line_at_offset(offset) {
        offset = next;
        line_no += 1;
        if line.is_empty() {
            report.blank += 1;
            continue;
        }

        let key = column_of(line, column.index());
        if report.first_unsorted.is_none() && previous.is_some_and(|prev| key < prev) {
            report.first_unsorted = Some(line_no);
        }
        previous = Some(key);

        if is_header_line(line) {
            report.headers += 1;
            continue;
        }
        match TagRecord::parse(&String::from_utf8_lossy(line)) {
            Ok(_) => report.parsed += 1,
            Err(err) => {
                debug!("{}:{line_no}: {err}", path.display());
                report.malformed.push((line_no, err));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_counts_every_kind_of_line() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(".tags");
        fs::write(
            &path,
            "!_TAG_FILE_SORTED\t1\t/0=unsorted/\n\
             alpha\ta.py\t1;\"\tf\n\
             \n\
             beta\tb.py\t/^def beta():$/;\"\tf\taccess\n\
             gamma\tc.py\t3;\"\tv\n",
        )
        .expect("write");

        let report = verify_tag_file(&path, Column::Symbol).expect("verify");
        assert_eq!(report.parsed, 2);
        assert_eq!(report.headers, 1);
        assert_eq!(report.blank, 1);
        assert_eq!(
            report.malformed,
            vec![(
                4,
                ParseError::MalformedField {
                    field: "access".to_string()
                }
            )]
        );
        assert_eq!(report.first_unsorted, None);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_detects_unsorted_lines() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(".tags");
        fs::write(&path, "beta\tb.py\t1;\"\tf\nalpha\ta.py\t1;\"\tf\n").expect("write");

        let report = verify_tag_file(&path, Column::Symbol).expect("verify");
        assert_eq!(report.first_unsorted, Some(2));
        assert_eq!(report.parsed, 2);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let err = verify_tag_file(&dir.path().join("nope"), Column::Symbol).expect_err("missing");
        assert!(matches!(
            err,
            crate::error::IndexError::Store(ctagnav_tag_store::TagStoreError::NotFound(_))
        ));
    }
}
