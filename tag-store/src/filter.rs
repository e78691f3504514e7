use crate::record::TagRecord;
use log::warn;
use regex::Regex;

/// One `{field: regex}` map.
///
/// A record is rejected when any field named here is present on the record
/// and the regex matches the start of its value.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    rules: Vec<(String, Regex)>,
}

impl TagFilter {
    /// Compile a filter map. Invalid regexes are logged and dropped so one bad
    /// setting cannot disable the rest.
    pub fn compile<I, K, V>(rules: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let rules = rules
            .into_iter()
            .filter_map(|(field, pattern)| {
                let pattern = pattern.as_ref();
                match Regex::new(&format!("^(?:{pattern})")) {
                    Ok(regex) => Some((field.as_ref().to_string(), regex)),
                    Err(err) => {
                        warn!(
                            "Ignoring filter on '{}': invalid regex {pattern:?}: {err}",
                            field.as_ref()
                        );
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }

    pub fn rejects(&self, record: &TagRecord) -> bool {
        self.rules.iter().any(|(field, regex)| {
            record
                .get(field)
                .is_some_and(|value| regex.is_match(value))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A list of [`TagFilter`]s; a record passes only if no filter rejects it.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<TagFilter>,
}

impl FilterSet {
    pub fn new(filters: Vec<TagFilter>) -> Self {
        Self { filters }
    }

    /// Compile from raw `{field: regex}` maps.
    pub fn from_maps<'a, M, K, V>(maps: impl IntoIterator<Item = &'a M>) -> Self
    where
        M: 'a,
        &'a M: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::new(maps.into_iter().map(TagFilter::compile).collect())
    }

    pub fn passes(&self, record: &TagRecord) -> bool {
        !self.filters.iter().any(|filter| filter.rejects(record))
    }

    pub fn is_empty(&self) -> bool {
        self.filters.iter().all(TagFilter::is_empty)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn record(line: &str) -> TagRecord {
        TagRecord::parse(line).expect("valid tag line")
    }

    #[test]
    fn test_filter_drops_matching_access() {
        let filters = FilterSet::new(vec![TagFilter::compile([("access", "private")])]);
        let records = vec![
            record("a\tx.java\t1;\"\tm\taccess:private"),
            record("b\tx.java\t2;\"\tm\taccess:public"),
            record("c\tx.java\t3;\"\tm"),
            record("d\tx.java\t4;\"\tm\taccess:private\tclass:X"),
        ];

        let kept: Vec<_> = records
            .iter()
            .filter(|r| filters.passes(r))
            .map(TagRecord::symbol)
            .collect();

        assert_eq!(kept, vec!["b", "c"]);
    }

    #[test]
    fn test_regex_is_anchored_at_start() {
        let filter = TagFilter::compile([("kind", "i")]);
        assert!(filter.rejects(&record("os\ta.py\t1;\"\ti")));
        assert!(!filter.rejects(&record("Os\ta.py\t1;\"\tvi")));
    }

    #[test]
    fn test_any_map_rejects() {
        let maps = vec![
            BTreeMap::from([("kind".to_string(), "v".to_string())]),
            BTreeMap::from([("file".to_string(), ".*".to_string())]),
        ];
        let filters = FilterSet::from_maps(&maps);
        assert_eq!(filters.len(), 2);

        assert!(!filters.passes(&record("x\ta.c\t1;\"\tv")));
        assert!(!filters.passes(&record("y\ta.c\t1;\"\tf\tfile:")));
        assert!(filters.passes(&record("z\ta.c\t1;\"\tf")));
    }

    #[test_log::test]
    fn test_invalid_regex_is_skipped() {
        let filter = TagFilter::compile([("kind", "("), ("access", "private")]);
        assert!(filter.rejects(&record("a\tx.java\t1;\"\tm\taccess:private")));
        assert!(!filter.rejects(&record("b\tx.java\t1;\"\t(")));
    }
}
