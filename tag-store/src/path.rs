use std::collections::BTreeMap;

/// Containment fields that lead the tag path, in this order.
pub const PATH_ORDER: [&str; 3] = ["function", "class", "struct"];

/// Fields that never contribute a tag path segment.
pub const PATH_IGNORE_FIELDS: [&str; 6] =
    ["file", "access", "signature", "language", "line", "inherits"];

/// Applied in order; each splitter is applied to every fragment of the previous one.
pub const TAG_PATH_SPLITTERS: [&str; 4] = ["/", ".", "::", ":"];

/// Build `(filename, containers..., symbol)` for a tag.
///
/// Containers come from `function`, `class` and `struct` first, then the
/// remaining field keys in sorted order, skipping [`PATH_IGNORE_FIELDS`].
/// Everything after the filename is split on [`TAG_PATH_SPLITTERS`] and
/// empty fragments are dropped; the filename itself is kept untouched.
pub fn build_tag_path(
    symbol: &str,
    filename: &str,
    fields: &BTreeMap<String, String>,
) -> Vec<String> {
    let ordered = PATH_ORDER
        .iter()
        .copied()
        .filter(|key| fields.contains_key(*key))
        .chain(
            fields
                .keys()
                .map(String::as_str)
                .filter(|key| !PATH_ORDER.contains(key)),
        )
        .filter(|key| !PATH_IGNORE_FIELDS.contains(key));

    let mut joined = String::new();
    for key in ordered {
        if let Some(value) = fields.get(key) {
            joined.push_str(value);
            joined.push('.');
        }
    }
    joined.push_str(symbol);

    let mut path = Vec::with_capacity(4);
    path.push(filename.to_string());
    path.extend(splits(&joined, &TAG_PATH_SPLITTERS).map(str::to_string));
    path
}

/// Split `text` on each splitter in turn, dropping empty fragments.
pub fn splits<'a>(text: &'a str, splitters: &[&str]) -> impl Iterator<Item = &'a str> {
    let mut fragments = vec![text];
    for splitter in splitters {
        fragments = fragments
            .into_iter()
            .flat_map(|fragment| fragment.split(*splitter))
            .collect();
    }
    fragments.into_iter().filter(|fragment| !fragment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_no_fields() {
        assert_eq!(
            build_tag_path("main", "src/main.c", &BTreeMap::new()),
            vec!["src/main.c", "main"]
        );
    }

    #[test]
    fn test_priority_fields_lead() {
        let path = build_tag_path(
            "draw",
            "shapes.cpp",
            &fields(&[("access", "public"), ("class", "Circle"), ("function", "render")]),
        );
        assert_eq!(path, vec!["shapes.cpp", "render", "Circle", "draw"]);
    }

    #[test]
    fn test_remaining_fields_sorted_and_split() {
        let path = build_tag_path(
            "bar",
            "a.c",
            &fields(&[("typeref", "typename:void"), ("file", "")]),
        );
        assert_eq!(path, vec!["a.c", "typename", "void", "bar"]);
    }

    #[test]
    fn test_namespace_separators_split() {
        let path = build_tag_path(
            "push",
            "vec.hpp",
            &fields(&[("class", "std::detail::Vec"), ("signature", "(T value)")]),
        );
        assert_eq!(path, vec!["vec.hpp", "std", "detail", "Vec", "push"]);
    }

    #[test]
    fn test_filename_is_never_split() {
        let path = build_tag_path("x", "./pkg/mod.py", &BTreeMap::new());
        assert_eq!(path[0], "./pkg/mod.py");
        assert_eq!(path.last().map(String::as_str), Some("x"));
    }

    #[test]
    fn test_splits_drops_empty_fragments() {
        let parts: Vec<_> = splits("a::b//c.d:", &TAG_PATH_SPLITTERS).collect();
        assert_eq!(parts, vec!["a", "b", "c", "d"]);
    }
}
