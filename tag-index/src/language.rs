use std::path::Path;

/// Source scope name for a file, by extension (`main.py` -> `source.python`).
///
/// Scope names select filters and language rules in [`crate::TagsConfig`].
pub fn source_scope_for_path(path: &Path) -> Option<&'static str> {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
    {
        Some(ext) if ext == "py" || ext == "pyw" => Some("source.python"),
        Some(ext) if ext == "js" || ext == "jsx" || ext == "mjs" => Some("source.js"),
        Some(ext) if ext == "ts" || ext == "tsx" => Some("source.ts"),
        Some(ext) if ext == "java" => Some("source.java"),
        Some(ext) if ["cc", "cpp", "cxx", "hpp", "hh", "hxx", "h"].contains(&ext.as_str()) => {
            Some("source.c++")
        }
        Some(ext) if ext == "c" => Some("source.c"),
        Some(ext) if ext == "php" => Some("source.php"),
        Some(ext) if ext == "rb" || ext == "rake" => Some("source.ruby"),
        Some(ext) if ext == "rs" => Some("source.rust"),
        Some(ext) if ext == "go" => Some("source.go"),
        Some(ext) if ext == "cs" => Some("source.cs"),
        _ => None,
    }
}
