use ctagnav_tag_store::TagRecord;
use ctagnav_tag_store::path::PATH_ORDER;

/// Separator between a container field and the symbol in a quick-open label.
pub fn object_punctuator(field: &str) -> &'static str {
    match field {
        "class" => ".",
        "struct" => "::",
        "function" => "/",
        _ => " -> ",
    }
}

const LABEL_SEPARATOR: &str = "    ";

/// Columns for a quick-open row: label, optional filename, ex command.
///
/// The label qualifies the symbol with each of its `class`, `function` and
/// `struct` containers (`Point.norm`, `parse/inner`), or is the bare symbol.
pub fn format_for_quick_open(record: &TagRecord, show_path: bool) -> Vec<String> {
    let qualified: Vec<String> = record
        .field_keys()
        .filter(|key| PATH_ORDER.contains(key))
        .filter_map(|key| {
            record
                .field(key)
                .map(|container| format!("{container}{}{}", object_punctuator(key), record.symbol()))
        })
        .collect();

    let label = if qualified.is_empty() {
        record.symbol().to_string()
    } else {
        qualified.join(LABEL_SEPARATOR)
    };

    let mut columns = vec![label];
    if show_path {
        columns.push(record.filename().to_string());
    }
    columns.push(record.ex_command().as_str().trim().to_string());
    columns
}
