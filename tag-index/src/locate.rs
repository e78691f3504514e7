//! Finding tag files for a source file.

use crate::config::TagsConfig;
use crate::config::current_platform;
use ctagnav_tag_store::search_paths_path;
use log::debug;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

/// The deepest regular file named `tag_file` in the directories containing `file`.
pub fn find_tags_relative_to(file: &Path, tag_file: &str) -> Option<PathBuf> {
    file.parent()?
        .ancestors()
        .map(|dir| dir.join(tag_file))
        .find(|candidate| candidate.is_file())
}

/// Every existing tag file to search for a reference, in order:
///
/// 1. `tags_file` itself
/// 2. each path listed in `<tags_file>_search_paths`
/// 3. `extra_tag_paths` for this language and platform (a tag file, or a
///    directory holding `tag_file`)
/// 4. `extra_tag_files` next to `tags_file`, if the sidecar exists
/// 5. `tag_file` and each of `extra_tag_files` in every project folder
///
/// Duplicates keep their first position.
pub fn alternate_tags_paths(
    tags_file: &Path,
    config: &TagsConfig,
    source: &str,
    folders: &[PathBuf],
) -> Vec<PathBuf> {
    alternate_tags_paths_on(tags_file, config, source, folders, current_platform())
}

/// An `extra_tag_paths` entry names either the tag file itself or the
/// directory it lives in.
fn extra_tag_path(path: &Path, tag_file: &str) -> PathBuf {
    if path.is_file() {
        path.to_path_buf()
    } else {
        path.join(tag_file)
    }
}

pub fn alternate_tags_paths_on(
    tags_file: &Path,
    config: &TagsConfig,
    source: &str,
    folders: &[PathBuf],
    platform: &str,
) -> Vec<PathBuf> {
    let tag_dir = tags_file.parent().unwrap_or_else(|| Path::new(""));
    let mut candidates = vec![tags_file.to_path_buf()];

    let sidecar = search_paths_path(tags_file);
    let has_sidecar = sidecar.is_file();
    if has_sidecar {
        match fs::read_to_string(&sidecar) {
            Ok(content) => candidates.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| tag_dir.join(line)),
            ),
            Err(err) => debug!("Cannot read {}: {err}", sidecar.display()),
        }
    }

    candidates.extend(
        config
            .extra_tag_paths_for(source, platform)
            .map(|extra| extra_tag_path(Path::new(&extra.path), &config.tag_file)),
    );

    if has_sidecar {
        candidates.extend(config.extra_tag_files.iter().map(|extra| tag_dir.join(extra)));
    }

    for folder in folders {
        candidates.push(folder.join(&config.tag_file));
        candidates.extend(config.extra_tag_files.iter().map(|extra| folder.join(extra)));
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for candidate in candidates.iter().map(|path| normalize(path)) {
        if !paths.contains(&candidate) && candidate.is_file() {
            paths.push(candidate);
        }
    }
    paths
}

/// Lexically resolve `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Path of `file` relative to the tag file's directory, with `/` separators,
/// as filenames are written in the tag file.
pub fn rel_path_to_source(file: &Path, tags_file: &Path) -> String {
    let tag_dir = tags_file.parent().unwrap_or_else(|| Path::new(""));
    let relative = pathdiff::diff_paths(file, tag_dir).unwrap_or_else(|| file.to_path_buf());
    relative.to_string_lossy().replace('\\', "/")
}

/// Extension of `file` including the dot (`.py`), or empty.
pub fn current_file_suffix(file: &Path) -> String {
    file.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}
