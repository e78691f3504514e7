//! Running the external tag generator.

use crate::config::CommandLine;
use crate::config::TagsConfig;
use crate::error::IndexError;
use crate::error::Result;
use ctagnav_tag_store::resort_tag_file;
use log::debug;
use log::info;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command;
use which::which;

/// How to invoke the tag generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub command: CommandLine,
    /// Tag file name, created in the build directory.
    pub tag_file: String,
    pub recursive: bool,
    pub opts: Vec<String>,
}

impl BuildOptions {
    pub fn from_config(config: &TagsConfig) -> Self {
        Self {
            command: config.command.clone(),
            tag_file: config.tag_file.clone(),
            recursive: config.recursive,
            opts: config.opts.clone(),
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_config(&TagsConfig::default())
    }
}

/// Generate tags for `path`, a file or a directory.
///
/// The tag file is written next to a file, or inside a directory. Output
/// goes to a temporary file first and replaces the tag file only when the
/// generator succeeds, after which the `_sorted_by_file` companion is
/// rebuilt. Returns the tag file path.
pub async fn build_ctags(options: &BuildOptions, path: &Path) -> Result<PathBuf> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| IndexError::NotFound(path.to_path_buf()))?;
    let (cwd, targets) = if metadata.is_dir() {
        let targets = if options.recursive {
            vec!["-R".to_string()]
        } else {
            directory_files(path)?
        };
        (path.to_path_buf(), targets)
    } else {
        let cwd = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| IndexError::NotFound(path.to_path_buf()))?;
        (cwd, vec![name])
    };

    let argv = options.command.argv()?;
    let program = which(&argv[0]).map_err(|_| IndexError::CommandNotFound {
        program: argv[0].clone(),
    })?;

    // ctags refuses to overwrite an existing file that is not a tag file, so
    // only the unique name is reserved.
    let scratch = NamedTempFile::new_in(&cwd)?.into_temp_path();
    fs::remove_file(&scratch)?;

    let mut args: Vec<String> = argv[1..].to_vec();
    args.push("-f".to_string());
    args.push(scratch.to_string_lossy().into_owned());
    args.extend(options.opts.iter().cloned());
    args.extend(targets);
    let command_text = std::iter::once(argv[0].as_str())
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    info!("Building tags in {}: {command_text}", cwd.display());
    let output = Command::new(&program)
        .args(&args)
        .current_dir(&cwd)
        .stdin(Stdio::null())
        .output()
        .await?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        return Err(IndexError::BuildFailure {
            command: command_text,
            status: output.status.code(),
            output: combined,
        });
    }
    if !combined.trim().is_empty() {
        debug!("Tag generator output: {}", combined.trim_end());
    }

    let tag_file = cwd.join(&options.tag_file);
    scratch
        .persist(&tag_file)
        .map_err(|err| IndexError::Io(err.error))?;

    let sorted_input = tag_file.clone();
    let sorted = tokio::task::spawn_blocking(move || resort_tag_file(&sorted_input)).await??;
    info!("Built {} and {}", tag_file.display(), sorted.display());
    Ok(tag_file)
}

/// Names of the regular files directly inside `dir`, sorted.
fn directory_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctagnav_tag_store::sorted_by_file_path;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn script_options(script: &str) -> BuildOptions {
        BuildOptions {
            command: CommandLine::Argv(vec![
                "sh".to_string(),
                "-c".to_string(),
                script.to_string(),
                "sh".to_string(),
            ]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let err = build_ctags(&BuildOptions::default(), &dir.path().join("absent"))
            .await
            .expect_err("missing path");
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let options = BuildOptions {
            command: CommandLine::Line("ctagnav-no-such-generator --fields=+n".to_string()),
            ..Default::default()
        };
        let err = build_ctags(&options, dir.path()).await.expect_err("no program");
        match err {
            IndexError::CommandNotFound { program } => {
                assert_eq!(program, "ctagnav-no-such-generator");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_build_writes_both_files() {
        let dir = TempDir::new().expect("tempdir");
        // "$2" is the path given after -f.
        let options = script_options(
            r#"printf 'beta\t./b.py\t1;"\tf\nalpha\t./a.py\t2;"\tf\n' > "$2""#,
        );

        let tag_file = build_ctags(&options, dir.path()).await.expect("build");
        assert_eq!(tag_file, dir.path().join(".tags"));
        assert!(tag_file.is_file());

        let sorted = fs::read_to_string(sorted_by_file_path(&tag_file)).expect("sorted");
        assert_eq!(sorted, "alpha\ta.py\t2;\"\tf\nbeta\tb.py\t1;\"\tf\n");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_build_keeps_previous_tags() {
        let dir = TempDir::new().expect("tempdir");
        let tag_file = dir.path().join(".tags");
        fs::write(&tag_file, "old\told.py\t1;\"\tf\n").expect("write");

        let options = script_options(r#"echo 'ctags: broken' >&2; echo partial > "$2"; exit 3"#);
        let err = build_ctags(&options, dir.path()).await.expect_err("failure");
        match err {
            IndexError::BuildFailure { status, output, .. } => {
                assert_eq!(status, Some(3));
                assert!(output.contains("ctags: broken"), "{output}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            fs::read_to_string(&tag_file).expect("read"),
            "old\told.py\t1;\"\tf\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_build_runs_in_parent_directory() {
        let dir = TempDir::new().expect("tempdir");
        let source = dir.path().join("mod.py");
        fs::write(&source, "def run(): pass\n").expect("write");
        // Echo the target name back as a tag.
        let options = script_options(r#"printf 'run\t%s\t1;"\tf\n' "$3" > "$2""#);

        let tag_file = build_ctags(&options, &source).await.expect("build");
        assert_eq!(tag_file, dir.path().join(".tags"));
        assert_eq!(
            fs::read_to_string(&tag_file).expect("read"),
            "run\tmod.py\t1;\"\tf\n"
        );
    }

    #[tokio::test]
    #[ignore = "requires ctags on PATH"]
    async fn test_real_ctags_build() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("app.py"), "class App:\n    def run(self):\n        pass\n")
            .expect("write");
        let tag_file = build_ctags(&BuildOptions::default(), dir.path()).await.expect("build");
        let content = fs::read_to_string(tag_file).expect("read");
        assert!(content.contains("App\tapp.py"), "{content}");
    }
}
