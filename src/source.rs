//! Source enumeration: local directories, glob patterns and git checkouts.

use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};
use crate::utils::is_image_file;
use glob::glob;
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

/// Lists candidate images for `config`, sorted by path. An unreachable
/// location is an error; an empty one is not.
pub fn enumerate_sources(config: &SourceConfig) -> Result<Vec<PathBuf>> {
    match config {
        SourceConfig::Local { path, recursive } => collect_image_files(path, *recursive),
        SourceConfig::Repository {
            url,
            checkout_dir,
            branch,
        } => {
            sync_repository(url, checkout_dir, branch.as_deref())?;
            collect_image_files(&checkout_dir.to_string_lossy(), true)
        }
    }
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Collects supported images from a single file, a directory (walked when
/// `recursive`), or a glob pattern. Hidden files and directories are skipped.
pub fn collect_image_files(input: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let input_path = Path::new(input);
    let mut image_files = Vec::new();

    if input_path.is_file() {
        if is_image_file(input_path) {
            image_files.push(input_path.to_path_buf());
        }
    } else if input_path.is_dir() {
        let walker = if recursive {
            WalkDir::new(input_path)
        } else {
            WalkDir::new(input_path).max_depth(1)
        };

        for entry in walker.into_iter().filter_entry(|e| !is_hidden(e)) {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type().is_file() && is_image_file(path) {
                image_files.push(path.to_path_buf());
            }
        }
    } else if is_glob_pattern(input) {
        let pattern = glob(input).map_err(|e| {
            PipelineError::SourceUnavailable(format!("invalid pattern '{}': {}", input, e))
        })?;
        for entry in pattern.flatten() {
            let hidden = entry
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(false);
            if entry.is_file() && !hidden && is_image_file(&entry) {
                image_files.push(entry);
            }
        }
    } else {
        return Err(PipelineError::SourceUnavailable(format!(
            "{} does not exist",
            input
        )));
    }

    image_files.sort();
    tracing::debug!(input = %input, count = image_files.len(), "Collected source images");
    Ok(image_files)
}

/// Clones `url` into `checkout_dir`, or fast-forwards an existing checkout.
///
/// An existing checkout is pulled from its own `origin`; `url` and `branch`
/// only apply to a fresh clone.
pub fn sync_repository(url: &str, checkout_dir: &Path, branch: Option<&str>) -> Result<()> {
    let sync_error = |detail: String| PipelineError::RepositorySync {
        url: url.to_string(),
        detail,
    };

    let existing = checkout_dir.join(".git").is_dir();
    if existing {
        tracing::info!(url = %url, dir = %checkout_dir.display(), "Updating repository checkout");
        warn_on_remote_mismatch(url, checkout_dir, branch);
    } else {
        tracing::info!(url = %url, dir = %checkout_dir.display(), "Cloning repository");
    }

    let output = git_command(url, checkout_dir, branch, existing)
        .output()
        .map_err(|e| sync_error(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(sync_error(stderr.trim().to_string()));
    }

    Ok(())
}

fn git_command(url: &str, checkout_dir: &Path, branch: Option<&str>, existing: bool) -> Command {
    let mut command = Command::new("git");
    if existing {
        command
            .arg("-C")
            .arg(checkout_dir)
            .args(["pull", "--ff-only"]);
    } else {
        command.args(["clone", "--depth", "1"]);
        if let Some(branch) = branch {
            command.args(["--branch", branch]);
        }
        // Positional arguments after `--` are never parsed as options.
        command.arg("--").arg(url).arg(checkout_dir);
    }
    command
}

fn warn_on_remote_mismatch(url: &str, checkout_dir: &Path, branch: Option<&str>) {
    let origin = Command::new("git")
        .arg("-C")
        .arg(checkout_dir)
        .args(["remote", "get-url", "origin"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());

    match origin {
        Some(origin) if origin != url => tracing::warn!(
            url = %url,
            origin = %origin,
            dir = %checkout_dir.display(),
            "Existing checkout tracks a different remote, pulling from its origin"
        ),
        None => tracing::warn!(
            dir = %checkout_dir.display(),
            "Could not read the origin of the existing checkout"
        ),
        _ => {}
    }
    if let Some(branch) = branch {
        tracing::info!(
            branch = %branch,
            dir = %checkout_dir.display(),
            "Branch is only used for a fresh clone, pulling the current branch"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_collect_flat_directory() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b.png"));
        touch(&dir.path().join("a.JPG"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join(".hidden.jpg"));
        touch(&dir.path().join("nested/c.jpeg"));

        let files = collect_image_files(&dir.path().to_string_lossy(), false).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);
    }

    #[test]
    fn test_collect_recursive_skips_hidden_directories() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("nested/deeper/c.png"));
        touch(&dir.path().join(".git/objects/d.png"));

        let files = collect_image_files(&dir.path().to_string_lossy(), true).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| !p.to_string_lossy().contains(".git")));
    }

    #[test]
    fn test_collect_glob_pattern() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("one.jpg"));
        touch(&dir.path().join("two.png"));

        let pattern = format!("{}/*.jpg", dir.path().display());
        let files = collect_image_files(&pattern, false).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("one.jpg"));

        let pattern = format!("{}/*.gif", dir.path().display());
        assert!(collect_image_files(&pattern, false).unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let result = collect_image_files("/definitely/not/here/photos", false);
        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
        assert!(result.unwrap_err().is_fatal());
    }

    #[test]
    fn test_empty_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let files = enumerate_sources(&SourceConfig::Local {
            path: dir.path().to_string_lossy().into_owned(),
            recursive: false,
        })
        .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_clone_failure_is_repository_sync_error() {
        let dir = TempDir::new().unwrap();
        let missing_remote = dir.path().join("no-such-remote");
        let result = sync_repository(
            &missing_remote.to_string_lossy(),
            &dir.path().join("checkout"),
            None,
        );
        assert!(matches!(result, Err(PipelineError::RepositorySync { .. })));
    }

    #[test]
    fn test_clone_separates_url_from_options() {
        let command = git_command("--upload-pack=evil", Path::new("out"), Some("main"), false);
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["clone", "--depth", "1", "--branch", "main", "--", "--upload-pack=evil", "out"]
        );
    }

    #[test]
    fn test_option_like_url_is_not_executed() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let url = format!("--upload-pack=touch {}", marker.display());
        let result = sync_repository(&url, &dir.path().join("checkout"), None);
        assert!(matches!(result, Err(PipelineError::RepositorySync { .. })));
        assert!(!marker.exists());
    }

    #[test]
    fn test_existing_checkout_pulls_in_place() {
        let command = git_command("https://example.com/r.git", Path::new("repo"), None, true);
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["-C", "repo", "pull", "--ff-only"]);
    }
}
