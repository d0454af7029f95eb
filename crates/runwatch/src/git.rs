//! Git helpers for resolving which run to watch.

use std::path::Path;
use std::process::Command;

use regex::Regex;

use crate::error::{Result, WatchError};

/// Capture the HEAD commit SHA from a git repository.
///
/// Runs `git rev-parse HEAD` in the given directory.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let sha = run_git(repo_dir, &["rev-parse", "HEAD"])?;
    if sha.is_empty() {
        return Err(WatchError::Git(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}

/// `owner/repo` of the `origin` remote, when it points at GitHub.
pub fn origin_repo_slug(repo_dir: &Path) -> Result<String> {
    let url = run_git(repo_dir, &["remote", "get-url", "origin"])?;
    parse_repo_slug(&url)
        .ok_or_else(|| WatchError::Git(format!("origin remote is not a GitHub URL: {url}")))
}

/// Extract `owner/repo` from an HTTPS or SSH GitHub remote URL.
pub fn parse_repo_slug(url: &str) -> Option<String> {
    let pattern = Regex::new(r"github\.com[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$").ok()?;
    let caps = pattern.captures(url.trim())?;
    Some(format!("{}/{}", &caps[1], &caps[2]))
}

fn run_git(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| WatchError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WatchError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init"]);
        git(dir.path(), &["config", "user.name", "test-user"]);
        git(dir.path(), &["config", "user.email", "test@example.com"]);
        git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn capture_head_sha_returns_40_hex_chars() {
        let repo = make_git_repo();
        let sha = capture_head_sha(repo.path()).unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn capture_head_sha_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            capture_head_sha(dir.path()),
            Err(WatchError::Git(_))
        ));
    }

    #[test]
    fn origin_slug_from_remote() {
        let repo = make_git_repo();
        git(
            repo.path(),
            &["remote", "add", "origin", "git@github.com:acme/widgets.git"],
        );
        assert_eq!(origin_repo_slug(repo.path()).unwrap(), "acme/widgets");
    }

    #[test]
    fn origin_slug_missing_remote_is_error() {
        let repo = make_git_repo();
        assert!(origin_repo_slug(repo.path()).is_err());
    }

    #[test]
    fn parse_repo_slug_variants() {
        for url in [
            "https://github.com/acme/widgets.git",
            "https://github.com/acme/widgets",
            "git@github.com:acme/widgets.git",
            "ssh://git@github.com/acme/widgets/",
        ] {
            assert_eq!(parse_repo_slug(url).as_deref(), Some("acme/widgets"), "{url}");
        }
        assert_eq!(parse_repo_slug("https://gitlab.com/acme/widgets.git"), None);
    }
}
