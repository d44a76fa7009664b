//! Local `git` subprocess helpers shared by C2 (inventory) and C9 (persistence).
//!
//! Network I/O and forge dialects live in `crate::remote`; this module only
//! ever shells out to the `git` binary already checked out on disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::errors::{RecoveryError, Result};

/// Runs `git <args>` in `git_dir`, returning trimmed stdout on success.
///
/// Any nonzero exit is a [`RecoveryError::CommandExecution`] carrying the
/// full argv and stderr — callers decide whether that's fatal.
pub fn exec_git(git_dir: &Path, args: &[&str]) -> Result<String> {
    debug!(?args, dir = %git_dir.display(), "exec git");
    let output = Command::new("git")
        .arg("-C")
        .arg(git_dir)
        .args(args)
        .output()?;

    if !output.status.success() {
        return Err(RecoveryError::CommandExecution {
            cmd: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Runs `git <args>` in `git_dir`, feeding `stdin_data` to the subprocess and
/// returning trimmed stdout. Used by C9 for `git hash-object --stdin -w -t <kind>`.
pub fn exec_git_with_stdin(git_dir: &Path, args: &[&str], stdin_data: &[u8]) -> Result<String> {
    debug!(?args, dir = %git_dir.display(), bytes = stdin_data.len(), "exec git with stdin");
    let mut child = Command::new("git")
        .arg("-C")
        .arg(git_dir)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    child
        .stdin
        .take()
        .expect("stdin configured as piped")
        .write_all(stdin_data)?;

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(RecoveryError::CommandExecution {
            cmd: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// `git fetch --all`, called once at startup (§6 subprocess contract).
pub fn fetch_all(git_dir: &Path) -> Result<()> {
    exec_git(git_dir, &["fetch", "--all"])?;
    Ok(())
}

/// `git rev-parse --git-dir`, resolved to an absolute path to the objects root's parent.
pub fn resolve_git_dir(git_dir: &Path) -> Result<PathBuf> {
    let raw = exec_git(git_dir, &["rev-parse", "--git-dir"])?;
    let resolved = PathBuf::from(raw);
    if resolved.is_absolute() {
        Ok(resolved)
    } else {
        Ok(git_dir.join(resolved))
    }
}

/// A parsed origin remote: scheme-less host, owner path, and repo name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOrigin {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

/// `git remote get-url origin`, normalized per §6: SSH `user@host:path` form
/// becomes the HTTPS host/path split, and a trailing `.git` is stripped.
pub fn get_remote_origin(git_dir: &Path) -> Result<RemoteOrigin> {
    let url = exec_git(git_dir, &["remote", "get-url", "origin"])?;
    parse_remote_url(&url)
}

fn parse_remote_url(url: &str) -> Result<RemoteOrigin> {
    let stripped = url.strip_suffix(".git").unwrap_or(url);

    let (host, path) = if let Some(rest) = stripped
        .strip_prefix("https://")
        .or_else(|| stripped.strip_prefix("http://"))
    {
        rest.split_once('/')
            .ok_or_else(|| RecoveryError::Repository(format!("malformed origin url: {url}")))?
    } else if let Some(rest) = stripped.strip_prefix("git@") {
        rest.split_once(':')
            .ok_or_else(|| RecoveryError::Repository(format!("malformed origin url: {url}")))?
    } else {
        return Err(RecoveryError::Repository(format!(
            "unsupported origin url scheme: {url}"
        )));
    };

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let repo = segments
        .pop()
        .ok_or_else(|| RecoveryError::Repository(format!("malformed origin url: {url}")))?;
    let owner = segments.join("/");

    Ok(RemoteOrigin {
        host: host.to_string(),
        owner,
        repo: repo.to_string(),
    })
}

/// Resolves a GitHub token the way spec.md:167 describes ("GitHub auth
/// delegated to an external CLI credential helper"): `GITHUB_TOKEN` first,
/// then shelling out to `gh auth token`. Returns `None` on any failure —
/// an unauthenticated GraphQL call will surface its own auth error later,
/// which is already handled by C3's retry/categorize logic.
pub fn github_token_from_environment() -> Option<String> {
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        if !token.is_empty() {
            return Some(token);
        }
    }

    let output = Command::new("gh").args(["auth", "token"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_origin() {
        let origin = parse_remote_url("https://github.com/acme/widgets.git").unwrap();
        assert_eq!(origin.host, "github.com");
        assert_eq!(origin.owner, "acme");
        assert_eq!(origin.repo, "widgets");
    }

    #[test]
    fn parses_ssh_origin_without_dot_git() {
        let origin = parse_remote_url("git@gitlab.com:group/sub/project").unwrap();
        assert_eq!(origin.host, "gitlab.com");
        assert_eq!(origin.owner, "group/sub");
        assert_eq!(origin.repo, "project");
    }

    #[test]
    fn rejects_unsupported_scheme() {
        assert!(parse_remote_url("ftp://example.com/x/y").is_err());
    }
}
