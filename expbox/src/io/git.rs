//! Git adapter for metadata enrichment.
//!
//! Everything here is best-effort: a missing `git` binary, a directory outside
//! any repository or a failing subcommand shows up as `None` in the result,
//! never as an error the caller has to handle.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{debug, instrument};

use crate::core::meta::{GitInfo, GitRemote, GitSnapshot};
use crate::core::remote::commit_url;

/// Remote consulted for commit links.
pub const ORIGIN: &str = "origin";

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn head_commit(&self) -> Result<String> {
        self.run_value(&["rev-parse", "HEAD"])
    }

    /// Current branch name; `HEAD` when detached.
    pub fn current_branch(&self) -> Result<String> {
        self.run_value(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn head_subject(&self) -> Result<String> {
        self.run_value(&["log", "-1", "--pretty=%s"])
    }

    pub fn remote_url(&self, name: &str) -> Result<String> {
        self.run_value(&["config", "--get", &format!("remote.{name}.url")])
    }

    /// Status entries, untracked directories collapsed.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1"])?;
        out.lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_status_line)
            .collect()
    }

    // Porcelain lines start with a status column that may be a space, so raw
    // output is never trimmed here.
    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_value(&self, args: &[&str]) -> Result<String> {
        Ok(self.run_capture(args)?.trim().to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: unquote(path.trim()),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim();
    if let Some((_, new)) = path.split_once(" -> ") {
        path = new.trim();
    }
    Ok(StatusEntry {
        code,
        path: unquote(path),
    })
}

// Paths with spaces or non-ASCII bytes come back wrapped in double quotes.
fn unquote(path: &str) -> String {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
        .to_string()
}

/// Walk upward from `start` looking for a `.git` entry (directory, or file
/// for worktrees and submodules).
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let start = crate::io::layout::absolute(start);
    let found = start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf);
    debug!(start = %start.display(), repo_root = ?found, "repo root lookup");
    found
}

/// Capture HEAD. Individual fields are `None` when their command fails.
pub fn probe_snapshot(git: &Git) -> GitSnapshot {
    GitSnapshot {
        commit: git.head_commit().ok(),
        branch: git.current_branch().ok(),
        dirty: git.status_porcelain().ok().map(|entries| !entries.is_empty()),
        subject: git.head_subject().ok(),
        captured_at: Utc::now(),
    }
}

pub fn probe_dirty_files(git: &Git) -> Vec<String> {
    git.status_porcelain()
        .map(|entries| entries.into_iter().map(|entry| entry.path).collect())
        .unwrap_or_default()
}

/// Describe `origin`, with a commit link when the host is recognized.
pub fn probe_remote(git: &Git, commit: Option<&str>) -> Option<GitRemote> {
    let url = git.remote_url(ORIGIN).ok().filter(|url| !url.is_empty())?;
    let commit_url = commit.and_then(|commit| commit_url(&url, commit));
    Some(GitRemote {
        name: ORIGIN.to_string(),
        url,
        commit_url,
    })
}

/// Full git section for a new experiment; `None` outside a repository.
///
/// `start` and `last` are the same snapshot.
#[instrument(skip_all, fields(project_root = %project_root.display()))]
pub fn collect_git_info(project_root: &Path) -> Option<GitInfo> {
    let repo_root = find_repo_root(project_root)?;
    let git = Git::new(&repo_root);
    let snapshot = probe_snapshot(&git);
    let info = GitInfo {
        project_relpath: relpath(project_root, &repo_root),
        repo_root: Some(repo_root.display().to_string()),
        dirty_files: probe_dirty_files(&git),
        remote: probe_remote(&git, snapshot.commit.as_deref()),
        start: Some(snapshot.clone()),
        last: Some(snapshot),
    };
    debug!(commit = ?info.last.as_ref().and_then(|s| s.commit.as_deref()), "git info collected");
    Some(info)
}

/// Refresh `last`, `dirty_files` and `remote` in place. `start` is left
/// alone. Returns `false` when no repository could be found.
#[instrument(skip_all)]
pub fn refresh_git_info(info: &mut GitInfo, project_root: &Path) -> bool {
    let known = info
        .repo_root
        .as_deref()
        .map(PathBuf::from)
        .filter(|root| root.join(".git").exists());
    let Some(repo_root) = known.or_else(|| find_repo_root(project_root)) else {
        debug!("no repository, git refresh skipped");
        return false;
    };
    let git = Git::new(&repo_root);
    let snapshot = probe_snapshot(&git);
    info.dirty_files = probe_dirty_files(&git);
    info.remote = probe_remote(&git, snapshot.commit.as_deref());
    info.last = Some(snapshot);
    if info.repo_root.is_none() {
        info.project_relpath = relpath(project_root, &repo_root);
        info.repo_root = Some(repo_root.display().to_string());
    }
    true
}

fn relpath(project_root: &Path, repo_root: &Path) -> Option<String> {
    let project_root = crate::io::layout::absolute(project_root);
    let rel = project_root.strip_prefix(repo_root).ok()?;
    Some(if rel.as_os_str().is_empty() {
        ".".to_string()
    } else {
        rel.display().to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_modified_line() {
        let e = parse_status_line(" M src/main.rs").expect("parse");
        assert_eq!(e.code, " M");
        assert_eq!(e.path, "src/main.rs");
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn strips_quotes_from_paths_with_spaces() {
        let e = parse_status_line(" M \"with space.txt\"").expect("parse");
        assert_eq!(e.path, "with space.txt");
    }

    #[test]
    fn modified_first_entry_keeps_full_path() {
        let repo = crate::test_support::TestRepo::new().expect("repo");
        repo.write_file("README.md", "edited\n").expect("edit");
        let git = Git::new(repo.path());
        let entries = git.status_porcelain().expect("status");
        assert_eq!(
            entries,
            vec![StatusEntry {
                code: " M".to_string(),
                path: "README.md".to_string(),
            }]
        );
        assert_eq!(probe_dirty_files(&git), vec!["README.md".to_string()]);
        assert_eq!(git.current_branch().expect("branch"), "main");
    }

    #[test]
    fn no_repo_means_no_git_section() {
        let temp = tempfile::tempdir().expect("tempdir");
        // The temp dir might sit under a repository on some machines.
        if find_repo_root(temp.path()).is_none() {
            assert_eq!(collect_git_info(temp.path()), None);
            let mut info = GitInfo::default();
            assert!(!refresh_git_info(&mut info, temp.path()));
            assert_eq!(info, GitInfo::default());
        }
    }

    #[test]
    fn finds_root_from_nested_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(temp.path().join(".git")).expect("git dir");
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).expect("nested");
        let root = find_repo_root(&nested).expect("root");
        assert_eq!(root, crate::io::layout::absolute(temp.path()));
        assert_eq!(relpath(&nested, &root).as_deref(), Some("a/b"));
        assert_eq!(relpath(temp.path(), &root).as_deref(), Some("."));
    }
}
