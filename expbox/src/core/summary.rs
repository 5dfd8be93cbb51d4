//! Human-readable one-line checkpoint summary.

use std::path::Path;

use super::meta::ExpMeta;

/// `[expbox] saved <id> project=<p> status=<s> git=<branch>@<short>[*] path=<root>`
///
/// `*` marks a dirty working tree. The git part is omitted without a repository.
pub fn format_summary(meta: &ExpMeta, root: &Path) -> String {
    let mut line = format!(
        "[expbox] saved {} project={} status={}",
        meta.exp_id,
        meta.project,
        meta.status.as_deref().unwrap_or("-")
    );
    let last = meta
        .git
        .as_ref()
        .and_then(|g| g.last.as_ref().or(g.start.as_ref()));
    if let Some(snap) = last {
        let branch = snap.branch.as_deref().unwrap_or("?");
        let commit = snap.short_commit().unwrap_or("?");
        let dirty = if snap.dirty == Some(true) { "*" } else { "" };
        line.push_str(&format!(" git={branch}@{commit}{dirty}"));
    }
    line.push_str(&format!(" path={}", root.display()));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::meta::{GitInfo, GitSnapshot};
    use chrono::Utc;

    #[test]
    fn summary_without_git() {
        let mut meta = ExpMeta::new("241125-1320", "proj");
        meta.status = Some("done".to_string());
        let line = format_summary(&meta, Path::new("/r/241125-1320"));
        assert_eq!(
            line,
            "[expbox] saved 241125-1320 project=proj status=done path=/r/241125-1320"
        );
    }

    #[test]
    fn summary_marks_dirty_tree() {
        let mut meta = ExpMeta::new("x", "proj");
        meta.git = Some(GitInfo {
            last: Some(GitSnapshot {
                commit: Some("abcdef0123".to_string()),
                branch: Some("main".to_string()),
                dirty: Some(true),
                subject: None,
                captured_at: Utc::now(),
            }),
            ..GitInfo::default()
        });
        let line = format_summary(&meta, Path::new("/r/x"));
        assert!(line.contains("git=main@abcdef0*"), "{line}");
        assert!(line.contains("status=-"));
    }
}
