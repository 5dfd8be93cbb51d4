//! Derive web commit links from git remote URLs.

use std::sync::LazyLock;

use regex::Regex;

// https://host/owner/repo(.git), ssh://git@host/owner/repo(.git), git@host:owner/repo(.git)
static REMOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://(?:[^@/]+@)?|ssh://(?:[^@/]+@)?|[^@/\s]+@)(?P<host>github\.com|gitlab\.com|bitbucket\.org)[:/](?P<path>[^\s]+?)(?:\.git)?/?$",
    )
    .expect("remote regex is valid")
});

/// Web URL for `commit` on the hosting service behind `remote_url`.
///
/// Returns `None` for hosts that are not recognized.
pub fn commit_url(remote_url: &str, commit: &str) -> Option<String> {
    let caps = REMOTE_RE.captures(remote_url.trim())?;
    let host = caps.name("host")?.as_str();
    let path = caps.name("path")?.as_str().trim_matches('/');
    if path.is_empty() || commit.is_empty() {
        return None;
    }
    let segment = match host {
        "bitbucket.org" => "commits",
        "gitlab.com" => "-/commit",
        _ => "commit",
    };
    Some(format!("https://{host}/{path}/{segment}/{commit}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_https_and_ssh() {
        assert_eq!(
            commit_url("https://github.com/dummy/dummy.git", "abc").as_deref(),
            Some("https://github.com/dummy/dummy/commit/abc")
        );
        assert_eq!(
            commit_url("git@github.com:dummy/dummy.git", "abc").as_deref(),
            Some("https://github.com/dummy/dummy/commit/abc")
        );
        assert_eq!(
            commit_url("ssh://git@github.com/dummy/dummy", "abc").as_deref(),
            Some("https://github.com/dummy/dummy/commit/abc")
        );
    }

    #[test]
    fn gitlab_and_bitbucket_layouts() {
        assert_eq!(
            commit_url("https://gitlab.com/group/sub/repo.git", "abc").as_deref(),
            Some("https://gitlab.com/group/sub/repo/-/commit/abc")
        );
        assert_eq!(
            commit_url("git@bitbucket.org:team/repo.git", "abc").as_deref(),
            Some("https://bitbucket.org/team/repo/commits/abc")
        );
    }

    #[test]
    fn unknown_hosts_have_no_link() {
        assert_eq!(commit_url("https://git.example.com/a/b.git", "abc"), None);
        assert_eq!(commit_url("/srv/git/repo.git", "abc"), None);
    }

    #[test]
    fn credentials_in_url_are_not_leaked() {
        assert_eq!(
            commit_url("https://token@github.com/o/r.git", "abc").as_deref(),
            Some("https://github.com/o/r/commit/abc")
        );
    }
}
