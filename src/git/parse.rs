//! Parsers for git's machine-readable output formats.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::{GitError, GitErrorKind, RemoteBranch, Worktree};

/// Parse `git worktree list --porcelain` output.
///
/// Accumulates `worktree`/`branch` lines into a record, flushes on blank
/// lines, and flushes the trailing record when the output lacks a final blank
/// line. The bare repository entry is filtered out; `refs/heads/` is stripped
/// from branch refs.
pub(crate) fn parse_worktree_list(output: &str) -> Result<Vec<Worktree>, GitError> {
    struct Record {
        path: PathBuf,
        branch: Option<String>,
        bare: bool,
    }

    let mut worktrees = Vec::new();
    let mut current: Option<Record> = None;

    let flush = |record: Option<Record>, out: &mut Vec<Worktree>| {
        if let Some(record) = record
            && !record.bare
        {
            out.push(Worktree {
                path: record.path,
                branch: record.branch,
            });
        }
    };

    for line in output.lines() {
        if line.is_empty() {
            flush(current.take(), &mut worktrees);
            continue;
        }

        let (key, value) = match line.split_once(' ') {
            Some((k, v)) => (k, Some(v)),
            None => (line, None),
        };

        match (key, &mut current) {
            ("worktree", slot) => {
                let path = value.ok_or_else(|| {
                    GitError::new(GitErrorKind::Other, "worktree line missing path")
                })?;
                flush(slot.take(), &mut worktrees);
                *slot = Some(Record {
                    path: PathBuf::from(path),
                    branch: None,
                    bare: false,
                });
            }
            ("branch", Some(record)) => {
                let branch_ref = value
                    .ok_or_else(|| GitError::new(GitErrorKind::Other, "branch line missing ref"))?;
                let branch = branch_ref.strip_prefix("refs/heads/").unwrap_or(branch_ref);
                record.branch = Some(branch.to_string());
            }
            ("bare", Some(record)) => record.bare = true,
            // HEAD, detached, locked, prunable, and unknown attributes are
            // irrelevant to reconciliation.
            _ => {}
        }
    }

    flush(current, &mut worktrees);
    Ok(worktrees)
}

/// Parse `for-each-ref --format='%(refname:strip=3)'` over
/// `refs/remotes/origin`, dropping the symbolic `HEAD` entry.
pub(crate) fn parse_remote_branches(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "HEAD")
        .map(String::from)
        .collect()
}

/// Parse `for-each-ref --format='%(refname:strip=3) %(committerdate:unix)'`.
///
/// Lines that fail to parse are skipped; a missing timestamp must not take
/// down the whole enumeration.
pub(crate) fn parse_remote_branches_with_activity(output: &str) -> Vec<RemoteBranch> {
    output
        .lines()
        .filter_map(|line| {
            let (name, timestamp) = line.trim().rsplit_once(' ')?;
            if name == "HEAD" {
                return None;
            }
            let timestamp: i64 = timestamp.parse().ok()?;
            Some(RemoteBranch {
                name: name.to_string(),
                last_commit: DateTime::<Utc>::from_timestamp(timestamp, 0)?,
            })
        })
        .collect()
}

/// Extract the default branch from `ls-remote --symref <url> HEAD` output.
pub(crate) fn parse_symref_head(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.strip_prefix("ref: ")
            .and_then(|symref| symref.split_once('\t'))
            .map(|(ref_path, _)| ref_path)
            .and_then(|ref_path| ref_path.strip_prefix("refs/heads/"))
            .map(String::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_porcelain_list_with_bare_entry() {
        let output = "worktree /repo/.git\nbare\n\nworktree /trees/main\nHEAD abc123\nbranch refs/heads/main\n\nworktree /trees/feat/LCR-8879\nHEAD def456\nbranch refs/heads/feat/LCR-8879\n";
        let worktrees = parse_worktree_list(output).unwrap();
        assert_eq!(worktrees.len(), 2);
        assert_eq!(worktrees[0].path, PathBuf::from("/trees/main"));
        assert_eq!(worktrees[0].branch.as_deref(), Some("main"));
        assert_eq!(worktrees[1].branch.as_deref(), Some("feat/LCR-8879"));
        assert_eq!(worktrees[1].dir_name(), Some("LCR-8879"));
    }

    #[test]
    fn flushes_trailing_record_without_final_blank_line() {
        let output = "worktree /trees/main\nbranch refs/heads/main";
        let worktrees = parse_worktree_list(output).unwrap();
        assert_eq!(worktrees.len(), 1);
        assert_eq!(worktrees[0].branch.as_deref(), Some("main"));
    }

    #[test]
    fn detached_worktree_has_no_branch() {
        let output = "worktree /trees/exp\nHEAD abc123\ndetached\n";
        let worktrees = parse_worktree_list(output).unwrap();
        assert_eq!(worktrees.len(), 1);
        assert_eq!(worktrees[0].branch, None);
    }

    #[test]
    fn empty_output_parses_to_empty_list() {
        assert!(parse_worktree_list("").unwrap().is_empty());
    }

    #[test]
    fn remote_branch_list_skips_head() {
        let branches = parse_remote_branches("HEAD\nmain\nfeat/one\n");
        assert_eq!(branches, vec!["main", "feat/one"]);
    }

    #[test]
    fn activity_list_parses_unix_timestamps() {
        let branches =
            parse_remote_branches_with_activity("main 1700000000\nfeat/one 1700000100\n");
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].name, "main");
        assert_eq!(branches[1].last_commit.timestamp(), 1_700_000_100);
    }

    #[test]
    fn activity_list_skips_malformed_lines() {
        let branches = parse_remote_branches_with_activity("main notanumber\nfeat 1700000000\n");
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, "feat");
    }

    #[test]
    fn symref_head_finds_default_branch() {
        let output = "ref: refs/heads/main\tHEAD\nabc123\tHEAD\n";
        assert_eq!(parse_symref_head(output).as_deref(), Some("main"));
    }

    #[test]
    fn symref_head_missing_returns_none() {
        assert_eq!(parse_symref_head("abc123\tHEAD\n"), None);
    }
}
