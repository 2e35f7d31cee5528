use crate::error::{Result, WatchError};
use crate::model::GitCommitEvent;
use gix::object::tree::diff::ChangeDetached;
use gix::{ObjectId, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use similar::{ChangeTag, TextDiff};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use tracing::debug;

pub struct GitRepo {
    repo: Repository,
}

impl GitRepo {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = gix::open(path.as_ref())?;
        Ok(Self { repo })
    }

    /// Tip of the history to report on: the remote default branch when the
    /// last fetch recorded one, else the remote counterpart of the checked
    /// out branch, else `HEAD`.
    pub fn history_tip(&self) -> Result<ObjectId> {
        let mut candidates = vec!["refs/remotes/origin/HEAD".to_string()];
        if let Ok(Some(head)) = self.repo.head_name() {
            candidates.push(format!("refs/remotes/origin/{}", head.shorten()));
        }

        for name in &candidates {
            if let Ok(Some(mut reference)) = self.repo.try_find_reference(name.as_str()) {
                if let Ok(id) = reference.peel_to_id_in_place() {
                    debug!(reference = %name, "history tip");
                    return Ok(id.detach());
                }
            }
        }

        let mut head = self
            .repo
            .head()
            .map_err(|e| WatchError::GitRepo(format!("cannot read HEAD: {e}")))?;
        let commit = head
            .peel_to_commit_in_place()
            .map_err(|e| WatchError::GitRepo(format!("HEAD does not point to a commit: {e}")))?;
        Ok(commit.id)
    }

    /// Every commit reachable from `tip`, in walk order (tip first), with
    /// totals against the first parent.
    pub fn collect_commits(&self, tip: ObjectId) -> Result<Vec<GitCommitEvent>> {
        let mut commits = Vec::new();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut stack: VecDeque<ObjectId> = VecDeque::from([tip]);

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} {pos}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Walking history...");

        while let Some(commit_id) = stack.pop_back() {
            if !seen.insert(commit_id) {
                continue;
            }

            let commit = self.repo.find_commit(commit_id)?;
            let committed_seconds = commit.time().ok().map(|t| t.seconds);
            let parents: Vec<ObjectId> = commit.parent_ids().map(|id| id.into()).collect();

            let author_name = commit
                .author()
                .ok()
                .map(|a| a.name.to_string())
                .filter(|name| !name.trim().is_empty());
            let message = commit
                .message_raw()
                .map(|m| m.to_string().trim().to_string())
                .unwrap_or_default();

            let (insertions, deletions) = match self.diff_totals(commit_id, parents.first().copied()) {
                Ok((added, deleted)) => (Some(added), Some(deleted)),
                Err(e) => {
                    debug!(commit = %commit_id, error = %e, "no diff stats");
                    (None, None)
                }
            };

            commits.push(GitCommitEvent {
                id: commit_id.to_string(),
                author_name,
                committed_seconds,
                insertions,
                deletions,
                message,
            });

            for pid in parents.into_iter().rev() {
                stack.push_back(pid);
            }

            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(commits)
    }

    fn diff_totals(&self, commit_id: ObjectId, parent_id: Option<ObjectId>) -> Result<(u64, u64)> {
        let commit_tree = self.repo.find_commit(commit_id)?.tree()?;
        let changes: Vec<ChangeDetached> = match parent_id {
            Some(parent_id) => {
                let parent_tree = self.repo.find_commit(parent_id)?.tree()?;
                self.repo
                    .diff_tree_to_tree(Some(&parent_tree), Some(&commit_tree), None)?
            }
            None => self.repo.diff_tree_to_tree(None, Some(&commit_tree), None)?,
        };

        let mut totals = (0u64, 0u64);
        for change in changes {
            let (added, deleted) = self.change_totals(change);
            totals.0 += added;
            totals.1 += deleted;
        }
        Ok(totals)
    }

    fn change_totals(&self, change: ChangeDetached) -> (u64, u64) {
        match change {
            ChangeDetached::Addition { id, .. } => match self.blob_text(id) {
                Some(text) => (text.lines().count() as u64, 0),
                None => (0, 0),
            },
            ChangeDetached::Deletion { id, .. } => match self.blob_text(id) {
                Some(text) => (0, text.lines().count() as u64),
                None => (0, 0),
            },
            ChangeDetached::Modification { previous_id, id, .. } => {
                self.line_diff(previous_id, id)
            }
            ChangeDetached::Rewrite { source_id, id, .. } => self.line_diff(source_id, id),
        }
    }

    /// Text of a blob, or `None` for binary or unreadable objects, which
    /// count as zero changed lines.
    fn blob_text(&self, id: ObjectId) -> Option<String> {
        let object = self.repo.find_object(id).ok()?;
        let data = object.data.as_slice();
        if data.iter().take(8192).any(|&b| b == 0) {
            return None;
        }
        std::str::from_utf8(data).ok().map(str::to_owned)
    }

    fn line_diff(&self, old_id: ObjectId, new_id: ObjectId) -> (u64, u64) {
        let (Some(old_text), Some(new_text)) = (self.blob_text(old_id), self.blob_text(new_id)) else {
            return (0, 0);
        };
        count_line_changes(&old_text, &new_text)
    }
}

pub fn count_line_changes(old_text: &str, new_text: &str) -> (u64, u64) {
    let diff = TextDiff::from_lines(old_text, new_text);
    let mut added = 0u64;
    let mut deleted = 0u64;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => deleted += 1,
            ChangeTag::Equal => {}
        }
    }
    (added, deleted)
}
