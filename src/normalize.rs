//! Provider events to uniform `ChangeRecord`s.
//!
//! Git commits map one to one; their author falls back to "Unknown".
//! Drive revisions carry only a word delta: it becomes `insertions`
//! clamped at zero, and deletions are not tracked on that path.

use crate::model::{
    ChangeRecord, DriveRevisionEvent, GitCommitEvent, RawChangeEvent, UNKNOWN_AUTHOR, UNKNOWN_EMAIL,
};
use chrono::{Local, TimeZone};
use tracing::debug;

/// `None` when the event lacks a timestamp or a change magnitude.
pub fn normalize(event: &RawChangeEvent) -> Option<ChangeRecord> {
    match event {
        RawChangeEvent::GitCommit(commit) => normalize_commit(commit),
        RawChangeEvent::DriveRevision(revision) => normalize_revision(revision),
    }
}

pub fn normalize_all<'a, I>(events: I) -> Vec<ChangeRecord>
where
    I: IntoIterator<Item = &'a RawChangeEvent>,
{
    events.into_iter().filter_map(normalize).collect()
}

fn normalize_commit(commit: &GitCommitEvent) -> Option<ChangeRecord> {
    let Some(timestamp) = commit
        .committed_seconds
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
    else {
        debug!(commit = %commit.id, "skipping commit without a usable timestamp");
        return None;
    };
    let (Some(insertions), Some(deletions)) = (commit.insertions, commit.deletions) else {
        debug!(commit = %commit.id, "skipping commit without diff stats");
        return None;
    };

    Some(ChangeRecord {
        author: commit
            .author_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        timestamp,
        insertions,
        deletions,
        message: commit.message.clone(),
    })
}

fn normalize_revision(event: &DriveRevisionEvent) -> Option<ChangeRecord> {
    let revision = &event.revision;
    let Some(modified) = revision.modified else {
        debug!(revision = %revision.id, "skipping revision without a modification time");
        return None;
    };

    Some(ChangeRecord {
        author: revision
            .author_email
            .clone()
            .unwrap_or_else(|| UNKNOWN_EMAIL.to_string()),
        timestamp: modified.with_timezone(&Local),
        insertions: event.word_delta.max(0) as u64,
        deletions: 0,
        message: format!("Revision {}", revision.id),
    })
}
