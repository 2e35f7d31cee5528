use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

pub type Address = String;

/// Author placeholder for commits without an author name.
pub const UNKNOWN_AUTHOR: &str = "Unknown";
/// Author placeholder for document revisions without a modifying user email.
pub const UNKNOWN_EMAIL: &str = "Unknown Email";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryKind {
    Overleaf,
    Github,
    GoogleDoc,
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepositoryKind::Overleaf => "Overleaf",
            RepositoryKind::Github => "Github",
            RepositoryKind::GoogleDoc => "GoogleDoc",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthKind {
    Overleaf,
    GithubPublic,
    GoogleServiceAccount,
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthKind::Overleaf => "Overleaf",
            AuthKind::GithubPublic => "GithubPublic",
            AuthKind::GoogleServiceAccount => "GoogleServiceAccount",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifySpec {
    #[serde(rename = "TO", alias = "to", default)]
    pub to: BTreeSet<Address>,
    #[serde(rename = "CC", alias = "cc", default)]
    pub cc: BTreeSet<Address>,
    #[serde(rename = "Reply-to", alias = "reply_to", default)]
    pub reply_to: BTreeSet<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    #[serde(rename = "type")]
    pub kind: RepositoryKind,
    #[serde(rename = "auth")]
    pub auth_kind: AuthKind,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub notify: NotifySpec,
}

impl RepositoryDescriptor {
    pub fn is_document(&self) -> bool {
        self.kind == RepositoryKind::GoogleDoc
    }
}

/// Raw per-commit data as read from a Git history walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommitEvent {
    pub id: String,
    pub author_name: Option<String>,
    pub committed_seconds: Option<i64>,
    pub insertions: Option<u64>,
    pub deletions: Option<u64>,
    pub message: String,
}

/// Revision metadata as returned by a Drive revisions listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveRevision {
    pub id: String,
    pub modified: Option<DateTime<Utc>>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub size: Option<u64>,
}

/// One document revision together with the word delta the estimator
/// computed against the last successfully fetched snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveRevisionEvent {
    pub revision: DriveRevision,
    pub word_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawChangeEvent {
    GitCommit(GitCommitEvent),
    DriveRevision(DriveRevisionEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub author: String,
    pub timestamp: DateTime<Local>,
    pub insertions: u64,
    pub deletions: u64,
    pub message: String,
}

impl ChangeRecord {
    pub fn magnitude(&self) -> u64 {
        self.insertions + self.deletions
    }
}

/// A named interval from `start` up to the aggregation instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Local>,
    pub label: String,
}

impl TimeWindow {
    pub fn new(label: impl Into<String>, start: DateTime<Local>) -> Self {
        Self {
            start,
            label: label.into(),
        }
    }

    pub fn contains(&self, timestamp: &DateTime<Local>, now: &DateTime<Local>) -> bool {
        &self.start <= timestamp && timestamp <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorStatistics {
    pub author: String,
    pub window: String,
    pub line_changes: u64,
    pub changes: Vec<ChangeRecord>,
}

impl AuthorStatistics {
    pub fn new(author: String, window: String) -> Self {
        Self {
            author,
            window,
            line_changes: 0,
            changes: Vec::new(),
        }
    }

    pub fn add(&mut self, record: &ChangeRecord) {
        self.line_changes += record.magnitude();
        self.changes.push(record.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeUnit {
    Lines,
    Words,
}

/// Per-author, per-day series used for charting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailySeries {
    pub dates: Vec<NaiveDate>,
    pub series: Vec<AuthorSeries>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Insertions,
    Deletions,
    Words,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorSeries {
    pub author: String,
    pub kind: SeriesKind,
    pub values: Vec<i64>,
}

/// Everything computed for one repository during a run.
#[derive(Debug, Clone)]
pub struct RepoStats {
    pub unit: ChangeUnit,
    pub records: Vec<ChangeRecord>,
    pub daily: DailySeries,
    pub body: String,
}

/// A configured repository plus whatever the run managed to compute for it.
#[derive(Debug, Clone)]
pub struct RepositoryReport {
    pub descriptor: RepositoryDescriptor,
    pub stats: Option<RepoStats>,
    pub attachments: BTreeSet<PathBuf>,
}

impl RepositoryReport {
    pub fn skipped(descriptor: RepositoryDescriptor) -> Self {
        Self {
            descriptor,
            stats: None,
            attachments: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationPlan {
    pub body: String,
    pub cc: BTreeSet<Address>,
    pub reply_to: BTreeSet<Address>,
    pub attachments: BTreeSet<PathBuf>,
}

impl NotificationPlan {
    /// Set-valued fields are unioned; the body is appended.
    pub fn merge(&mut self, other: &NotificationPlan) {
        self.cc.extend(other.cc.iter().cloned());
        self.reply_to.extend(other.reply_to.iter().cloned());
        self.attachments.extend(other.attachments.iter().cloned());
        self.append_body(&other.body);
    }

    pub fn append_body(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.body.is_empty() {
            self.body.push('\n');
        }
        self.body.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn descriptor_reads_config_layout() {
        let json = r#"{
            "type": "Overleaf",
            "auth": "Overleaf",
            "name": "Article Project A",
            "url": "https://git.overleaf.com/abc",
            "notify": {
                "TO": ["studentA@university.edu"],
                "CC": ["facultyB@university.edu", "facultyB@university.edu"],
                "Reply-to": ["facultyB@university.edu"]
            }
        }"#;
        let d: RepositoryDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.kind, RepositoryKind::Overleaf);
        assert_eq!(d.auth_kind, AuthKind::Overleaf);
        assert_eq!(d.notify.cc.len(), 1);
        assert!(d.notify.to.contains("studentA@university.edu"));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let start = Local.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let now = Local.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let w = TimeWindow::new("Daily", start);
        assert!(w.contains(&start, &now));
        assert!(w.contains(&now, &now));
        assert!(!w.contains(&(start - chrono::Duration::seconds(1)), &now));
        assert!(!w.contains(&(now + chrono::Duration::seconds(1)), &now));
    }

    #[test]
    fn plan_merge_is_idempotent_for_sets() {
        let mut a = NotificationPlan::default();
        a.cc.insert("f1@example.edu".into());
        let snapshot = a.clone();
        a.merge(&snapshot);
        assert_eq!(a.cc, snapshot.cc);
        assert_eq!(a.reply_to, snapshot.reply_to);
        assert_eq!(a.attachments, snapshot.attachments);
    }
}
