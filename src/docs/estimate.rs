use super::RevisionSource;
use crate::model::{DriveRevision, DriveRevisionEvent};
use crate::util::count_words;
use chrono::{Local, NaiveDate};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Keeps consecutive calls at least `min_spacing` apart. The first call
/// goes through immediately. One instance is shared by every Drive call of
/// a run.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_spacing: Duration,
    last: Cell<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last: Cell::new(None),
        }
    }

    pub fn wait(&self) {
        if let Some(last) = self.last.get() {
            let elapsed = last.elapsed();
            if elapsed < self.min_spacing {
                std::thread::sleep(self.min_spacing - elapsed);
            }
        }
        self.last.set(Some(Instant::now()));
    }
}

/// Per-revision word deltas for one document, oldest revision first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordContributions {
    pub events: Vec<DriveRevisionEvent>,
}

impl WordContributions {
    /// Signed net delta per author email per local day.
    pub fn by_author_day(&self) -> BTreeMap<String, BTreeMap<NaiveDate, i64>> {
        let mut out: BTreeMap<String, BTreeMap<NaiveDate, i64>> = BTreeMap::new();
        for event in &self.events {
            let Some(modified) = event.revision.modified else {
                continue;
            };
            let author = event
                .revision
                .author_email
                .clone()
                .unwrap_or_else(|| crate::model::UNKNOWN_EMAIL.to_string());
            *out.entry(author)
                .or_default()
                .entry(modified.with_timezone(&Local).date_naive())
                .or_insert(0) += event.word_delta;
        }
        out
    }

    /// Sum of positive per-revision deltas per author; shrinking edits do
    /// not subtract.
    pub fn clamped_totals(&self) -> BTreeMap<String, u64> {
        let mut out: BTreeMap<String, u64> = BTreeMap::new();
        for event in &self.events {
            let author = event
                .revision
                .author_email
                .clone()
                .unwrap_or_else(|| crate::model::UNKNOWN_EMAIL.to_string());
            *out.entry(author).or_insert(0) += event.word_delta.max(0) as u64;
        }
        out
    }
}

/// Word-count deltas between successive snapshots of `doc_id`.
///
/// Revisions are sorted oldest first before diffing, whatever order the
/// listing returned. A failed snapshot fetch records nothing and leaves the
/// previous snapshot in place, so the next successful revision is diffed
/// against the last good text and its author is credited with every edit
/// made since then.
pub fn estimate(
    source: &dyn RevisionSource,
    doc_id: &str,
    revisions: &[DriveRevision],
    throttle: &Throttle,
) -> WordContributions {
    let mut ordered: Vec<&DriveRevision> = revisions
        .iter()
        .filter(|rev| {
            if rev.modified.is_none() {
                debug!(revision = %rev.id, "skipping revision without a modification time");
            }
            rev.modified.is_some()
        })
        .collect();
    ordered.sort_by_key(|rev| rev.modified);

    let mut contributions = WordContributions::default();
    let mut prev_words = 0usize;

    for revision in ordered {
        throttle.wait();
        let text = match source.fetch_text(doc_id, &revision.id) {
            Ok(text) => text,
            Err(e) => {
                warn!(document = doc_id, revision = %revision.id, error = %e, "revision text unavailable, skipping");
                continue;
            }
        };

        let words = count_words(&text);
        let word_delta = words as i64 - prev_words as i64;
        debug!(revision = %revision.id, words, word_delta, "revision diffed");
        contributions.events.push(DriveRevisionEvent {
            revision: revision.clone(),
            word_delta,
        });
        prev_words = words;
    }

    contributions
}
