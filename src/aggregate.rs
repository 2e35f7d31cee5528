use crate::model::{AuthorStatistics, ChangeRecord, TimeWindow};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;

/// `(author, window_label)` buckets. Records inside a bucket keep the order
/// the provider produced them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowedStats {
    buckets: BTreeMap<(String, String), AuthorStatistics>,
}

impl WindowedStats {
    pub fn get(&self, author: &str, window: &str) -> Option<&AuthorStatistics> {
        self.buckets.get(&(author.to_string(), window.to_string()))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuthorStatistics> {
        self.buckets.values()
    }

    /// Buckets of one window, largest contribution first, author name as
    /// tiebreak.
    pub fn ranked(&self, window: &str) -> Vec<&AuthorStatistics> {
        let mut stats: Vec<_> = self.buckets.values().filter(|s| s.window == window).collect();
        stats.sort_by(|a, b| {
            b.line_changes
                .cmp(&a.line_changes)
                .then_with(|| a.author.cmp(&b.author))
        });
        stats
    }

    pub fn window_total(&self, window: &str) -> u64 {
        self.buckets
            .values()
            .filter(|s| s.window == window)
            .map(|s| s.line_changes)
            .sum()
    }
}

/// Credit every record to each window whose `[start, now]` range holds its
/// timestamp. Windows may overlap, so one record can land in several
/// windows, but never twice in the same one. Records outside every window
/// are dropped.
pub fn aggregate(records: &[ChangeRecord], windows: &[TimeWindow], now: DateTime<Local>) -> WindowedStats {
    let mut buckets: BTreeMap<(String, String), AuthorStatistics> = BTreeMap::new();

    for record in records {
        for window in windows {
            if !window.contains(&record.timestamp, &now) {
                continue;
            }
            buckets
                .entry((record.author.clone(), window.label.clone()))
                .or_insert_with(|| AuthorStatistics::new(record.author.clone(), window.label.clone()))
                .add(record);
        }
    }

    WindowedStats { buckets }
}
