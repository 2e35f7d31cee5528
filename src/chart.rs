use crate::error::{Result, WatchError};
use crate::model::{AuthorSeries, ChangeRecord, DailySeries, SeriesKind};
use crate::util::day_key;
use chrono::NaiveDate;
use plotters::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const TABLEAU: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

/// Git path: insertions as positive and deletions as negative values per
/// author per day.
pub fn line_series(records: &[ChangeRecord]) -> DailySeries {
    let mut insertions: BTreeMap<String, BTreeMap<NaiveDate, i64>> = BTreeMap::new();
    let mut deletions: BTreeMap<String, BTreeMap<NaiveDate, i64>> = BTreeMap::new();
    for record in records {
        let day = day_key(&record.timestamp);
        *insertions
            .entry(record.author.clone())
            .or_default()
            .entry(day)
            .or_insert(0) += record.insertions as i64;
        *deletions
            .entry(record.author.clone())
            .or_default()
            .entry(day)
            .or_insert(0) -= record.deletions as i64;
    }

    let dates: Vec<NaiveDate> = insertions
        .values()
        .flat_map(|days| days.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut series = Vec::new();
    for (author, days) in &insertions {
        series.push(AuthorSeries {
            author: author.clone(),
            kind: SeriesKind::Insertions,
            values: dates.iter().map(|d| days.get(d).copied().unwrap_or(0)).collect(),
        });
        let removed = deletions.get(author);
        series.push(AuthorSeries {
            author: author.clone(),
            kind: SeriesKind::Deletions,
            values: dates
                .iter()
                .map(|d| removed.and_then(|m| m.get(d)).copied().unwrap_or(0))
                .collect(),
        });
    }

    DailySeries { dates, series }
}

/// Docs path: signed net word deltas per author per day. Negative days are
/// kept as they are.
pub fn word_series(daily: &BTreeMap<String, BTreeMap<NaiveDate, i64>>) -> DailySeries {
    let dates: Vec<NaiveDate> = daily
        .values()
        .flat_map(|days| days.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let series = daily
        .iter()
        .map(|(author, days)| AuthorSeries {
            author: author.clone(),
            kind: SeriesKind::Words,
            values: dates.iter().map(|d| days.get(d).copied().unwrap_or(0)).collect(),
        })
        .collect();

    DailySeries { dates, series }
}

/// Positive values stack upward from zero and negative values downward, each
/// day independently.
fn stacked_bars(daily: &DailySeries) -> Vec<(usize, i32, i64, i64)> {
    let mut up = vec![0i64; daily.dates.len()];
    let mut down = vec![0i64; daily.dates.len()];
    let mut bars = Vec::new();
    for (index, series) in daily.series.iter().enumerate() {
        for (day, &value) in series.values.iter().enumerate() {
            if value == 0 {
                continue;
            }
            let base = if value > 0 { &mut up[day] } else { &mut down[day] };
            let from = *base;
            *base += value;
            bars.push((index, day as i32, from, *base));
        }
    }
    bars
}

fn y_range(bars: &[(usize, i32, i64, i64)]) -> (i64, i64) {
    let low = bars.iter().map(|b| b.2.min(b.3)).min().unwrap_or(0).min(0);
    let high = bars.iter().map(|b| b.2.max(b.3)).max().unwrap_or(0).max(0);
    let pad = ((high - low) / 10).max(1);
    (low - pad, high + pad)
}

fn series_color(daily: &DailySeries, series: &AuthorSeries) -> RGBAColor {
    let authors: BTreeSet<&str> = daily.series.iter().map(|s| s.author.as_str()).collect();
    let position = authors.iter().position(|a| *a == series.author).unwrap_or(0);
    let base = TABLEAU[position % TABLEAU.len()];
    match series.kind {
        SeriesKind::Deletions => base.mix(0.6),
        SeriesKind::Insertions | SeriesKind::Words => base.mix(1.0),
    }
}

fn series_label(series: &AuthorSeries) -> String {
    match series.kind {
        SeriesKind::Insertions => format!("{} (Insertions)", series.author),
        SeriesKind::Deletions => format!("{} (Deletions)", series.author),
        SeriesKind::Words => series.author.clone(),
    }
}

/// Draw a stacked daily bar chart to `path` as SVG.
pub fn render(daily: &DailySeries, title: &str, y_label: &str, path: &Path) -> Result<()> {
    let chart_err = |e: &dyn std::fmt::Display| WatchError::Chart(e.to_string());

    let bars = stacked_bars(daily);
    let (y_min, y_max) = y_range(&bars);
    let days = daily.dates.len().max(1) as i32;

    let root = SVGBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| chart_err(&e))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(0..days, y_min..y_max)
        .map_err(|e| chart_err(&e))?;

    let dates = daily.dates.clone();
    let format_day = move |x: &i32| {
        usize::try_from(*x)
            .ok()
            .and_then(|i| dates.get(i))
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    };
    chart
        .configure_mesh()
        .x_labels(daily.dates.len().clamp(1, 12))
        .x_label_formatter(&format_day)
        .x_desc("Date")
        .y_desc(y_label)
        .draw()
        .map_err(|e| chart_err(&e))?;

    for (index, series) in daily.series.iter().enumerate() {
        let color = series_color(daily, series);
        let rects = bars
            .iter()
            .filter(|bar| bar.0 == index)
            .map(move |&(_, day, from, to)| Rectangle::new([(day, from), (day + 1, to)], color.filled()));
        chart
            .draw_series(rects)
            .map_err(|e| chart_err(&e))?
            .label(series_label(series))
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(|e| chart_err(&e))?;

    root.present().map_err(|e| chart_err(&e))?;
    Ok(())
}

/// A fresh, collision-free chart path under `dir`.
pub fn chart_path(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.join(format!("repo_stats_{}.svg", uuid::Uuid::new_v4().simple())))
}
