use crate::error::{ConfigError, Result, WatchError};
use crate::model::{RepositoryDescriptor, TimeWindow};
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RepositoryFile {
    Bare(Vec<serde_json::Value>),
    Full {
        repositories: Vec<serde_json::Value>,
        #[serde(default)]
        windows: Option<Vec<WindowSpec>>,
    },
}

/// Either a rolling window (`days` back from now) or a fixed start.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WindowSpec {
    Rolling { label: String, days: u32 },
    Since { label: String, since: String },
}

impl WindowSpec {
    pub fn label(&self) -> &str {
        match self {
            WindowSpec::Rolling { label, .. } | WindowSpec::Since { label, .. } => label,
        }
    }

    pub fn resolve(&self, now: DateTime<Local>) -> Result<TimeWindow> {
        match self {
            WindowSpec::Rolling { label, days } => {
                let start = Duration::try_days(i64::from(*days))
                    .and_then(|span| now.checked_sub_signed(span))
                    .ok_or_else(|| {
                        WatchError::InvalidDate(format!("window '{label}': {days} days is out of range"))
                    })?;
                Ok(TimeWindow::new(label.clone(), start))
            }
            WindowSpec::Since { label, since } => {
                Ok(TimeWindow::new(label.clone(), parse_date(since, now)?))
            }
        }
    }
}

pub fn default_windows() -> Vec<WindowSpec> {
    [("Daily", 1), ("Weekly", 7), ("Monthly", 30), ("Yearly", 365)]
        .into_iter()
        .map(|(label, days)| WindowSpec::Rolling {
            label: label.to_string(),
            days,
        })
        .collect()
}

/// Resolve window specs against `now`, dropping repeated labels so that a
/// `(author, label)` bucket is fed by exactly one window.
pub fn resolve_windows(specs: &[WindowSpec], now: DateTime<Local>) -> Result<Vec<TimeWindow>> {
    let mut seen = HashSet::new();
    let mut windows = Vec::with_capacity(specs.len());
    for spec in specs {
        if !seen.insert(spec.label().to_string()) {
            warn!(label = spec.label(), "duplicate window label ignored");
            continue;
        }
        windows.push(spec.resolve(now)?);
    }
    Ok(windows)
}

fn parse_date(input: &str, now: DateTime<Local>) -> Result<DateTime<Local>> {
    // RFC3339
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Local));
    }

    // YYYY-MM-DD, local midnight
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(local) = date
            .and_hms_opt(0, 0, 0)
            .and_then(|dt| Local.from_local_datetime(&dt).earliest())
        {
            return Ok(local);
        }
    }

    // "3 days ago", "2 weeks ago"
    if let Some(duration) = parse_natural_duration(input) {
        return now.checked_sub_signed(duration).ok_or_else(|| {
            WatchError::InvalidDate(format!("'{input}' reaches past the supported date range"))
        });
    }

    Err(WatchError::InvalidDate(format!(
        "'{input}' is not RFC3339, YYYY-MM-DD or '<n> days|weeks|months ago'"
    )))
}

fn parse_natural_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_lowercase();

    if let Some(days) = input.strip_suffix(" days ago") {
        let n = days.trim().parse::<i64>().ok()?;
        return Duration::try_days(n);
    }

    if let Some(weeks) = input.strip_suffix(" weeks ago") {
        let n = weeks.trim().parse::<i64>().ok()?;
        return Duration::try_weeks(n);
    }

    if let Some(months) = input.strip_suffix(" months ago") {
        let n = months.trim().parse::<i64>().ok()?;
        return n.checked_mul(30).and_then(Duration::try_days);
    }

    None
}

#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub repositories: Vec<RepositoryDescriptor>,
    pub windows: Vec<WindowSpec>,
}

impl RepositoryConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: RepositoryFile = serde_json::from_str(content)?;
        let (entries, windows) = match file {
            RepositoryFile::Bare(entries) => (entries, None),
            RepositoryFile::Full { repositories, windows } => (repositories, windows),
        };
        let windows = windows.unwrap_or_else(default_windows);
        if windows.is_empty() {
            return Err(ConfigError::Invalid("at least one time window is required".into()).into());
        }
        let repositories = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| descriptor(index, entry))
            .collect();
        Ok(Self { repositories, windows })
    }
}

/// A malformed entry only costs that repository.
fn descriptor(index: usize, entry: serde_json::Value) -> Option<RepositoryDescriptor> {
    let name = entry
        .get("name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string();
    match serde_json::from_value(entry) {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            warn!(index, repository = %name, error = %e, "repository entry ignored");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SmtpCredentials {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub sender_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitCredentials {
    pub username: String,
    pub token: String,
}

/// Google service-account key blob, as downloaded from the console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: Option<SmtpCredentials>,
    #[serde(default, alias = "overleaf")]
    pub git: Option<GitCredentials>,
    #[serde(default)]
    pub google_service_account: Option<ServiceAccountKey>,
}

impl Credentials {
    /// A missing file yields empty credentials; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "auth file not found, continuing without credentials");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub repos_dir: PathBuf,
    pub images_dir: PathBuf,
    pub request_spacing: std::time::Duration,
    pub windows: Vec<WindowSpec>,
}

impl Settings {
    pub fn clone_path(&self, descriptor: &RepositoryDescriptor) -> PathBuf {
        self.repos_dir.join(&descriptor.name)
    }
}
