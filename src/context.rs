use crate::config::{resolve_windows, Credentials, Settings};
use crate::docs::Throttle;
use crate::error::Result;
use crate::model::TimeWindow;
use chrono::{DateTime, Local};

/// Per-run state handed to every component that needs credentials, paths
/// or the run clock. Built once in the CLI.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub settings: Settings,
    pub credentials: Credentials,
    pub now: DateTime<Local>,
    pub windows: Vec<TimeWindow>,
    /// Spaces out every Drive request of the run, across documents.
    pub throttle: Throttle,
}

impl RunContext {
    pub fn new(settings: Settings, credentials: Credentials, now: DateTime<Local>) -> Result<Self> {
        let windows = resolve_windows(&settings.windows, now)?;
        let throttle = Throttle::new(settings.request_spacing);
        Ok(Self {
            settings,
            credentials,
            now,
            windows,
            throttle,
        })
    }

    pub fn report_date(&self) -> String {
        self.now.format("%Y-%m-%d").to_string()
    }
}
