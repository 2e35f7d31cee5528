use crate::config::{Credentials, RepositoryConfig, Settings};
use crate::context::RunContext;
use crate::docs::{DriveApi, DriveClient, RevisionSource};
use crate::git::GixTransport;
use crate::lock::RunLock;
use crate::notify::{MailTransport, SmtpMailer};
use crate::run::{run, Providers};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "contribwatch")]
#[command(about = "Per-author contribution reports for Git repositories and Google Docs")]
#[command(version)]
pub struct Cli {
    #[arg(short, long, help = "Send reports by email instead of printing them")]
    pub notify: bool,

    #[arg(long, default_value = "repositories.json", help = "Repository configuration file")]
    pub config: PathBuf,

    #[arg(long, default_value = "auth.json", help = "Credentials file")]
    pub auth: PathBuf,

    #[arg(long, default_value = "git_repos", help = "Directory holding local working copies")]
    pub repos_dir: PathBuf,

    #[arg(long, default_value = "images", help = "Directory for generated charts")]
    pub images_dir: PathBuf,

    #[arg(
        long,
        default_value = "5s",
        value_parser = humantime::parse_duration,
        help = "Minimum spacing between document revision downloads"
    )]
    pub request_spacing: Duration,

    #[arg(long, value_enum, default_value = "v2", help = "Drive API used to list revisions first")]
    pub drive_api: DriveApi,

    #[arg(short, long, help = "Verbose logging")]
    pub verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "contribwatch=debug" } else { "contribwatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        init_tracing(self.verbose);

        let config = RepositoryConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        let credentials = Credentials::load(&self.auth)
            .with_context(|| format!("loading {}", self.auth.display()))?;

        let mailer = if self.notify {
            let Some(smtp) = credentials.email.as_ref() else {
                bail!("--notify needs an \"email\" section in {}", self.auth.display());
            };
            Some(SmtpMailer::new(smtp)?)
        } else {
            None
        };

        let drive = credentials
            .google_service_account
            .clone()
            .map(|key| DriveClient::new(key).with_api(self.drive_api));
        if drive.is_none() && config.repositories.iter().any(|r| r.is_document()) {
            warn!("no google_service_account credentials; documents will be skipped");
        }

        let settings = Settings {
            repos_dir: self.repos_dir,
            images_dir: self.images_dir,
            request_spacing: self.request_spacing,
            windows: config.windows.clone(),
        };
        let lock = RunLock::acquire(&settings.repos_dir)?;
        debug!(path = %lock.path().display(), "run lock held");
        let ctx = RunContext::new(settings, credentials, chrono::Local::now())?;

        info!(
            repositories = config.repositories.len(),
            notify = self.notify,
            "starting run"
        );

        let transport = GixTransport;
        let providers = Providers {
            git: &transport,
            docs: drive.as_ref().map(|d| d as &dyn RevisionSource),
            mailer: mailer.as_ref().map(|m| m as &dyn MailTransport),
        };
        let stdout = std::io::stdout();
        run(&ctx, &config.repositories, &providers, &mut stdout.lock())?;
        drop(lock);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides_parse() {
        let cli = Cli::try_parse_from(["contribwatch"]).unwrap();
        assert!(!cli.notify);
        assert_eq!(cli.config, PathBuf::from("repositories.json"));
        assert_eq!(cli.request_spacing, Duration::from_secs(5));
        assert_eq!(cli.drive_api, DriveApi::V2);

        let args = ["contribwatch", "-n", "--request-spacing", "250ms", "--drive-api", "v3"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.notify);
        assert_eq!(cli.request_spacing, Duration::from_millis(250));
        assert_eq!(cli.drive_api, DriveApi::V3);
    }
}
