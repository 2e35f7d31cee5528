use crate::config::GitCredentials;
use crate::error::{ConfigError, FetchError};
use crate::model::{AuthKind, RepositoryDescriptor};
use crate::util::redact_url;
use gix::remote::Direction;
use std::path::Path;
use tracing::info;

/// Reflog entries written by fetch need a committer. Service accounts often
/// have none configured, so the run supplies one.
const COMMITTER_OVERRIDES: [&str; 2] = [
    "committer.name=contribwatch",
    "committer.email=contribwatch@localhost",
];

/// Brings a local working copy at `local_path` up to date with `url`.
pub trait GitTransport {
    fn sync(&self, url: &str, local_path: &Path) -> Result<(), FetchError>;
}

/// Remote URL to use for a Git-backed descriptor. Token-authenticated
/// remotes get `username:token@` spliced in after the scheme.
pub fn remote_url(
    descriptor: &RepositoryDescriptor,
    credentials: Option<&GitCredentials>,
) -> Result<String, ConfigError> {
    let url = descriptor.url.trim();
    let Some(rest) = url.strip_prefix("https://") else {
        return Err(ConfigError::NotHttps {
            name: descriptor.name.clone(),
            url: url.to_string(),
        });
    };

    match descriptor.auth_kind {
        AuthKind::Overleaf => {
            let creds = credentials.ok_or_else(|| ConfigError::MissingCredentials {
                name: descriptor.name.clone(),
                what: "git token",
            })?;
            Ok(format!("https://{}:{}@{rest}", creds.username, creds.token))
        }
        AuthKind::GithubPublic => Ok(url.to_string()),
        AuthKind::GoogleServiceAccount => Err(ConfigError::AuthMismatch {
            name: descriptor.name.clone(),
            kind: descriptor.kind.to_string(),
            auth: descriptor.auth_kind.to_string(),
        }),
    }
}

/// Blocking clone/fetch over HTTPS through `gix`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GixTransport;

impl GixTransport {
    fn clone_into(&self, url: &str, local_path: &Path) -> Result<(), FetchError> {
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FetchError::Transport(e.to_string()))?;
        }
        let mut prepare = gix::prepare_clone(url, local_path)
            .map_err(|e| FetchError::Transport(format!("clone setup: {e}")))?
            .with_in_memory_config_overrides(COMMITTER_OVERRIDES);
        let (mut checkout, _) = prepare
            .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| FetchError::Transport(format!("clone fetch: {e}")))?;
        checkout
            .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| FetchError::Transport(format!("checkout: {e}")))?;
        Ok(())
    }

    fn fetch_into(&self, url: &str, local_path: &Path) -> Result<(), FetchError> {
        let options = gix::open::Options::default().config_overrides(COMMITTER_OVERRIDES);
        let repo = gix::open_opts(local_path, options)
            .map_err(|e| FetchError::Transport(format!("open {}: {e}", local_path.display())))?;
        // The URL may carry a fresh token, so fetch from it directly rather
        // than from the stored `origin` URL.
        let remote = repo
            .remote_at(url)
            .map_err(|e| FetchError::Transport(format!("remote: {e}")))?
            .with_refspecs(Some("+refs/heads/*:refs/remotes/origin/*"), Direction::Fetch)
            .map_err(|e| FetchError::Transport(format!("refspec: {e}")))?;
        remote
            .connect(Direction::Fetch)
            .map_err(|e| FetchError::Transport(format!("connect: {e}")))?
            .prepare_fetch(gix::progress::Discard, Default::default())
            .map_err(|e| FetchError::Transport(format!("negotiate: {e}")))?
            .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| FetchError::Transport(format!("fetch: {e}")))?;
        Ok(())
    }
}

impl GitTransport for GixTransport {
    fn sync(&self, url: &str, local_path: &Path) -> Result<(), FetchError> {
        if local_path.exists() {
            info!(remote = %redact_url(url), path = %local_path.display(), "fetching latest changes");
            self.fetch_into(url, local_path)
        } else {
            info!(remote = %redact_url(url), path = %local_path.display(), "cloning repository");
            self.clone_into(url, local_path)
        }
    }
}
