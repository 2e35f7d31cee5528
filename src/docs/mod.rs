pub mod drive;
pub mod estimate;

pub use drive::{DriveApi, DriveClient};
pub use estimate::{estimate, Throttle, WordContributions};

use crate::error::{ConfigError, FetchError};
use crate::model::{AuthKind, DriveRevision, RepositoryDescriptor};

/// Revision metadata listing and plaintext snapshots of a document.
pub trait RevisionSource {
    fn list_revisions(&self, doc_id: &str) -> Result<Vec<DriveRevision>, FetchError>;
    fn fetch_text(&self, doc_id: &str, revision_id: &str) -> Result<String, FetchError>;
}

/// Document id from either a bare id or a `docs.google.com/document/d/<id>/...` link.
pub fn document_id(descriptor: &RepositoryDescriptor) -> Result<String, ConfigError> {
    if descriptor.auth_kind != AuthKind::GoogleServiceAccount {
        return Err(ConfigError::AuthMismatch {
            name: descriptor.name.clone(),
            kind: descriptor.kind.to_string(),
            auth: descriptor.auth_kind.to_string(),
        });
    }

    let url = descriptor.url.trim();
    let candidate = match url.split_once("/d/") {
        Some((_, rest)) => rest.split(['/', '?', '#']).next().unwrap_or(""),
        None if !url.contains('/') => url,
        None => "",
    };

    let valid = !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(candidate.to_string())
    } else {
        Err(ConfigError::BadDocumentUrl {
            name: descriptor.name.clone(),
            url: url.to_string(),
        })
    }
}
