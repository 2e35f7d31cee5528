use super::RevisionSource;
use crate::config::ServiceAccountKey;
use crate::error::FetchError;
use crate::model::DriveRevision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SCOPES: &str = "https://www.googleapis.com/auth/documents.readonly \
                      https://www.googleapis.com/auth/drive.file \
                      https://www.googleapis.com/auth/drive.metadata.readonly";
const DRIVE_V2: &str = "https://www.googleapis.com/drive/v2/files";
const DRIVE_V3: &str = "https://www.googleapis.com/drive/v3/files";
const EXPORT_URL: &str = "https://docs.google.com/feeds/download/documents/export/Export";
const TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_LIFETIME_SECS: i64 = 3600;

type Lister = fn(&DriveClient, &str) -> Result<Vec<DriveRevision>, FetchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DriveApi {
    V2,
    V3,
}

#[derive(Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ModifyingUser {
    display_name: Option<String>,
    email_address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevisionV2 {
    id: String,
    modified_date: Option<String>,
    #[serde(default)]
    last_modifying_user: Option<ModifyingUser>,
    file_size: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevisionListV2 {
    #[serde(default)]
    items: Vec<RevisionV2>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevisionV3 {
    id: String,
    modified_time: Option<String>,
    #[serde(default)]
    last_modifying_user: Option<ModifyingUser>,
    size: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevisionListV3 {
    #[serde(default)]
    revisions: Vec<RevisionV3>,
    next_page_token: Option<String>,
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn into_revision(
    id: String,
    modified: Option<&str>,
    user: Option<ModifyingUser>,
    size: Option<&str>,
) -> DriveRevision {
    let user = user.unwrap_or_default();
    DriveRevision {
        id,
        modified: parse_time(modified),
        author_name: user.display_name,
        author_email: user.email_address,
        size: size.and_then(|s| s.parse().ok()),
    }
}

/// Drive/Docs client authenticated with a service-account JWT grant. The
/// access token is fetched lazily and reused until shortly before expiry.
pub struct DriveClient {
    key: ServiceAccountKey,
    agent: ureq::Agent,
    api: DriveApi,
    token: RefCell<Option<(String, Instant)>>,
}

impl DriveClient {
    pub fn new(key: ServiceAccountKey) -> Self {
        Self {
            key,
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
            api: DriveApi::V2,
            token: RefCell::new(None),
        }
    }

    pub fn with_api(mut self, api: DriveApi) -> Self {
        self.api = api;
        self
    }

    fn access_token(&self) -> Result<String, FetchError> {
        if let Some((token, expires)) = self.token.borrow().as_ref() {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = GrantClaims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let signing_key = jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| FetchError::Auth(format!("service account key: {e}")))?;
        let assertion = jsonwebtoken::encode(&header, &claims, &signing_key)
            .map_err(|e| FetchError::Auth(format!("signing grant: {e}")))?;

        debug!(account = %self.key.client_email, "requesting access token");
        let response: TokenResponse = self
            .agent
            .post(&self.key.token_uri)
            .send_form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .map_err(|e| match FetchError::from(e) {
                FetchError::Status { code, url } => FetchError::Auth(format!("HTTP {code} from {url}")),
                other => other,
            })?
            .into_json()
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        // Refresh a minute early.
        let lifetime = response.expires_in.unwrap_or(TOKEN_LIFETIME_SECS as u64).saturating_sub(60);
        let expires = Instant::now() + Duration::from_secs(lifetime);
        *self.token.borrow_mut() = Some((response.access_token.clone(), expires));
        Ok(response.access_token)
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<ureq::Response, FetchError> {
        let token = self.access_token()?;
        let mut request = self
            .agent
            .get(url)
            .set("Authorization", &format!("Bearer {token}"));
        for (key, value) in query {
            request = request.query(key, value);
        }
        Ok(request.call()?)
    }

    fn list_v2(&self, doc_id: &str) -> Result<Vec<DriveRevision>, FetchError> {
        let url = format!("{DRIVE_V2}/{doc_id}/revisions");
        let mut revisions = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = Vec::new();
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page: RevisionListV2 = self
                .get(&url, &query)?
                .into_json()
                .map_err(|e| FetchError::Decode(e.to_string()))?;
            revisions.extend(page.items.into_iter().map(|r| {
                into_revision(r.id, r.modified_date.as_deref(), r.last_modifying_user, r.file_size.as_deref())
            }));
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(revisions)
    }

    fn list_v3(&self, doc_id: &str) -> Result<Vec<DriveRevision>, FetchError> {
        let url = format!("{DRIVE_V3}/{doc_id}/revisions");
        let fields = "nextPageToken,revisions(id,modifiedTime,lastModifyingUser,size)";
        let mut revisions = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("fields", fields)];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page: RevisionListV3 = self
                .get(&url, &query)?
                .into_json()
                .map_err(|e| FetchError::Decode(e.to_string()))?;
            revisions.extend(page.revisions.into_iter().map(|r| {
                into_revision(r.id, r.modified_time.as_deref(), r.last_modifying_user, r.size.as_deref())
            }));
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(revisions)
    }
}

impl RevisionSource for DriveClient {
    /// Lists through the configured API version and falls back to the
    /// other one when that listing fails.
    fn list_revisions(&self, doc_id: &str) -> Result<Vec<DriveRevision>, FetchError> {
        let (primary, fallback): (Lister, Lister) = match self.api {
            DriveApi::V2 => (Self::list_v2, Self::list_v3),
            DriveApi::V3 => (Self::list_v3, Self::list_v2),
        };
        match primary(self, doc_id) {
            Ok(revisions) => Ok(revisions),
            Err(FetchError::Auth(reason)) => Err(FetchError::Auth(reason)),
            Err(e) => {
                warn!(document = doc_id, error = %e, "revision listing failed, trying alternate API");
                fallback(self, doc_id)
            }
        }
    }

    fn fetch_text(&self, doc_id: &str, revision_id: &str) -> Result<String, FetchError> {
        let text = self
            .get(
                EXPORT_URL,
                &[("id", doc_id), ("revision", revision_id), ("exportFormat", "txt")],
            )?
            .into_string()
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(text.trim().to_string())
    }
}
