use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Git error: {0}")]
    Git(#[from] Box<gix::open::Error>),
    #[error("Git repository error: {0}")]
    GitRepo(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Chart error: {0}")]
    Chart(String),
    #[error("Mail error: {0}")]
    Mail(String),
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Object find error: {0}")]
    ObjectFind(#[from] Box<gix::object::find::existing::Error>),
    #[error("Commit error: {0}")]
    Commit(#[from] Box<gix::object::commit::Error>),
    #[error("Object find with conversion error: {0}")]
    ObjectFindConv(#[from] Box<gix::object::find::existing::with_conversion::Error>),
    #[error("Object decode error: {0}")]
    ObjectDecode(#[from] Box<gix::objs::decode::Error>),
    #[error("Diff tree to tree error: {0}")]
    DiffTreeToTree(#[from] Box<gix::repository::diff_tree_to_tree::Error>),
}

/// Failure of a provider-facing call: Git transport, Drive API, revision
/// export or SMTP delivery. Never aborts the whole run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("HTTP {code} from {url}")]
    Status { code: u16, url: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("authentication failed: {0}")]
    Auth(String),
}

/// Malformed descriptor or credential combination. Raised per repository.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("repository '{name}': URL must use https:// (got '{url}')")]
    NotHttps { name: String, url: String },
    #[error("repository '{name}': auth '{auth}' cannot be used with type '{kind}'")]
    AuthMismatch { name: String, kind: String, auth: String },
    #[error("repository '{name}': missing {what} credentials")]
    MissingCredentials { name: String, what: &'static str },
    #[error("repository '{name}': cannot extract a document id from '{url}'")]
    BadDocumentUrl { name: String, url: String },
    #[error("{0}")]
    Invalid(String),
}

impl From<gix::open::Error> for WatchError {
    fn from(err: gix::open::Error) -> Self {
        WatchError::Git(Box::new(err))
    }
}

impl From<gix::object::find::existing::Error> for WatchError {
    fn from(err: gix::object::find::existing::Error) -> Self {
        WatchError::ObjectFind(Box::new(err))
    }
}

impl From<gix::object::commit::Error> for WatchError {
    fn from(err: gix::object::commit::Error) -> Self {
        WatchError::Commit(Box::new(err))
    }
}

impl From<gix::object::find::existing::with_conversion::Error> for WatchError {
    fn from(err: gix::object::find::existing::with_conversion::Error) -> Self {
        WatchError::ObjectFindConv(Box::new(err))
    }
}

impl From<gix::objs::decode::Error> for WatchError {
    fn from(err: gix::objs::decode::Error) -> Self {
        WatchError::ObjectDecode(Box::new(err))
    }
}

impl From<gix::repository::diff_tree_to_tree::Error> for WatchError {
    fn from(err: gix::repository::diff_tree_to_tree::Error) -> Self {
        WatchError::DiffTreeToTree(Box::new(err))
    }
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => FetchError::Status {
                code,
                url: response.get_url().to_string(),
            },
            ureq::Error::Transport(t) => FetchError::Transport(t.to_string()),
        }
    }
}
