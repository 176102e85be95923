use thiserror::Error;

/// Failure of a single HTTP fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Why a link produced no reading this cycle.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{url} kept blocking automation after {attempts} attempts")]
    Blocked { url: String, attempts: u32 },

    #[error("browser failed on {url} after {attempts} attempts: {reason}")]
    Browser {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("browser session unavailable: {0}")]
    Session(String),
}

/// Conditions that abort a whole group scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("group {0} not found")]
    GroupNotFound(i64),

    #[error("site {0} not found")]
    SiteNotFound(i64),

    #[error("site '{0}' has no configured scan strategy")]
    UnknownSite(String),

    #[error("a scan for group {0} is already running")]
    AlreadyRunning(i64),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("group title must not be empty")]
    EmptyTitle,

    #[error("group title is too long ({0} characters, max {max})", max = crate::catalog::MAX_GROUP_TITLE_LEN)]
    TitleTooLong(usize),

    #[error("group {0} not found")]
    GroupNotFound(i64),

    #[error("site {0} not found")]
    SiteNotFound(i64),

    #[error("user {0} is not registered")]
    UnknownUser(i64),

    #[error("site '{0}' is not configured")]
    UnknownSite(String),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}
