use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("invalid tileset: {0}")]
    InvalidTileset(String),
    #[error("invalid subtree: {0}")]
    InvalidSubtree(String),
    #[error("cannot render url template {template}: {message}")]
    UrlTemplate { template: String, message: String },
    #[error("unsupported tile id for this loader")]
    UnsupportedTileId,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The HTTP status behind this error, if there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors and warnings accumulated while producing one tile's content.
/// Carried across the worker/main-thread boundary inside the load result;
/// nothing in here ever panics its way across.
#[derive(Debug, Default)]
pub struct ErrorList {
    pub errors: Vec<Error>,
    pub warnings: Vec<String>,
}

impl ErrorList {
    pub fn from_error(error: Error) -> Self {
        Self {
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ErrorList) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn log_all(&self, context: &str) {
        for error in &self.errors {
            log::error!("{context}: {error}");
        }
        for warning in &self.warnings {
            log::warn!("{context}: {warning}");
        }
    }
}

/// What was being loaded when a tileset-level failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TilesetLoadType {
    TilesetJson,
    TileContent,
    Unknown,
}

/// Passed to the load-failure callback so the application can decide what
/// happened and whether it wants to retry.
#[derive(Debug)]
pub struct TilesetLoadFailureDetails {
    pub load_type: TilesetLoadType,
    pub status_code: u16,
    pub message: String,
}

/// The application's answer to a tileset-level load failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FailureAction {
    #[default]
    GiveUp,
    Retry,
}
