use thiserror::Error;

/// Classified failure of a transport or store operation.
///
/// `Clone` so a single in-flight fetch can hand the same outcome to every
/// caller awaiting it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("not authenticated: log in first")]
    Unauthenticated,

    #[error("server rejected the request ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        raw_body: String,
    },

    #[error("could not reach the server: {0}")]
    Connection(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("failed to decode server response: {0}")]
    Decode(String),

    #[error("local storage failure: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "task",
            id: id.into(),
        }
    }

    pub fn category_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "category",
            id: id.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
