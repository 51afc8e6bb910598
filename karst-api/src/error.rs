use std::fmt;
use std::sync::Arc;

pub type KarstResult<T> = Result<T, KarstError>;

/// Generic error that contains all the different kinds of errors that may occur in the
/// backend-agnostic layer
#[derive(Debug, Clone)]
pub enum KarstError {
    StringError(String),
    IoError(Arc<std::io::Error>),
}

impl std::error::Error for KarstError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            KarstError::StringError(_) => None,
            KarstError::IoError(ref e) => Some(&**e),
        }
    }
}

impl fmt::Display for KarstError {
    fn fmt(
        &self,
        fmt: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match *self {
            KarstError::StringError(ref e) => e.fmt(fmt),
            KarstError::IoError(ref e) => e.fmt(fmt),
        }
    }
}

impl From<&str> for KarstError {
    fn from(str: &str) -> Self {
        KarstError::StringError(str.to_string())
    }
}

impl From<String> for KarstError {
    fn from(string: String) -> Self {
        KarstError::StringError(string)
    }
}

impl From<std::io::Error> for KarstError {
    fn from(error: std::io::Error) -> Self {
        KarstError::IoError(Arc::new(error))
    }
}
