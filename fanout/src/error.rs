use std::error::Error as StdError;
use std::fmt;

/// Failure to deliver a frame to one viewer.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: FanoutErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum FanoutErrorKind {
    WriteFailed,
    WriteTimedOut,
    Closed,
}

impl Error {
    pub fn write_failed(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error {
            source: Some(source.into()),
            error_kind: FanoutErrorKind::WriteFailed,
        }
    }

    pub fn closed() -> Self {
        Error {
            source: None,
            error_kind: FanoutErrorKind::Closed,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fanout Error: {:?}", self.error_kind)?;
        match &self.source {
            Some(source) => write!(f, ": {source}"),
            None => Ok(()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
