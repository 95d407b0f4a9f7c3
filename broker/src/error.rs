//! Error types for the `broker` crate.
//!
//! Follows the same pattern as domain::error with a root Error struct and an error kind enum.

use std::error::Error as StdError;
use std::fmt;

/// Boxed error emitted by a transport implementation.
pub type TransportError = Box<dyn StdError + Send + Sync>;

/// Top-level error type for the broker link.
#[derive(Debug)]
pub struct Error {
    pub source: Option<TransportError>,
    pub error_kind: BrokerErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum BrokerErrorKind {
    /// The broker could not be dialed.
    Dial,
    /// A channel could not be opened on a fresh connection.
    OpenChannel,
    /// Exchange, queue or binding declaration was refused.
    Topology,
    /// No live connection/channel pair exists.
    NotConnected,
    /// A stale channel could not be replaced in place.
    ChannelRecovery,
    /// The broker refused a publish on a live channel.
    PublishRejected,
    /// Every publish attempt failed.
    RetriesExhausted { attempts: u32 },
    /// `close` has been called; the link will not connect again.
    ShuttingDown,
}

impl Error {
    pub(crate) fn new(error_kind: BrokerErrorKind, source: TransportError) -> Self {
        Error {
            source: Some(source),
            error_kind,
        }
    }

    pub(crate) fn kind(error_kind: BrokerErrorKind) -> Self {
        Error {
            source: None,
            error_kind,
        }
    }

    /// True for failures the reconnect driver is expected to heal.
    pub fn is_transient(&self) -> bool {
        self.error_kind != BrokerErrorKind::ShuttingDown
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            BrokerErrorKind::Dial => write!(f, "failed to connect to the broker")?,
            BrokerErrorKind::OpenChannel => write!(f, "failed to open a channel")?,
            BrokerErrorKind::Topology => write!(f, "failed to set up topology")?,
            BrokerErrorKind::NotConnected => write!(f, "not connected to the broker")?,
            BrokerErrorKind::ChannelRecovery => write!(f, "failed to recover the broker channel")?,
            BrokerErrorKind::PublishRejected => write!(f, "the broker rejected the publish")?,
            BrokerErrorKind::RetriesExhausted { attempts } => {
                write!(f, "failed to publish message after {attempts} attempts")?
            }
            BrokerErrorKind::ShuttingDown => write!(f, "the broker link is shutting down")?,
        }
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
