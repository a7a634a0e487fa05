//! Failure modes of the request/response layer

use crate::BoxedError;
use std::time::Duration;
use thiserror::Error;

/// Error raised by correlation bookkeeping and request round-trips
///
/// Every failure surfaces at the point of call. The only silently handled
/// situations are the two documented drop cases: storing a response for an
/// identifier nobody is waiting on, and responses arriving after their slot
/// has been released by a timeout. Both are consumed, acknowledged and logged
/// at debug level by the dispatcher.
#[derive(Debug, Error)]
pub enum RequestError {
    /// An identifier was registered while a request with the same identifier
    /// is still outstanding. Callers supplying explicit identifiers have to
    /// ensure uniqueness themselves.
    #[error("correlation identifier {0} is already registered")]
    DuplicateCorrelationId(String),

    /// A response was retrieved for an identifier that was never registered
    /// (or whose slot has already been handed over or released).
    #[error("correlation identifier {0} was never registered")]
    UnknownCorrelationId(String),

    /// A mandatory publish reported that no queue accepted the message. The
    /// registry slot has already been released when this is raised.
    #[error("message was not delivered to any queue")]
    MessageNotDelivered,

    /// No response arrived within the requested window. The registry slot has
    /// already been released when this is raised.
    #[error("no response received within {0:?}")]
    MessageDeliveryTimeout(Duration),

    /// A reply was attempted to a request that carries no reply address.
    #[error("original request does not carry a reply address")]
    MissingReplyAddress,

    /// The underlying channel operation failed. Fatal to the current call
    /// only; the registry releases the slot of the failed call and remains
    /// usable otherwise.
    #[error("channel operation failed: {0}")]
    Channel(BoxedError),
}

impl From<BoxedError> for RequestError {
    fn from(error: BoxedError) -> Self {
        Self::Channel(error)
    }
}
