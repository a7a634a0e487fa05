//! Request/reply correlation layered on top of asynchronous publish/subscribe
//! message channels.
//!
//! Message brokers deliver messages in one direction only. To call a remote
//! service and wait for its answer, both directions have to be stitched
//! together by hand: the request carries a correlation identifier and a reply
//! address, the responder publishes its answer to that address, and the
//! requesting side has to recognise the answer among everything else arriving
//! on its inbound queue. The [`communication`] module implements exactly that
//! stitching on top of a small channel contract any broker client can
//! implement: a correlation registry tracking outstanding requests, a
//! coordinator performing full round-trips, and a dispatcher filing inbound
//! responses.
//!
//! Wire encoding, broker topology administration and body serialization are
//! deliberately left to the channel implementation and the application.

#![deny(missing_docs)]

pub mod communication;

/// Type erased error which can be transferred across thread boundaries
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Result of an operation which yields no value but may fail
pub type EmptyResult = Result<(), BoxedError>;
