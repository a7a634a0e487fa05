//! Messaging primitives connecting this crate to a message broker
//!
//! The [`channel`] module defines the contract an underlying messaging client
//! has to fulfil. On top of it, the [`request`] module realises the
//! request/response pattern: correlation bookkeeping, the requesting side and
//! the responding side. Concrete channel implementations live in
//! [`implementation`].

pub mod channel;
pub mod error;
pub mod implementation;
pub mod request;
