//! Implementations of the channel contract
//!
//! Broker client adapters implement [`MessageChannel`](super::channel::MessageChannel)
//! out-of-tree; this crate ships an in-process loopback used by its own test
//! suite and by applications wanting to test request/response flows without
//! a broker.

#[cfg(any(test, feature = "test"))]
pub mod memory;
