//! Structures to realise a request-response pattern over a message channel
//!
//! This module links the two directions of a message broker into synchronous
//! round-trips. Every request carries a correlation identifier and the
//! address of the requester's inbound queue; the responder publishes its
//! answer to that address with the identifier carried forward, which lets the
//! requesting side match it against its bookkeeping.
//!
//! When talking about the request-response pattern, there are two parties
//! involved:
//!
//! - Requesting side
//! - Responding side
//!
//! On the requesting side, a [`RequestCoordinator`] performs full round-trips:
//! it registers a slot in the [`CorrelationRegistry`], publishes the request
//! with delivery confirmation and drives the channel's event loop until the
//! [`ResponseDispatcher`] has filed the matching response or the timeout
//! elapses. The registry is also usable on its own for callers that prefer to
//! register and poll responses manually.
//!
//! On the responding side, a [`Responder`] waits for incoming requests,
//! processes them using a [`RequestProcessor`] and publishes the returned
//! reply to the request's reply address. Replying has no bookkeeping of its
//! own, since the responder is not awaiting anything, and is therefore also
//! available as the free function [`reply_to_request`].
//!
//! A coordinator owns its registry and channel exclusively. While a call is
//! blocked waiting, it is the only code path pumping the channel; sharing one
//! coordinator across tasks requires external serialization. Responses that
//! arrive for identifiers nobody is waiting on, be it late answers to
//! timed-out requests or messages this process never asked for, are consumed,
//! acknowledged and dropped.

mod coordinator;
mod dispatcher;
mod endpoint;
mod registry;
mod responder;

pub use coordinator::*;
pub use dispatcher::*;
pub use endpoint::*;
pub use registry::*;
pub use responder::*;
