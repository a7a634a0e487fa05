//! Contract between the request/response layer and an underlying message channel
//!
//! The traits in this module describe the minimal surface this crate consumes
//! from a messaging client: publishing with optional delivery confirmation,
//! registering an inbound callback, acknowledging deliveries and driving the
//! event loop. Everything broker specific (connection management, queue and
//! exchange declaration, durability) stays inside the implementation.

use crate::{BoxedError, EmptyResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Delivery guarantee requested for a published message
///
/// Passed through to the channel untouched; this crate does not interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// The message may be lost when the broker restarts
    Transient,
    /// The broker persists the message before confirming it
    Persistent,
}

impl DeliveryMode {
    /// Numeric value AMQP brokers use for this mode
    pub fn code(self) -> u8 {
        match self {
            Self::Transient => 1,
            Self::Persistent => 2,
        }
    }
}

/// Metadata attached to a published or delivered message
///
/// The request/response layer reads and writes `correlation_id` and
/// `reply_to`; all remaining fields are passed through to the channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageProperties {
    /// Token linking a request to its eventual response
    pub correlation_id: Option<String>,
    /// Inbound address a responder has to target to deliver its answer
    pub reply_to: Option<String>,
    /// MIME type of the message body
    pub content_type: Option<String>,
    /// Requested delivery guarantee
    pub delivery_mode: Option<DeliveryMode>,
    /// Application defined header table
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Value>,
}

/// Transport level information about a single delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    /// Channel assigned tag identifying the delivery for acknowledgement
    pub delivery_tag: u64,
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key the message was published with
    pub routing_key: String,
    /// Whether the channel has delivered this message before
    pub redelivered: bool,
}

/// A single inbound message handed to an [`InboundHandler`]
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Transport level delivery information
    pub info: DeliveryInfo,
    /// Metadata attached by the publisher
    pub properties: MessageProperties,
    /// Opaque message body
    pub body: Vec<u8>,
}

/// Handle identifying a registered subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Creates a handle from a channel assigned subscription number
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Callback invoked by a channel for every inbound delivery
///
/// Handlers run synchronously from within [`MessageChannel::process_events`];
/// a delivery is considered dispatched once `handle` has returned.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Processes a single delivery
    async fn handle(&self, delivery: Delivery) -> EmptyResult;
}

/// Asynchronous publish/subscribe message channel
///
/// A channel instance is scoped to one inbound source (its queue on the
/// broker); [`subscribe`](Self::subscribe) attaches the callback for that
/// source. Deliveries are only dispatched while
/// [`process_events`](Self::process_events) is being driven; the channel
/// does not service its subscription in the background.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publishes a message to `exchange` under `routing_key`
    ///
    /// With `mandatory` set the channel reports whether any queue accepted
    /// the message; `Ok(false)` means it was returned unroutable. Without
    /// `mandatory` the returned flag carries no meaning.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: &MessageProperties,
        mandatory: bool,
    ) -> Result<bool, BoxedError>;

    /// Registers `handler` as the callback for this channel's inbound source
    ///
    /// The most recently registered callback wins.
    async fn subscribe(&self, handler: Arc<dyn InboundHandler>)
        -> Result<SubscriptionHandle, BoxedError>;

    /// Confirms processing of a delivery to the channel
    async fn acknowledge(&self, delivery: &DeliveryInfo) -> EmptyResult;

    /// Drives pending inbound deliveries, invoking the subscribed handler for
    /// each of them
    ///
    /// Passing `None` blocks until at least one delivery was dispatched.
    /// Passing a wait hint returns after dispatching the deliveries that were
    /// ready, or once the hint elapses with nothing arriving.
    async fn process_events(&self, wait: Option<Duration>) -> EmptyResult;
}
