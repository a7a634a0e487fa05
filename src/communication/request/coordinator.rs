use super::dispatcher::ResponseDispatcher;
use super::endpoint::RpcEndpointIdentity;
use super::registry::{CorrelationId, CorrelationRegistry, ResponseRecord};
use super::responder::reply_to_request;
use crate::communication::channel::{MessageChannel, MessageProperties, SubscriptionHandle};
use crate::communication::error::RequestError;
use crate::BoxedError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Bound on how long a request waits for its response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTimeout {
    /// Wait indefinitely
    None,
    /// Fail once the duration has elapsed since the request was published
    Within(Duration),
}

impl ResponseTimeout {
    /// Bound of `secs` whole seconds
    pub fn from_secs(secs: u64) -> Self {
        Self::Within(Duration::from_secs(secs))
    }
}

impl Default for ResponseTimeout {
    /// Six seconds
    fn default() -> Self {
        Self::from_secs(6)
    }
}

impl From<Duration> for ResponseTimeout {
    fn from(limit: Duration) -> Self {
        Self::Within(limit)
    }
}

/// Requesting side of the request-response pattern
///
/// Orchestrates full round-trips over a message channel: register a
/// correlation slot, publish the request with delivery confirmation, drive
/// the channel's event loop until the response has been filed, retrieve it
/// and clean up. The coordinator *holds* its channel and registry; it is the
/// only component application code calls directly on the requesting side.
///
/// A coordinator instance is a single-owner object. While one call is
/// blocked waiting it is the only code path pumping the channel; nothing
/// guards against two tasks entering the wait loop at once, so sharing an
/// instance requires external serialization.
pub struct RequestCoordinator<C: MessageChannel> {
    channel: Arc<C>,
    registry: Arc<CorrelationRegistry>,
    identity: RpcEndpointIdentity,
    subscription: SubscriptionHandle,
}

impl<C: MessageChannel + 'static> RequestCoordinator<C> {
    /// Binds a coordinator to `channel`, registering its response dispatcher
    /// as the inbound callback
    ///
    /// `identity` has to name the channel's subscription target; it is what
    /// responders will see as the reply destination.
    pub async fn bind(
        channel: Arc<C>,
        identity: RpcEndpointIdentity,
    ) -> Result<Self, BoxedError> {
        let registry = Arc::new(CorrelationRegistry::default());
        let dispatcher = Arc::new(ResponseDispatcher::new(registry.clone(), channel.clone()));
        let subscription = channel.subscribe(dispatcher).await?;

        debug!(address = %identity.address(), "Bound response dispatcher");

        Ok(Self {
            channel,
            registry,
            identity,
            subscription,
        })
    }

    /// Inbound addressing identity attached to outgoing requests
    pub fn identity(&self) -> &RpcEndpointIdentity {
        &self.identity
    }

    /// Handle of the dispatcher's inbound subscription
    pub fn subscription(&self) -> SubscriptionHandle {
        self.subscription
    }

    /// Correlation bookkeeping of this coordinator
    ///
    /// Exposed for callers that want to drive the pattern manually instead
    /// of blocking in [`request_response`](Self::request_response): register
    /// a slot, publish themselves and poll
    /// [`filled`](CorrelationRegistry::filled) between their own event-loop
    /// turns.
    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    /// Performs a full request round-trip
    ///
    /// Registers `correlation_id` (or a generated identifier), overrides the
    /// outgoing `correlation_id` and `reply_to` properties, publishes with
    /// the mandatory flag set and waits for the matching response. The wait
    /// loop itself drives the channel's event processing; no background task
    /// services the subscription.
    ///
    /// Fails fast with [`MessageNotDelivered`](RequestError::MessageNotDelivered)
    /// when the channel reports the request unroutable, and with
    /// [`MessageDeliveryTimeout`](RequestError::MessageDeliveryTimeout) once
    /// `timeout` has elapsed since publishing. Both release the correlation
    /// slot before returning; a successful call releases it by retrieving
    /// the response.
    #[instrument(err, skip(self, body, properties))]
    pub async fn request_response(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        mut properties: MessageProperties,
        correlation_id: Option<CorrelationId>,
        timeout: ResponseTimeout,
    ) -> Result<ResponseRecord, RequestError> {
        let id = self.registry.register(correlation_id)?;

        properties.correlation_id = Some(id.clone());
        properties.reply_to = Some(self.identity.address().to_owned());

        let delivered = match self
            .channel
            .publish(exchange, routing_key, body, &properties, true)
            .await
        {
            Ok(delivered) => delivered,
            Err(error) => {
                self.registry.discard(&id);
                return Err(RequestError::Channel(error));
            }
        };

        if !delivered {
            self.registry.discard(&id);
            return Err(RequestError::MessageNotDelivered);
        }

        let deadline = match timeout {
            ResponseTimeout::Within(limit) => Some((Instant::now() + limit, limit)),
            ResponseTimeout::None => None,
        };

        loop {
            match self.registry.take(&id) {
                Ok(Some(record)) => {
                    debug!(correlation_id = %id, "Request completed");
                    return Ok(record);
                }
                Ok(None) => {}
                Err(error) => {
                    self.registry.discard(&id);
                    return Err(error);
                }
            }

            let wait = match deadline {
                Some((deadline, limit)) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());

                    if remaining.is_zero() {
                        self.registry.discard(&id);
                        debug!(correlation_id = %id, "Request timed out");
                        return Err(RequestError::MessageDeliveryTimeout(limit));
                    }

                    Some(remaining)
                }
                None => None,
            };

            if let Err(error) = self.channel.process_events(wait).await {
                self.registry.discard(&id);
                return Err(RequestError::Channel(error));
            }
        }
    }

    /// Replies to a request received over this coordinator's channel
    ///
    /// Fire-and-forget: publishes to the default exchange using the original
    /// request's reply address as routing key, carrying its correlation
    /// identifier forward. Never touches the registry, as the responder is
    /// not awaiting anything.
    pub async fn reply(
        &self,
        original: &MessageProperties,
        body: &[u8],
        properties: MessageProperties,
    ) -> Result<(), RequestError> {
        reply_to_request(self.channel.as_ref(), original, body, properties).await
    }

    /// Publishes a plain message on this coordinator's channel
    ///
    /// Pass-through for non-RPC traffic; no properties are overridden and no
    /// correlation slot is registered.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: &MessageProperties,
        mandatory: bool,
    ) -> Result<bool, BoxedError> {
        self.channel
            .publish(exchange, routing_key, body, properties, mandatory)
            .await
    }
}
